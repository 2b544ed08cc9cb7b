//! Metrics for job queue monitoring.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! process installs a recorder.

use crate::error::FailureKind;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the job queue.
pub mod names {
    /// Total jobs accepted by `submit`.
    pub const JOBS_SUBMITTED_TOTAL: &str = "relay_jobs_submitted_total";
    /// Total submissions rejected.
    pub const JOBS_REJECTED_TOTAL: &str = "relay_jobs_rejected_total";
    /// Total jobs completed successfully.
    pub const JOBS_COMPLETED_TOTAL: &str = "relay_jobs_completed_total";
    /// Total jobs failed.
    pub const JOBS_FAILED_TOTAL: &str = "relay_jobs_failed_total";
    /// Total jobs timed out.
    pub const JOBS_TIMED_OUT_TOTAL: &str = "relay_jobs_timed_out_total";
    /// Total pending jobs discarded at shutdown.
    pub const JOBS_DISCARDED_TOTAL: &str = "relay_jobs_discarded_total";

    /// Current pending jobs.
    pub const JOBS_PENDING: &str = "relay_jobs_pending";
    /// Current running jobs.
    pub const JOBS_RUNNING: &str = "relay_jobs_running";

    /// Job execution duration in seconds.
    pub const JOB_DURATION_SECONDS: &str = "relay_job_duration_seconds";
    /// Job wait time (time in queue) in seconds.
    pub const JOB_WAIT_TIME_SECONDS: &str = "relay_job_wait_time_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        names::JOBS_SUBMITTED_TOTAL,
        "Total number of jobs accepted for processing"
    );
    describe_counter!(
        names::JOBS_REJECTED_TOTAL,
        "Total number of submissions rejected, by reason"
    );
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of jobs completed successfully"
    );
    describe_counter!(names::JOBS_FAILED_TOTAL, "Total number of jobs that failed");
    describe_counter!(
        names::JOBS_TIMED_OUT_TOTAL,
        "Total number of jobs that timed out"
    );
    describe_counter!(
        names::JOBS_DISCARDED_TOTAL,
        "Total number of pending jobs discarded at shutdown"
    );

    describe_gauge!(names::JOBS_PENDING, "Current number of pending jobs");
    describe_gauge!(names::JOBS_RUNNING, "Current number of running jobs");

    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Job execution duration in seconds"
    );
    describe_histogram!(
        names::JOB_WAIT_TIME_SECONDS,
        "Time jobs spend pending before a worker picks them up"
    );
}

/// Helpers for recording job metrics.
pub struct JobMetrics;

impl JobMetrics {
    /// Records an accepted submission.
    pub fn submitted(queue: &str, task_type: &str) {
        counter!(
            names::JOBS_SUBMITTED_TOTAL,
            "queue" => queue.to_string(),
            "task_type" => task_type.to_string()
        )
        .increment(1);
    }

    /// Records a rejected submission.
    pub fn rejected(queue: &str, reason: &'static str) {
        counter!(
            names::JOBS_REJECTED_TOTAL,
            "queue" => queue.to_string(),
            "reason" => reason
        )
        .increment(1);
    }

    /// Records a successful job.
    pub fn completed(queue: &str, task_type: &str, duration: Duration) {
        counter!(
            names::JOBS_COMPLETED_TOTAL,
            "queue" => queue.to_string(),
            "task_type" => task_type.to_string()
        )
        .increment(1);
        Self::duration(queue, task_type, duration);
    }

    /// Records a failed or timed-out job.
    pub fn failed(queue: &str, task_type: &str, kind: FailureKind, duration: Duration) {
        let name = if kind == FailureKind::Timeout {
            names::JOBS_TIMED_OUT_TOTAL
        } else {
            names::JOBS_FAILED_TOTAL
        };
        counter!(
            name,
            "queue" => queue.to_string(),
            "task_type" => task_type.to_string(),
            "kind" => kind.as_str()
        )
        .increment(1);
        Self::duration(queue, task_type, duration);
    }

    /// Records pending jobs dropped at shutdown.
    pub fn discarded(queue: &str, count: usize) {
        counter!(names::JOBS_DISCARDED_TOTAL, "queue" => queue.to_string())
            .increment(count as u64);
    }

    /// Records how long a job waited before starting.
    pub fn wait_time(queue: &str, wait: Duration) {
        histogram!(names::JOB_WAIT_TIME_SECONDS, "queue" => queue.to_string())
            .record(wait.as_secs_f64());
    }

    /// Updates the pending and running gauges.
    #[allow(clippy::cast_precision_loss)]
    pub fn set_depth(queue: &str, pending: usize, running: usize) {
        gauge!(names::JOBS_PENDING, "queue" => queue.to_string()).set(pending as f64);
        gauge!(names::JOBS_RUNNING, "queue" => queue.to_string()).set(running as f64);
    }

    fn duration(queue: &str, task_type: &str, duration: Duration) {
        histogram!(
            names::JOB_DURATION_SECONDS,
            "queue" => queue.to_string(),
            "task_type" => task_type.to_string()
        )
        .record(duration.as_secs_f64());
    }
}
