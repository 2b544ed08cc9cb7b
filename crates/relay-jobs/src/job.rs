//! Job definitions.

use crate::error::{FailureKind, JobError, JobResult};
use crate::queue::Priority;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique job identifier of the form `{task_type}-{uuid}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a new random job ID for a task type.
    pub fn generate(task_type: &str) -> Self {
        Self(format!("{}-{}", task_type, Uuid::new_v4().simple()))
    }

    /// Creates a job ID from a string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the job ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Typed job payload.
///
/// Implement this for the payload struct of a task type and submit it with
/// `QueueManager::enqueue`. The handler reads it back with [`Job::payload`].
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct ResizeImage { url: String }
///
/// impl JobPayload for ResizeImage {
///     const TASK_TYPE: &'static str = "resize_image";
/// }
/// ```
pub trait JobPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Task type used to route the job to its handler.
    const TASK_TYPE: &'static str;
}

/// A unit of submitted work, handed by value to the worker executing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Job ID.
    pub id: JobId,
    /// Queue name.
    pub queue: String,
    /// Task type name.
    pub task_type: String,
    /// Priority class.
    pub priority: Priority,
    /// Serialized payload.
    pub payload: serde_json::Value,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    /// Deserializes the payload.
    ///
    /// # Errors
    ///
    /// Returns `JobError::InvalidPayload` when the payload does not match `P`.
    pub fn payload<P: DeserializeOwned>(&self) -> JobResult<P> {
        serde_json::from_value(self.payload.clone()).map_err(JobError::from)
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker.
    Pending,
    /// Executing on a worker.
    Running,
    /// Handler returned success.
    Succeeded,
    /// Handler returned an error or panicked.
    Failed,
    /// Handler exceeded the task timeout.
    TimedOut,
}

impl JobStatus {
    /// Returns true once the job will not change again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// Tracked state of a job, as returned by status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: JobId,
    pub queue: String,
    pub task_type: String,
    pub priority: Priority,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Job> for JobInfo {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            queue: job.queue.clone(),
            task_type: job.task_type.clone(),
            priority: job.priority,
            status: JobStatus::Pending,
            submitted_at: job.submitted_at,
            started_at: None,
            finished_at: None,
            failure_kind: None,
            error: None,
        }
    }
}

impl JobInfo {
    /// Marks the job as picked up by a worker.
    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Records the terminal outcome.
    pub fn mark_finished(&mut self, outcome: &JobResult<()>) {
        self.finished_at = Some(Utc::now());
        match outcome {
            Ok(()) => self.status = JobStatus::Succeeded,
            Err(e) => {
                self.status = if matches!(e, JobError::Timeout(_)) {
                    JobStatus::TimedOut
                } else {
                    JobStatus::Failed
                };
                self.failure_kind = Some(e.kind());
                self.error = Some(e.to_string());
            }
        }
    }
}
