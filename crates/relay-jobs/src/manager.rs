//! Queue manager: named queues, bounded worker pools and admission control.

use crate::config::QueueConfig;
use crate::error::{JobError, JobResult, QueueConfigError, SubmitError};
use crate::handler::{HandlerRegistry, TaskHandler};
use crate::job::{Job, JobId, JobInfo, JobPayload, JobStatus};
use crate::metrics::JobMetrics;
use crate::queue::{PendingQueue, Priority, QueueStats};
use chrono::Utc;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use relay_resilience::{with_timeout, CircuitBreaker, CircuitBreakerConfig, CircuitState};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

/// Upper bound on how often submissions sweep expired jobs.
const PURGE_INTERVAL: Duration = Duration::from_secs(30);

/// Mutable state of one queue. Shared by its workers and guarded by a mutex.
struct QueueState {
    pending: PendingQueue,
    running: usize,
    jobs: HashMap<JobId, JobInfo>,
    succeeded: u64,
    failed: u64,
    timed_out: u64,
    accepting: bool,
    last_purge: Instant,
}

impl QueueState {
    fn depth(&self) -> usize {
        self.pending.len() + self.running
    }

    /// Evicts terminal jobs that finished longer than `retention` ago.
    fn purge_expired(&mut self, retention: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            return 0;
        };

        let before = self.jobs.len();
        self.jobs.retain(|_, info| {
            !(info.status.is_terminal() && info.finished_at.is_some_and(|t| t <= cutoff))
        });
        before - self.jobs.len()
    }

    /// Sweeps expired jobs at most once per interval.
    fn purge_if_due(&mut self, retention: Duration) {
        if self.last_purge.elapsed() >= PURGE_INTERVAL.min(retention) {
            self.purge_expired(retention);
            self.last_purge = Instant::now();
        }
    }
}

struct Queue {
    config: QueueConfig,
    breaker: CircuitBreaker,
    state: Mutex<QueueState>,
    available: Notify,
}

impl Queue {
    fn new(config: QueueConfig, accepting: bool) -> Self {
        let breaker = CircuitBreaker::new(
            config.name.clone(),
            CircuitBreakerConfig {
                failure_threshold: config.circuit_breaker_failure_threshold,
                reset_timeout: config.circuit_breaker_reset,
            },
        );

        Self {
            config,
            breaker,
            state: Mutex::new(QueueState {
                pending: PendingQueue::new(),
                running: 0,
                jobs: HashMap::new(),
                succeeded: 0,
                failed: 0,
                timed_out: 0,
                accepting,
                last_purge: Instant::now(),
            }),
            available: Notify::new(),
        }
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    /// Moves the next pending job to running.
    fn try_take(&self) -> Option<Job> {
        let mut state = self.state.lock();
        let job = state.pending.pop()?;
        state.running += 1;
        if let Some(info) = state.jobs.get_mut(&job.id) {
            info.mark_running();
        }
        JobMetrics::set_depth(self.name(), state.pending.len(), state.running);
        Some(job)
    }

    async fn next_job(&self) -> Job {
        loop {
            if let Some(job) = self.try_take() {
                return job;
            }
            self.available.notified().await;
        }
    }

    async fn execute(&self, job: Job, handlers: &HandlerRegistry, worker_id: usize) {
        let span = info_span!(
            "job",
            job_id = %job.id,
            queue = %job.queue,
            task_type = %job.task_type
        );

        async {
            let wait = (Utc::now() - job.submitted_at).to_std().unwrap_or_default();
            JobMetrics::wait_time(&job.queue, wait);
            info!(worker_id, priority = %job.priority, "Job started");

            let started = Instant::now();
            let outcome = match handlers.get(&job.task_type) {
                Some(handler) => self.run_handler(handler.as_ref(), &job).await,
                None => Err(JobError::HandlerNotFound(job.task_type.clone())),
            };
            let elapsed = started.elapsed();
            let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

            match &outcome {
                Ok(()) => {
                    info!(duration_ms, "Job succeeded");
                    JobMetrics::completed(&job.queue, &job.task_type, elapsed);
                }
                Err(e) => {
                    warn!(kind = %e.kind(), error = %e, duration_ms, "Job failed");
                    JobMetrics::failed(&job.queue, &job.task_type, e.kind(), elapsed);
                }
            }

            self.finish(&job, &outcome);
        }
        .instrument(span)
        .await;
    }

    /// Runs the handler under the task timeout with panics caught.
    ///
    /// On timeout the handler future is dropped, which runs the destructors
    /// of everything it owns.
    async fn run_handler(&self, handler: &dyn TaskHandler, job: &Job) -> JobResult<()> {
        let task_timeout = self.config.task_timeout;
        let guarded = AssertUnwindSafe(handler.handle(job)).catch_unwind();

        match with_timeout(task_timeout, guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(JobError::Unexpected(panic_message(panic.as_ref()))),
            Err(_) => Err(JobError::Timeout(task_timeout)),
        }
    }

    /// Records the outcome on the job and feeds it to the circuit breaker.
    fn finish(&self, job: &Job, outcome: &JobResult<()>) {
        let mut state = self.state.lock();
        state.running = state.running.saturating_sub(1);
        if let Some(info) = state.jobs.get_mut(&job.id) {
            info.mark_finished(outcome);
        }

        match outcome {
            Ok(()) => {
                state.succeeded += 1;
                self.breaker.record_success();
            }
            Err(e) => {
                if matches!(e, JobError::Timeout(_)) {
                    state.timed_out += 1;
                } else {
                    state.failed += 1;
                }
                self.breaker.record_failure();
            }
        }

        JobMetrics::set_depth(self.name(), state.pending.len(), state.running);
    }

    /// Stops admission and drops every pending job. Returns how many.
    fn close(&self) -> usize {
        let mut state = self.state.lock();
        state.accepting = false;
        let discarded = state.pending.drain();
        for job in &discarded {
            state.jobs.remove(&job.id);
        }
        JobMetrics::set_depth(self.name(), 0, state.running);
        discarded.len()
    }

    /// Marks jobs still running after an aborted shutdown as failed.
    fn abandon_running(&self) {
        let mut state = self.state.lock();
        let mut abandoned = 0;
        for info in state.jobs.values_mut() {
            if info.status == JobStatus::Running {
                info.mark_finished(&Err(JobError::Unexpected(
                    "aborted during shutdown".to_string(),
                )));
                abandoned += 1;
            }
        }
        state.failed += abandoned;
        state.running = 0;
    }

    fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            queue: self.config.name.clone(),
            pending: state.pending.len(),
            running: state.running,
            succeeded: state.succeeded,
            failed: state.failed,
            timed_out: state.timed_out,
            max_workers: self.config.max_workers,
            max_queue_depth: self.config.max_queue_depth,
            circuit_state: self.breaker.state(),
            consecutive_failures: self.breaker.consecutive_failures(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("handler panicked: {}", message)
    } else {
        "handler panicked".to_string()
    }
}

async fn run_worker(
    queue: Arc<Queue>,
    handlers: Arc<HandlerRegistry>,
    mut shutdown: watch::Receiver<bool>,
    worker_id: usize,
) {
    debug!(queue = %queue.name(), worker_id, "Worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let job = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            job = queue.next_job() => job,
        };

        queue.execute(job, &handlers, worker_id).await;
    }

    debug!(queue = %queue.name(), worker_id, "Worker stopped");
}

/// Owns the named queues of the process and their worker pools.
///
/// Constructed once by the entry point and shared through an `Arc`.
pub struct QueueManager {
    queues: RwLock<HashMap<String, Arc<Queue>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    handlers: Arc<HandlerRegistry>,
    accepting: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl Default for QueueManager {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueManager {
    /// Creates a manager with no queues.
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            queues: RwLock::new(HashMap::new()),
            workers: Mutex::new(Vec::new()),
            handlers: Arc::new(HandlerRegistry::new()),
            accepting: AtomicBool::new(true),
            shutdown_tx,
        }
    }

    /// Creates a queue and starts its `max_workers` workers.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateQueue` when the name is taken (the existing queue is
    /// left untouched) or `InvalidField` when a limit is not positive.
    pub fn create_queue(&self, config: QueueConfig) -> Result<(), QueueConfigError> {
        config.validate()?;

        let queue = {
            let mut queues = self.queues.write();
            if queues.contains_key(&config.name) {
                warn!(queue = %config.name, "Queue already exists");
                return Err(QueueConfigError::DuplicateQueue(config.name));
            }
            let queue = Arc::new(Queue::new(config, self.is_accepting()));
            queues.insert(queue.config.name.clone(), queue.clone());
            queue
        };

        let mut workers = self.workers.lock();
        for worker_id in 0..queue.config.max_workers {
            workers.push(tokio::spawn(run_worker(
                queue.clone(),
                self.handlers.clone(),
                self.shutdown_tx.subscribe(),
                worker_id,
            )));
        }

        info!(
            queue = %queue.config.name,
            max_workers = queue.config.max_workers,
            max_queue_depth = queue.config.max_queue_depth,
            priority = %queue.config.priority,
            task_timeout_secs = queue.config.task_timeout.as_secs(),
            failure_threshold = queue.config.circuit_breaker_failure_threshold,
            "Queue created"
        );
        Ok(())
    }

    /// Registers the handler for a task type.
    pub fn register_handler(&self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        let task_type = task_type.into();
        info!(task_type = %task_type, "Handler registered");
        self.handlers.register(task_type, handler);
    }

    /// Submits a job without waiting for it to run.
    ///
    /// `priority` defaults to the queue's configured class.
    ///
    /// # Errors
    ///
    /// `QueueNotFound`, `ShuttingDown`, `CircuitOpen` or `QueueFull`.
    pub fn submit(
        &self,
        queue_name: &str,
        task_type: &str,
        payload: serde_json::Value,
        priority: Option<Priority>,
    ) -> Result<JobId, SubmitError> {
        if !self.is_accepting() {
            return Err(Self::rejected(queue_name, SubmitError::ShuttingDown));
        }

        let Some(queue) = self.queues.read().get(queue_name).cloned() else {
            return Err(Self::rejected(
                queue_name,
                SubmitError::QueueNotFound(queue_name.to_string()),
            ));
        };

        let job = Job {
            id: JobId::generate(task_type),
            queue: queue_name.to_string(),
            task_type: task_type.to_string(),
            priority: priority.unwrap_or(queue.config.priority),
            payload,
            submitted_at: Utc::now(),
        };
        let job_id = job.id.clone();

        {
            let mut state = queue.state.lock();
            if !state.accepting {
                return Err(Self::rejected(queue_name, SubmitError::ShuttingDown));
            }

            state.purge_if_due(queue.config.retention);

            let depth = state.depth();
            if depth >= queue.config.max_queue_depth {
                let err = if queue.breaker.state() == CircuitState::Closed {
                    SubmitError::QueueFull {
                        queue: queue_name.to_string(),
                        depth,
                    }
                } else {
                    SubmitError::CircuitOpen(queue_name.to_string())
                };
                return Err(Self::rejected(queue_name, err));
            }

            if !queue.breaker.allow_request() {
                return Err(Self::rejected(
                    queue_name,
                    SubmitError::CircuitOpen(queue_name.to_string()),
                ));
            }

            state.jobs.insert(job.id.clone(), JobInfo::from(&job));
            debug!(
                job_id = %job.id,
                queue = %queue_name,
                task_type = %task_type,
                priority = %job.priority,
                "Job submitted"
            );
            state.pending.push(job);
            JobMetrics::set_depth(queue_name, state.pending.len(), state.running);
        }

        JobMetrics::submitted(queue_name, task_type);
        queue.available.notify_one();
        Ok(job_id)
    }

    /// Serializes a typed payload and submits it under `P::TASK_TYPE`.
    ///
    /// # Errors
    ///
    /// See [`QueueManager::submit`]; also `InvalidPayload` when serialization
    /// fails.
    pub fn enqueue<P: JobPayload>(
        &self,
        queue_name: &str,
        payload: &P,
        priority: Option<Priority>,
    ) -> Result<JobId, SubmitError> {
        let value = serde_json::to_value(payload)
            .map_err(|e| SubmitError::InvalidPayload(e.to_string()))?;
        self.submit(queue_name, P::TASK_TYPE, value, priority)
    }

    fn rejected(queue_name: &str, err: SubmitError) -> SubmitError {
        warn!(queue = %queue_name, reason = err.reason(), "Submission rejected");
        JobMetrics::rejected(queue_name, err.reason());
        err
    }

    /// Returns the tracked state of a job, if it has not been evicted.
    #[must_use]
    pub fn job(&self, id: &JobId) -> Option<JobInfo> {
        self.queues
            .read()
            .values()
            .find_map(|queue| queue.state.lock().jobs.get(id).cloned())
    }

    /// Returns statistics for a queue.
    #[must_use]
    pub fn queue_stats(&self, name: &str) -> Option<QueueStats> {
        self.queues.read().get(name).map(|queue| queue.stats())
    }

    /// Returns true when a queue with this name exists.
    #[must_use]
    pub fn has_queue(&self, name: &str) -> bool {
        self.queues.read().contains_key(name)
    }

    /// Closes a queue's circuit breaker. Returns false for unknown queues.
    pub fn reset_circuit(&self, name: &str) -> bool {
        match self.queues.read().get(name) {
            Some(queue) => {
                queue.breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Evicts finished jobs older than their queue's retention window.
    pub fn purge_finished(&self) -> usize {
        let purged: usize = self
            .queues
            .read()
            .values()
            .map(|queue| queue.state.lock().purge_expired(queue.config.retention))
            .sum();
        if purged > 0 {
            debug!(purged, "Purged finished jobs");
        }
        purged
    }

    /// Returns false once shutdown has started.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stops admission on every queue and discards pending jobs.
    ///
    /// With `wait`, blocks until running jobs finish or `timeout` elapses;
    /// jobs still running then are aborted and their futures dropped before
    /// this returns. Without `wait`, running jobs complete in the background.
    pub async fn shutdown(&self, wait: bool, timeout: Duration) {
        self.accepting.store(false, Ordering::SeqCst);
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        info!(wait, timeout_ms, "Shutting down queue manager");

        let queues: Vec<Arc<Queue>> = self.queues.read().values().cloned().collect();
        for queue in &queues {
            let discarded = queue.close();
            if discarded > 0 {
                warn!(queue = %queue.name(), discarded, "Discarded pending jobs");
                JobMetrics::discarded(queue.name(), discarded);
            }
        }

        self.shutdown_tx.send_replace(true);
        let mut workers = std::mem::take(&mut *self.workers.lock());

        if !wait {
            info!("Queue manager stopped accepting work");
            return;
        }

        match with_timeout(timeout, futures::future::join_all(workers.iter_mut())).await {
            Ok(_) => info!("All workers stopped"),
            Err(_) => {
                warn!(timeout_ms, "Shutdown timeout elapsed, aborting in-flight jobs");
                for handle in &workers {
                    handle.abort();
                }
                // Handles already joined above must not be polled again.
                let aborted = workers.into_iter().filter(|handle| !handle.is_finished());
                futures::future::join_all(aborted).await;
                for queue in &queues {
                    queue.abandon_running();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Succeed;

    #[async_trait]
    impl TaskHandler for Succeed {
        async fn handle(&self, _job: &Job) -> JobResult<()> {
            Ok(())
        }
    }

    struct Panics;

    #[async_trait]
    impl TaskHandler for Panics {
        async fn handle(&self, _job: &Job) -> JobResult<()> {
            panic!("boom");
        }
    }

    async fn wait_terminal(manager: &QueueManager, id: &JobId) -> JobInfo {
        for _ in 0..200 {
            if let Some(info) = manager.job(id) {
                if info.status.is_terminal() {
                    return info;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} did not finish", id);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "handler panicked: boom");

        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "handler panicked");
    }

    fn empty_state() -> QueueState {
        QueueState {
            pending: PendingQueue::new(),
            running: 0,
            jobs: HashMap::new(),
            succeeded: 0,
            failed: 0,
            timed_out: 0,
            accepting: true,
            last_purge: Instant::now(),
        }
    }

    fn finished_job(id: &str, age: chrono::Duration) -> JobInfo {
        let job = Job {
            id: JobId::from(id),
            queue: "q".into(),
            task_type: "t".into(),
            priority: Priority::Normal,
            payload: serde_json::Value::Null,
            submitted_at: Utc::now(),
        };
        let mut info = JobInfo::from(&job);
        info.mark_finished(&Ok(()));
        info.finished_at = Some(Utc::now() - age);
        info
    }

    #[test]
    fn test_purge_expired_keeps_unfinished() {
        let mut state = empty_state();
        state.jobs.insert(JobId::from("a"), finished_job("a", chrono::Duration::zero()));
        let running = Job {
            id: JobId::from("b"),
            queue: "q".into(),
            task_type: "t".into(),
            priority: Priority::Normal,
            payload: serde_json::Value::Null,
            submitted_at: Utc::now(),
        };
        state.jobs.insert(JobId::from("b"), JobInfo::from(&running));

        assert_eq!(state.purge_expired(Duration::ZERO), 1);
        assert!(state.jobs.contains_key(&JobId::from("b")));
    }

    #[test]
    fn test_sweep_runs_at_most_once_per_interval() {
        let retention = Duration::from_secs(3600);
        let mut state = empty_state();
        state
            .jobs
            .insert(JobId::from("old"), finished_job("old", chrono::Duration::hours(2)));

        state.purge_if_due(retention);
        assert_eq!(state.jobs.len(), 1);

        state.last_purge = Instant::now()
            .checked_sub(PURGE_INTERVAL + Duration::from_secs(1))
            .unwrap();
        state.purge_if_due(retention);
        assert!(state.jobs.is_empty());
        assert!(state.last_purge.elapsed() < PURGE_INTERVAL);
    }

    #[tokio::test]
    async fn test_submit_unknown_queue() {
        let manager = QueueManager::new();
        let err = manager
            .submit("missing", "t", serde_json::Value::Null, None)
            .unwrap_err();
        assert_eq!(err, SubmitError::QueueNotFound("missing".into()));
    }

    #[tokio::test]
    async fn test_job_succeeds() {
        let manager = QueueManager::new();
        manager.register_handler("ok", Arc::new(Succeed));
        manager.create_queue(QueueConfig::new("q")).unwrap();

        let id = manager.submit("q", "ok", serde_json::Value::Null, None).unwrap();
        assert!(id.as_str().starts_with("ok-"));

        let info = wait_terminal(&manager, &id).await;
        assert_eq!(info.status, JobStatus::Succeeded);
        assert!(info.started_at.is_some());
        assert_eq!(manager.queue_stats("q").unwrap().succeeded, 1);
    }

    #[tokio::test]
    async fn test_panicking_handler_fails_job_and_keeps_worker() {
        let manager = QueueManager::new();
        manager.register_handler("panic", Arc::new(Panics));
        manager.register_handler("ok", Arc::new(Succeed));
        manager
            .create_queue(QueueConfig::new("q").max_workers(1))
            .unwrap();

        let id = manager.submit("q", "panic", serde_json::Value::Null, None).unwrap();
        let info = wait_terminal(&manager, &id).await;
        assert_eq!(info.status, JobStatus::Failed);
        assert_eq!(info.failure_kind, Some(crate::FailureKind::Unexpected));

        let id = manager.submit("q", "ok", serde_json::Value::Null, None).unwrap();
        assert_eq!(wait_terminal(&manager, &id).await.status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_missing_handler_fails_job() {
        let manager = QueueManager::new();
        manager.create_queue(QueueConfig::new("q")).unwrap();

        let id = manager
            .submit("q", "unknown", serde_json::Value::Null, None)
            .unwrap();
        let info = wait_terminal(&manager, &id).await;
        assert_eq!(info.failure_kind, Some(crate::FailureKind::HandlerNotFound));
        assert_eq!(manager.queue_stats("q").unwrap().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_purge_finished() {
        let manager = QueueManager::new();
        manager.register_handler("ok", Arc::new(Succeed));
        manager
            .create_queue(QueueConfig::new("q").retention(Duration::ZERO))
            .unwrap();

        let id = manager.submit("q", "ok", serde_json::Value::Null, None).unwrap();
        wait_terminal(&manager, &id).await;

        assert_eq!(manager.purge_finished(), 1);
        assert!(manager.job(&id).is_none());
    }
}
