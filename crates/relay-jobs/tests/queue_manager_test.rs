//! Queue manager behaviour: ordering, admission, timeouts and shutdown.

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_jobs::{
    CircuitState, FailureKind, Job, JobError, JobId, JobInfo, JobResult, JobStatus, Priority,
    QueueConfig, QueueConfigError, QueueManager, SubmitError, TaskHandler,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

const QUEUE: &str = "audio_processing";

/// Blocks until the test releases a permit.
struct Gate(Arc<Semaphore>);

#[async_trait]
impl TaskHandler for Gate {
    async fn handle(&self, _job: &Job) -> JobResult<()> {
        let permit = self.0.acquire().await.map_err(|e| JobError::Unexpected(e.to_string()))?;
        permit.forget();
        Ok(())
    }
}

/// Records the `name` field of each payload in execution order.
#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

#[async_trait]
impl TaskHandler for Recorder {
    async fn handle(&self, job: &Job) -> JobResult<()> {
        let name = job.payload["name"].as_str().unwrap_or_default().to_string();
        self.0.lock().push(name);
        Ok(())
    }
}

struct AlwaysFail;

#[async_trait]
impl TaskHandler for AlwaysFail {
    async fn handle(&self, _job: &Job) -> JobResult<()> {
        Err(JobError::AudioDownload("connection refused".into()))
    }
}

struct Succeed;

#[async_trait]
impl TaskHandler for Succeed {
    async fn handle(&self, _job: &Job) -> JobResult<()> {
        Ok(())
    }
}

/// Sets a flag when dropped, standing in for a temporary artifact.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct Hang {
    cleaned_up: Arc<AtomicBool>,
}

#[async_trait]
impl TaskHandler for Hang {
    async fn handle(&self, _job: &Job) -> JobResult<()> {
        let _artifact = DropFlag(self.cleaned_up.clone());
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

struct Sleepy {
    active: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl TaskHandler for Sleepy {
    async fn handle(&self, _job: &Job) -> JobResult<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn submit(manager: &QueueManager, task_type: &str, name: &str, priority: Priority) -> JobId {
    manager
        .submit(QUEUE, task_type, json!({ "name": name }), Some(priority))
        .unwrap()
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn wait_terminal(manager: &QueueManager, id: &JobId) -> JobInfo {
    wait_for(|| manager.job(id).is_some_and(|info| info.status.is_terminal())).await;
    manager.job(id).unwrap()
}

async fn wait_running(manager: &QueueManager, count: usize) {
    wait_for(|| manager.queue_stats(QUEUE).unwrap().running == count).await;
}

#[tokio::test]
async fn test_fifo_within_priority() {
    let manager = QueueManager::new();
    let gate = Arc::new(Semaphore::new(0));
    let recorder = Arc::new(Recorder::default());
    manager.register_handler("gate", Arc::new(Gate(gate.clone())));
    manager.register_handler("record", recorder.clone());
    manager
        .create_queue(QueueConfig::new(QUEUE).max_workers(1))
        .unwrap();

    submit(&manager, "gate", "blocker", Priority::Critical);
    wait_running(&manager, 1).await;

    submit(&manager, "record", "C", Priority::Low);
    submit(&manager, "record", "A", Priority::High);
    submit(&manager, "record", "B", Priority::High);
    let last = submit(&manager, "record", "D", Priority::Normal);

    gate.add_permits(1);
    wait_terminal(&manager, &last).await;

    assert_eq!(*recorder.0.lock(), vec!["A", "B", "D", "C"]);
}

#[tokio::test]
async fn test_worker_pool_is_bounded() {
    let manager = QueueManager::new();
    let handler = Arc::new(Sleepy {
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    manager.register_handler("sleepy", handler.clone());
    manager
        .create_queue(QueueConfig::new(QUEUE).max_workers(2))
        .unwrap();

    let ids: Vec<_> = (0..6)
        .map(|i| submit(&manager, "sleepy", &i.to_string(), Priority::Normal))
        .collect();
    for id in &ids {
        wait_terminal(&manager, id).await;
    }

    assert_eq!(handler.peak.load(Ordering::SeqCst), 2);
    assert_eq!(manager.queue_stats(QUEUE).unwrap().succeeded, 6);
}

#[tokio::test]
async fn test_submit_does_not_wait_for_execution() {
    let manager = QueueManager::new();
    let cleaned_up = Arc::new(AtomicBool::new(false));
    manager.register_handler("hang", Arc::new(Hang { cleaned_up }));
    manager
        .create_queue(QueueConfig::new(QUEUE).max_workers(1))
        .unwrap();

    let started = Instant::now();
    for i in 0..10 {
        submit(&manager, "hang", &i.to_string(), Priority::Normal);
    }
    assert!(started.elapsed() < Duration::from_millis(500));

    manager.shutdown(false, Duration::ZERO).await;
}

#[tokio::test]
async fn test_circuit_opens_after_threshold() {
    let manager = QueueManager::new();
    manager.register_handler("fail", Arc::new(AlwaysFail));
    manager.register_handler("ok", Arc::new(Succeed));
    manager
        .create_queue(
            QueueConfig::new(QUEUE)
                .max_workers(1)
                .circuit_breaker_failure_threshold(3)
                .circuit_breaker_reset(None),
        )
        .unwrap();

    for i in 0..3 {
        let id = submit(&manager, "fail", &i.to_string(), Priority::Normal);
        let info = wait_terminal(&manager, &id).await;
        assert_eq!(info.status, JobStatus::Failed);
        assert_eq!(info.failure_kind, Some(FailureKind::AudioDownloadError));
    }

    let stats = manager.queue_stats(QUEUE).unwrap();
    assert_eq!(stats.circuit_state, CircuitState::Open);
    assert_eq!(stats.consecutive_failures, 3);

    let err = manager
        .submit(QUEUE, "ok", json!({}), None)
        .unwrap_err();
    assert_eq!(err, SubmitError::CircuitOpen(QUEUE.to_string()));

    assert!(manager.reset_circuit(QUEUE));
    let id = manager.submit(QUEUE, "ok", json!({}), None).unwrap();
    assert_eq!(wait_terminal(&manager, &id).await.status, JobStatus::Succeeded);
}

#[tokio::test]
async fn test_success_resets_failure_count() {
    let manager = QueueManager::new();
    manager.register_handler("fail", Arc::new(AlwaysFail));
    manager.register_handler("ok", Arc::new(Succeed));
    manager
        .create_queue(
            QueueConfig::new(QUEUE)
                .max_workers(1)
                .circuit_breaker_failure_threshold(3),
        )
        .unwrap();

    for i in 0..2 {
        let id = submit(&manager, "fail", &i.to_string(), Priority::Normal);
        wait_terminal(&manager, &id).await;
    }
    assert_eq!(manager.queue_stats(QUEUE).unwrap().consecutive_failures, 2);

    let id = submit(&manager, "ok", "ok", Priority::Normal);
    wait_terminal(&manager, &id).await;

    let stats = manager.queue_stats(QUEUE).unwrap();
    assert_eq!(stats.consecutive_failures, 0);
    assert_eq!(stats.circuit_state, CircuitState::Closed);
}

#[tokio::test]
async fn test_half_open_trial_closes_circuit() {
    let manager = QueueManager::new();
    manager.register_handler("fail", Arc::new(AlwaysFail));
    manager.register_handler("ok", Arc::new(Succeed));
    manager
        .create_queue(
            QueueConfig::new(QUEUE)
                .max_workers(1)
                .circuit_breaker_failure_threshold(1)
                .circuit_breaker_reset(Some(Duration::from_millis(50))),
        )
        .unwrap();

    let id = submit(&manager, "fail", "x", Priority::Normal);
    wait_terminal(&manager, &id).await;
    assert!(matches!(
        manager.submit(QUEUE, "ok", json!({}), None),
        Err(SubmitError::CircuitOpen(_))
    ));

    tokio::time::sleep(Duration::from_millis(80)).await;
    let trial = manager.submit(QUEUE, "ok", json!({}), None).unwrap();
    wait_terminal(&manager, &trial).await;

    assert_eq!(
        manager.queue_stats(QUEUE).unwrap().circuit_state,
        CircuitState::Closed
    );
}

#[tokio::test]
async fn test_timeout_marks_job_and_cleans_up() {
    let manager = QueueManager::new();
    let cleaned_up = Arc::new(AtomicBool::new(false));
    manager.register_handler(
        "hang",
        Arc::new(Hang {
            cleaned_up: cleaned_up.clone(),
        }),
    );
    manager
        .create_queue(
            QueueConfig::new(QUEUE)
                .max_workers(1)
                .task_timeout(Duration::from_millis(50)),
        )
        .unwrap();

    let id = submit(&manager, "hang", "slow", Priority::Normal);
    let info = wait_terminal(&manager, &id).await;

    assert_eq!(info.status, JobStatus::TimedOut);
    assert_eq!(info.failure_kind, Some(FailureKind::Timeout));
    assert!(cleaned_up.load(Ordering::SeqCst));

    let stats = manager.queue_stats(QUEUE).unwrap();
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.consecutive_failures, 1);
}

#[tokio::test]
async fn test_queue_full() {
    let manager = QueueManager::new();
    let gate = Arc::new(Semaphore::new(0));
    manager.register_handler("gate", Arc::new(Gate(gate.clone())));
    manager
        .create_queue(QueueConfig::new(QUEUE).max_workers(1).max_queue_depth(2))
        .unwrap();

    submit(&manager, "gate", "running", Priority::Normal);
    wait_running(&manager, 1).await;
    submit(&manager, "gate", "pending", Priority::Normal);

    let err = manager
        .submit(QUEUE, "gate", json!({}), None)
        .unwrap_err();
    assert!(matches!(err, SubmitError::QueueFull { depth: 2, .. }));

    gate.add_permits(2);
}

#[tokio::test]
async fn test_duplicate_queue_keeps_original_config() {
    let manager = QueueManager::new();
    manager
        .create_queue(QueueConfig::new(QUEUE).max_workers(2))
        .unwrap();

    let err = manager
        .create_queue(QueueConfig::new(QUEUE).max_workers(7))
        .unwrap_err();

    assert_eq!(err, QueueConfigError::DuplicateQueue(QUEUE.to_string()));
    assert_eq!(manager.queue_stats(QUEUE).unwrap().max_workers, 2);
}

#[tokio::test]
async fn test_invalid_queue_config_rejected() {
    let manager = QueueManager::new();
    let err = manager
        .create_queue(QueueConfig::new(QUEUE).max_queue_depth(0))
        .unwrap_err();

    assert!(matches!(err, QueueConfigError::InvalidField { .. }));
    assert!(!manager.has_queue(QUEUE));
}

#[tokio::test]
async fn test_shutdown_discards_pending_and_drains_running() {
    let manager = QueueManager::new();
    let gate = Arc::new(Semaphore::new(0));
    let recorder = Arc::new(Recorder::default());
    manager.register_handler("gate", Arc::new(Gate(gate.clone())));
    manager.register_handler("record", recorder.clone());
    manager
        .create_queue(QueueConfig::new(QUEUE).max_workers(1))
        .unwrap();

    let running = submit(&manager, "gate", "running", Priority::Normal);
    wait_running(&manager, 1).await;
    let pending = submit(&manager, "record", "never", Priority::Normal);

    let release = gate.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        release.add_permits(1);
    });
    manager.shutdown(true, Duration::from_secs(2)).await;

    assert_eq!(manager.job(&running).unwrap().status, JobStatus::Succeeded);
    assert!(manager.job(&pending).is_none());
    assert!(recorder.0.lock().is_empty());
    assert_eq!(
        manager.submit(QUEUE, "record", json!({}), None).unwrap_err(),
        SubmitError::ShuttingDown
    );
}

#[tokio::test]
async fn test_shutdown_timeout_aborts_running_jobs() {
    let manager = QueueManager::new();
    let cleaned_up = Arc::new(AtomicBool::new(false));
    manager.register_handler(
        "hang",
        Arc::new(Hang {
            cleaned_up: cleaned_up.clone(),
        }),
    );
    manager
        .create_queue(QueueConfig::new(QUEUE).max_workers(1))
        .unwrap();

    let id = submit(&manager, "hang", "stuck", Priority::Normal);
    wait_running(&manager, 1).await;

    let started = Instant::now();
    manager.shutdown(true, Duration::from_millis(50)).await;
    assert!(started.elapsed() < Duration::from_secs(1));

    assert!(cleaned_up.load(Ordering::SeqCst));
    let info = manager.job(&id).unwrap();
    assert_eq!(info.status, JobStatus::Failed);
    assert_eq!(info.error.as_deref(), Some("Unexpected error: aborted during shutdown"));
    assert_eq!(manager.queue_stats(QUEUE).unwrap().running, 0);
}
