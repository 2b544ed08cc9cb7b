//! Relay Jobs - in-process job queue
//!
//! Named queues, each with:
//! - A bounded pool of `max_workers` Tokio tasks
//! - FIFO-within-priority ordering (critical, high, normal, low)
//! - A per-job execution timeout that drops the handler future on expiry
//! - A consecutive-failure circuit breaker guarding admission
//! - Job status tracking with a retention window
//!
//! # Architecture
//!
//! ```text
//!  submit() ──► [circuit breaker] ──► [depth limit] ──► pending (priority heap)
//!                                                          │
//!                                   ┌──────────────────────┼──────────────────────┐
//!                                   ▼                      ▼                      ▼
//!                               worker 0               worker 1      ...      worker N-1
//!                                   │  timeout(catch_unwind(handler.handle(job)))
//!                                   ▼
//!                      status + breaker outcome + metrics
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_jobs::{JobPayload, QueueConfig, QueueManager};
//!
//! let manager = QueueManager::new();
//! manager.create_queue(QueueConfig::new("audio_processing").max_workers(5))?;
//! manager.register_handler(ProcessAudio::TASK_TYPE, handler);
//! let job_id = manager.enqueue("audio_processing", &payload, None)?;
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod job;
pub mod manager;
pub mod metrics;
pub mod queue;

pub use config::QueueConfig;
pub use error::{FailureKind, JobError, JobResult, QueueConfigError, SubmitError};
pub use handler::{HandlerRegistry, TaskHandler};
pub use job::{Job, JobId, JobInfo, JobPayload, JobStatus};
pub use manager::QueueManager;
pub use metrics::{register_metrics, JobMetrics};
pub use queue::{PendingQueue, Priority, QueueStats};
pub use relay_resilience::CircuitState;
