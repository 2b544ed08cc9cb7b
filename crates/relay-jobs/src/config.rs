//! Queue configuration.

use crate::error::QueueConfigError;
use crate::queue::Priority;
use std::time::Duration;

/// Definition of one named queue. Immutable once the queue is created.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Unique queue name.
    pub name: String,
    /// Number of concurrent workers.
    pub max_workers: usize,
    /// Admission limit for pending plus running jobs.
    pub max_queue_depth: usize,
    /// Priority applied to submissions that do not name one.
    pub priority: Priority,
    /// Per-job execution deadline.
    pub task_timeout: Duration,
    /// Consecutive failures that open the circuit.
    pub circuit_breaker_failure_threshold: u32,
    /// Delay before an open circuit admits a trial job. `None` disables.
    pub circuit_breaker_reset: Option<Duration>,
    /// How long finished jobs stay queryable.
    pub retention: Duration,
}

impl QueueConfig {
    /// Creates a configuration with default limits.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_workers: 5,
            max_queue_depth: 100,
            priority: Priority::Normal,
            task_timeout: Duration::from_secs(300),
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_reset: Some(Duration::from_secs(60)),
            retention: Duration::from_secs(3600),
        }
    }

    /// Sets the worker pool size.
    #[must_use]
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Sets the depth limit.
    #[must_use]
    pub fn max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth;
        self
    }

    /// Sets the default priority class.
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the per-job timeout.
    #[must_use]
    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Sets the circuit breaker threshold.
    #[must_use]
    pub fn circuit_breaker_failure_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker_failure_threshold = threshold;
        self
    }

    /// Sets or disables the automatic half-open delay.
    #[must_use]
    pub fn circuit_breaker_reset(mut self, reset: Option<Duration>) -> Self {
        self.circuit_breaker_reset = reset;
        self
    }

    /// Sets the retention window for finished jobs.
    #[must_use]
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Checks every field that must be positive.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field.
    pub fn validate(&self) -> Result<(), QueueConfigError> {
        let invalid = |field: &'static str, reason: &str| {
            Err(QueueConfigError::InvalidField {
                field,
                reason: reason.to_string(),
            })
        };

        if self.name.trim().is_empty() {
            return invalid("name", "must not be empty");
        }
        if self.max_workers == 0 {
            return invalid("max_workers", "must be at least 1");
        }
        if self.max_queue_depth == 0 {
            return invalid("max_queue_depth", "must be at least 1");
        }
        if self.task_timeout.is_zero() {
            return invalid("task_timeout", "must be positive");
        }
        if self.circuit_breaker_failure_threshold == 0 {
            return invalid("circuit_breaker_failure_threshold", "must be at least 1");
        }
        if self.circuit_breaker_reset.is_some_and(|d| d.is_zero()) {
            return invalid("circuit_breaker_reset", "must be positive when set");
        }
        Ok(())
    }
}
