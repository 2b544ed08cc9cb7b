//! Priority classes and the ordered pending set of a queue.

use crate::job::Job;
use relay_resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::str::FromStr;

/// Job priority levels.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" | "medium" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Heap entry: higher priority first, then lower sequence (earlier submission).
struct PendingEntry {
    sequence: u64,
    job: Job,
}

impl PartialEq for PendingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PendingEntry {}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.job
            .priority
            .cmp(&other.job.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Pending jobs of one queue, FIFO within each priority class.
#[derive(Default)]
pub struct PendingQueue {
    heap: BinaryHeap<PendingEntry>,
    next_sequence: u64,
}

impl PendingQueue {
    /// Creates an empty pending set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a job behind every pending job of the same or higher priority.
    pub fn push(&mut self, job: Job) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(PendingEntry { sequence, job });
    }

    /// Removes the next job to run.
    pub fn pop(&mut self) -> Option<Job> {
        self.heap.pop().map(|entry| entry.job)
    }

    /// Number of pending jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns true when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Removes and returns every pending job.
    pub fn drain(&mut self) -> Vec<Job> {
        self.heap.drain().map(|entry| entry.job).collect()
    }
}

/// Queue statistics.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    /// Queue name.
    pub queue: String,
    /// Jobs waiting for a worker.
    pub pending: usize,
    /// Jobs executing.
    pub running: usize,
    /// Jobs that succeeded since the queue was created.
    pub succeeded: u64,
    /// Jobs that failed since the queue was created.
    pub failed: u64,
    /// Jobs that timed out since the queue was created.
    pub timed_out: u64,
    /// Worker pool size.
    pub max_workers: usize,
    /// Admission limit for pending plus running jobs.
    pub max_queue_depth: usize,
    /// Circuit breaker state.
    pub circuit_state: CircuitState,
    /// Consecutive failures counted by the circuit breaker.
    pub consecutive_failures: u32,
}
