//! Task handler registry.

use crate::error::JobResult;
use crate::job::Job;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Executes jobs of one task type.
///
/// The returned future may be dropped at any await point when the queue's
/// task timeout expires, so resources must be released by destructors.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Runs one job to completion.
    async fn handle(&self, job: &Job) -> JobResult<()>;
}

/// Handlers keyed by task type.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any previous one for the task type.
    pub fn register(&self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.write().insert(task_type.into(), handler);
    }

    /// Returns the handler for a task type.
    #[must_use]
    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.read().get(task_type).cloned()
    }
}
