//! Application state for Axum handlers.

use relay_config::PipelineConfig;
use relay_jobs::QueueManager;
use relay_service::MessagingService;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub queue_manager: Arc<QueueManager>,
    pub messaging: Arc<dyn MessagingService>,
    /// Queue that receives voice-message jobs.
    pub queue_name: String,
    pub pipeline: PipelineConfig,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        queue_manager: Arc<QueueManager>,
        messaging: Arc<dyn MessagingService>,
        queue_name: impl Into<String>,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            queue_manager,
            messaging,
            queue_name: queue_name.into(),
            pipeline,
        }
    }
}
