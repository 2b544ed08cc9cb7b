//! Application assembly and lifecycle.

use crate::di::build_module;
use crate::startup::print_startup_info;
use axum::Router;
use relay_config::{AppConfig, QueueSettings};
use relay_core::{RelayError, RelayResult};
use relay_jobs::{JobPayload, Priority, QueueConfig, QueueManager};
use relay_rest::{create_router, AppState};
use relay_service::{AudioJobPayload, MediaCredentials, ProcessAudioHandler};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Converts queue settings into a queue configuration.
///
/// # Errors
///
/// Returns a configuration error for an unknown priority class.
pub fn queue_config(settings: &QueueSettings) -> RelayResult<QueueConfig> {
    let priority: Priority = settings
        .priority
        .parse()
        .map_err(|e: String| RelayError::configuration(format!("queue.priority: {}", e)))?;

    Ok(QueueConfig::new(settings.name.clone())
        .max_workers(settings.max_workers)
        .max_queue_depth(settings.max_queue_depth)
        .priority(priority)
        .task_timeout(settings.task_timeout())
        .circuit_breaker_failure_threshold(settings.circuit_breaker_failure_threshold)
        .circuit_breaker_reset(settings.circuit_breaker_reset())
        .retention(settings.retention()))
}

/// A fully wired relay: queue manager with its handler, and the router.
pub struct Application {
    pub router: Router,
    pub queue_manager: Arc<QueueManager>,
    shutdown_timeout: Duration,
}

impl Application {
    /// Wires services, creates the voice queue and builds the router.
    ///
    /// Must run inside a Tokio runtime because the queue spawns its workers.
    ///
    /// # Errors
    ///
    /// Fails on invalid queue settings or HTTP client construction.
    pub fn build(config: &AppConfig) -> RelayResult<Self> {
        let module = build_module(config)?;
        let messaging = module.messaging_service();

        let handler = ProcessAudioHandler::new(
            module.audio_service(),
            module.transcription_service(),
            messaging.clone(),
            config.pipeline.mode,
            MediaCredentials::new(
                config.twilio.account_sid.clone(),
                config.twilio.auth_token.clone(),
            ),
        );

        let queue_manager = Arc::new(QueueManager::new());
        queue_manager.register_handler(AudioJobPayload::TASK_TYPE, Arc::new(handler));
        queue_manager.create_queue(queue_config(&config.queue)?)?;

        info!(
            queue = %config.queue.name,
            workers = config.queue.max_workers,
            mode = %config.pipeline.mode,
            target_language = %config.pipeline.target_language,
            "Voice queue ready"
        );

        let state = AppState::new(
            queue_manager.clone(),
            messaging,
            config.queue.name.clone(),
            config.pipeline.clone(),
        );
        let router = create_router(state, &config.server);

        Ok(Self {
            router,
            queue_manager,
            shutdown_timeout: config.queue.shutdown_timeout(),
        })
    }

    /// Serves HTTP until `shutdown` resolves, then drains the queue.
    ///
    /// # Errors
    ///
    /// Returns an internal error if binding or serving fails.
    pub async fn serve<F>(self, addr: &str, shutdown: F) -> RelayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Internal(format!("Failed to bind {}: {}", addr, e)))?;

        if let Ok(local) = listener.local_addr() {
            print_startup_info(local.port());
        }

        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| RelayError::Internal(format!("HTTP server error: {}", e)));

        info!(
            timeout_secs = self.shutdown_timeout.as_secs(),
            "HTTP server stopped, draining voice queue"
        );
        self.queue_manager.shutdown(true, self.shutdown_timeout).await;

        served
    }
}

/// Builds and serves the application until a shutdown signal arrives.
///
/// # Errors
///
/// Propagates build and serve failures.
pub async fn run<F>(config: AppConfig, shutdown: F) -> RelayResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = Application::build(&config)?;
    app.serve(&config.server.addr(), shutdown).await?;
    info!("Server shutdown complete");
    Ok(())
}
