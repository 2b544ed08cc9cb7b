//! Main application router.

use crate::{
    controllers::{health_controller, jobs_controller, webhook_controller},
    middleware::logging_middleware,
    state::AppState,
};
use axum::{middleware, routing::get, Router};
use relay_config::ServerConfig;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

/// Creates the application router.
pub fn create_router(state: AppState, server_config: &ServerConfig) -> Router {
    let api_router = jobs_controller::router();

    let router = Router::new()
        .merge(health_controller::router())
        .merge(webhook_controller::router())
        .nest("/api/v1", api_router)
        .route("/", get(root))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(server_config.max_body_size))
        .layer(TimeoutLayer::new(server_config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(logging_middleware));

    info!("Router created with webhook at /webhook");
    router
}

async fn root() -> &'static str {
    "WhatsApp voice relay"
}
