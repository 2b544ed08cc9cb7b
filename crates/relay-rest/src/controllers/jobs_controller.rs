//! Job and queue inspection.

use crate::responses::{ok, ApiResult, AppError};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Router,
};
use relay_core::RelayError;
use relay_jobs::{JobId, JobInfo, QueueStats};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Creates the jobs router, nested under `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs/:job_id", get(get_job))
        .route("/queues/:queue/stats", get(queue_stats))
        .route("/queues/:queue/circuit/reset", post(reset_circuit))
}

/// Circuit reset result.
#[derive(Debug, Serialize, Deserialize)]
pub struct CircuitResetResponse {
    pub queue: String,
    pub reset: bool,
}

async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<JobInfo> {
    state
        .queue_manager
        .job(&JobId::from_string(job_id.as_str()))
        .ok_or_else(|| AppError(RelayError::not_found("Job", job_id)))
        .and_then(ok)
}

async fn queue_stats(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> ApiResult<QueueStats> {
    state
        .queue_manager
        .queue_stats(&queue)
        .ok_or_else(|| AppError(RelayError::not_found("Queue", queue)))
        .and_then(ok)
}

async fn reset_circuit(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> ApiResult<CircuitResetResponse> {
    if !state.queue_manager.reset_circuit(&queue) {
        return Err(AppError(RelayError::not_found("Queue", queue)));
    }
    info!(queue = %queue, "Circuit breaker reset by operator");
    ok(CircuitResetResponse { queue, reset: true })
}
