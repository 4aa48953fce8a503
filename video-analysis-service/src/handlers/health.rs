use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;
use service_core::observability::render_metrics;

/// Liveness probe. Independent of every collaborator.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// Readiness probe: the scratch directory must still exist.
pub async fn readiness_check(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    if state.scratch.is_ready().await {
        Ok(StatusCode::OK)
    } else {
        tracing::error!(
            scratch_dir = %state.scratch.path().display(),
            "Scratch directory is missing"
        );
        Err(AppError::ServiceUnavailable)
    }
}

pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        render_metrics(),
    )
}
