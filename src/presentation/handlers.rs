// HTTP request handlers
use crate::domain::point::SubmissionRequest;
use crate::presentation::app_state::AppState;
use axum::{body::Bytes, extract::State, http::StatusCode};
use std::sync::Arc;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Accepts one submission request as JSON
pub async fn submit(State(state): State<Arc<AppState>>, body: Bytes) -> StatusCode {
    let req: SubmissionRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            tracing::debug!("rejecting submit body: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    match state.submitter.submit(&req).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            tracing::error!("submitting {} {}: {:#}", req.id, req.direction_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
