use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use ticketscout_core::QueueState;

use super::handlers::ErrorResponse;
use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Serialize)]
pub struct QueueStatus {
    pub platform: String,
    pub in_queue: bool,
    /// Seconds until the marker expires on its own.
    pub marker_remaining_secs: Option<u64>,
    pub state: Option<QueueState>,
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub platform: String,
    pub cleared: bool,
}

fn known_platform(state: &AppState, platform: &str) -> Result<(), ApiError> {
    match state.config().platform(platform) {
        Some(_) => Ok(()),
        None => Err(ErrorResponse::new(
            StatusCode::NOT_FOUND,
            format!("Unknown platform: {}", platform),
        )),
    }
}

pub async fn get_queue(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
) -> Result<Json<QueueStatus>, ApiError> {
    known_platform(&state, &platform)?;
    let queue = state.scout().queue();

    let marker = queue
        .state(&platform)
        .await
        .map_err(|e| ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    let remaining = queue
        .remaining(&platform)
        .await
        .map_err(|e| ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    Ok(Json(QueueStatus {
        in_queue: marker.as_ref().is_some_and(|m| m.in_queue),
        marker_remaining_secs: remaining.map(|d| d.as_secs()),
        state: marker,
        platform,
    }))
}

/// Drop the shared in-queue marker so waiting executions resume.
pub async fn clear_queue(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
) -> Result<Json<ClearResponse>, ApiError> {
    known_platform(&state, &platform)?;
    let cleared = state
        .scout()
        .queue()
        .clear(&platform)
        .await
        .map_err(|e| ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    tracing::info!(platform = %platform, cleared, "Queue marker cleared via API");
    Ok(Json(ClearResponse { platform, cleared }))
}
