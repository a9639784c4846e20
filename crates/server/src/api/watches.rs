use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use ticketscout_core::orchestrator::WatchInfo;

use super::handlers::ErrorResponse;
use crate::state::AppState;

pub async fn list_watches(State(state): State<Arc<AppState>>) -> Json<Vec<WatchInfo>> {
    Json(state.monitor().active().await)
}

pub async fn delete_watch(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    if state.monitor().unregister(&key).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ErrorResponse::new(
            StatusCode::NOT_FOUND,
            format!("No active watch: {}", key),
        ))
    }
}
