use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::info;

use ticketscout_core::{OrchestratorError, ScrapeCriteria, ScrapeReport};

use super::handlers::ErrorResponse;
use crate::state::AppState;

/// Run one scrape now. Profiles that ask for pre-sale monitoring also get
/// a recurring watch.
pub async fn scrape(
    State(state): State<Arc<AppState>>,
    Json(criteria): Json<ScrapeCriteria>,
) -> Result<Json<ScrapeReport>, (StatusCode, Json<ErrorResponse>)> {
    info!(keyword = %criteria.keyword, "Scrape requested");

    let cancel = state.shutdown_token().child_token();
    state
        .monitor()
        .scrape_and_watch(&criteria, &cancel)
        .await
        .map(Json)
        .map_err(|e: OrchestratorError| ErrorResponse::new(StatusCode::BAD_REQUEST, e))
}
