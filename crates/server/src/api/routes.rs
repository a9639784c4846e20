use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware::metrics_middleware, queue, scrape, watches};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/platforms", get(handlers::list_platforms))
        // Scraping
        .route("/scrape", post(scrape::scrape))
        // Virtual queues
        .route(
            "/queue/{platform}",
            get(queue::get_queue).delete(queue::clear_queue),
        )
        // Pre-sale watches
        .route("/watches", get(watches::list_watches))
        .route("/watches/{key}", axum::routing::delete(watches::delete_watch));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
