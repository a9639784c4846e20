use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use ticketscout_core::{
    demand::StrategyTable, fetch::RateLimitStatus, session::PoolStatus, Config, DemandProfile,
    StrategyName,
};

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, error: impl ToString) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                error: error.to_string(),
            }),
        )
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Configuration as exposed over the API.
#[derive(Serialize)]
pub struct ConfigSummary {
    pub port: u16,
    pub database_enabled: bool,
    pub platforms: Vec<PlatformSummary>,
    pub strategies: StrategyTable,
    pub demand_profiles: Vec<DemandProfile>,
    pub watches: usize,
}

#[derive(Serialize)]
pub struct PlatformSummary {
    pub id: String,
    pub base_url: String,
    pub requests_per_minute: u32,
    pub delay_multiplier: f64,
    pub default_strategy: Option<StrategyName>,
}

impl From<&Config> for ConfigSummary {
    fn from(config: &Config) -> Self {
        Self {
            port: config.server.port,
            database_enabled: config.database.enabled,
            platforms: config
                .platforms
                .iter()
                .map(|p| PlatformSummary {
                    id: p.id.clone(),
                    base_url: p.base_url.clone(),
                    requests_per_minute: p.requests_per_minute,
                    delay_multiplier: p.delay_multiplier,
                    default_strategy: p.default_strategy,
                })
                .collect(),
            strategies: config.strategies.clone(),
            demand_profiles: config.demand.profiles.clone(),
            watches: config.watches.len(),
        }
    }
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<ConfigSummary> {
    Json(ConfigSummary::from(state.config()))
}

/// Live state of one platform.
#[derive(Serialize)]
pub struct PlatformStatus {
    pub id: String,
    pub pool: Option<PoolStatus>,
    pub rate_limit: Option<RateLimitStatus>,
    pub in_queue: bool,
    pub cooldown_remaining_secs: Option<u64>,
}

pub async fn list_platforms(State(state): State<Arc<AppState>>) -> Json<Vec<PlatformStatus>> {
    let scout = state.scout();
    let pools = scout.pool().status().await;

    let mut platforms = Vec::with_capacity(state.config().platforms.len());
    for platform in &state.config().platforms {
        let id = platform.id.as_str();
        platforms.push(PlatformStatus {
            id: id.to_string(),
            pool: pools.iter().find(|p| p.platform == id).cloned(),
            rate_limit: scout.rate_limiter().get_status(id).await,
            in_queue: scout.queue().is_in_queue(id).await.unwrap_or(false),
            cooldown_remaining_secs: scout
                .cooldowns()
                .remaining(id)
                .await
                .ok()
                .flatten()
                .map(|d| d.as_secs()),
        });
    }
    Json(platforms)
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state).await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
