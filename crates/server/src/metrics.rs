//! Prometheus metrics for the HTTP surface.
//!
//! Scrape-level counters live in `ticketscout_core::metrics` and are
//! registered here alongside:
//! - HTTP request metrics (latency, counts, in flight)
//! - Scheduled watch runs
//! - Session pool, queue and cooldown gauges (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "ticketscout_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ticketscout_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "ticketscout_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Watch Metrics
// =============================================================================

/// Scheduled watch runs by result.
pub static WATCH_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ticketscout_watch_runs_total", "Scheduled watch runs"),
        &["result"], // "ok", "error"
    )
    .unwrap()
});

pub static WATCHES_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("ticketscout_watches_active", "Number of active pre-sale watches").unwrap()
});

// =============================================================================
// Platform Metrics (collected dynamically)
// =============================================================================

pub static SESSIONS_ACTIVE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("ticketscout_sessions_active", "Pooled sessions per platform"),
        &["platform"],
    )
    .unwrap()
});

pub static PLATFORMS_QUEUED: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "ticketscout_platform_queued",
            "Whether a platform is behind a virtual queue (1) or not (0)",
        ),
        &["platform"],
    )
    .unwrap()
});

pub static PLATFORMS_COOLING_DOWN: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "ticketscout_platform_cooling_down",
            "Whether a platform is in a challenge or block cooldown (1) or not (0)",
        ),
        &["platform"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Watches
    registry.register(Box::new(WATCH_RUNS.clone())).unwrap();
    registry.register(Box::new(WATCHES_ACTIVE.clone())).unwrap();

    // Platforms
    registry.register(Box::new(SESSIONS_ACTIVE.clone())).unwrap();
    registry
        .register(Box::new(PLATFORMS_QUEUED.clone()))
        .unwrap();
    registry
        .register(Box::new(PLATFORMS_COOLING_DOWN.clone()))
        .unwrap();

    // Core metrics (executions, sessions, challenges, queues)
    for metric in ticketscout_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Refresh the gauges that mirror live state before encoding.
pub async fn collect_dynamic_metrics(state: &AppState) {
    WATCHES_ACTIVE.set(state.monitor().active().await.len() as i64);

    let scout = state.scout();
    for status in scout.pool().status().await {
        SESSIONS_ACTIVE
            .with_label_values(&[status.platform.as_str()])
            .set(status.sessions as i64);
    }

    for platform in &state.config().platforms {
        let id = platform.id.as_str();
        if let Ok(queued) = scout.queue().is_in_queue(id).await {
            PLATFORMS_QUEUED.with_label_values(&[id]).set(queued as i64);
        }
        if let Ok(remaining) = scout.cooldowns().remaining(id).await {
            PLATFORMS_COOLING_DOWN
                .with_label_values(&[id])
                .set(remaining.is_some() as i64);
        }
    }
}

static KEYED_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(queue|watches)/[^/]+").unwrap());

/// Normalize a path for metric labels (replace platform ids and watch keys
/// with placeholders).
pub fn normalize_path(path: &str) -> String {
    KEYED_SEGMENT
        .replace_all(path, |caps: &regex_lite::Captures| match &caps[1] {
            "watches" => "/watches/{key}".to_string(),
            segment => format!("/{segment}/{{platform}}"),
        })
        .to_string()
}
