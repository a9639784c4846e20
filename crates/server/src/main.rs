use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ticketscout_core::{
    load_config, orchestrator::WatchCallback, validate_config, JsonLdEventParser, MemoryStore,
    OrchestratorError, ParserRegistry, PreSaleMonitor, ReqwestFetcher, ScrapeReport,
    SqliteTicketSink, TicketScout,
};

use ticketscout_server::{create_router, metrics::WATCH_RUNS, AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("TICKETSCOUT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        platforms = config.platforms.len(),
        watches = config.watches.len(),
        config_hash = &config_hash[..16],
        "Configuration loaded"
    );
    let config = Arc::new(config);

    let fetcher = Arc::new(ReqwestFetcher::new(&config.http).context("Failed to build HTTP client")?);
    let store = Arc::new(MemoryStore::new());

    let mut parsers = ParserRegistry::new();
    for platform in &config.platforms {
        parsers.register(platform.id.clone(), Arc::new(JsonLdEventParser::new()));
    }

    let mut builder = TicketScout::builder(config.clone(), fetcher, store.clone(), parsers);
    if config.database.enabled {
        let sink = SqliteTicketSink::new(&config.database.path)
            .with_context(|| format!("Failed to open database {:?}", config.database.path))?;
        info!("Persisting tickets to {:?}", config.database.path);
        builder = builder.sink(Arc::new(sink));
    } else {
        info!("Database disabled; tickets are not persisted");
    }
    let scout = Arc::new(builder.build());

    let callback: WatchCallback = Arc::new(record_watch_run);
    let monitor = Arc::new(PreSaleMonitor::new(scout.clone(), store).with_callback(callback));
    monitor.start_configured(&config.watches).await;

    let eviction_cancel = CancellationToken::new();
    let eviction = tokio::spawn(scout.pool().clone().run_eviction(
        config.orchestrator.session_eviction_interval(),
        eviction_cancel.clone(),
    ));

    let state = Arc::new(AppState::new(config.clone(), monitor.clone()));
    let app = create_router(state.clone());

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.shutdown_token().clone()))
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    monitor.stop().await;
    eviction_cancel.cancel();
    if let Err(e) = eviction.await {
        warn!(error = %e, "Session eviction task failed");
    }
    info!("Shutdown complete");

    Ok(())
}

fn record_watch_run(key: &str, result: &Result<ScrapeReport, OrchestratorError>) {
    match result {
        Ok(report) => {
            WATCH_RUNS.with_label_values(&["ok"]).inc();
            info!(
                key = %key,
                tickets = report.result.tickets.len(),
                cancelled = report.result.cancelled,
                "Watch run finished"
            );
        }
        Err(e) => {
            WATCH_RUNS.with_label_values(&["error"]).inc();
            warn!(key = %key, error = %e, "Watch run failed");
        }
    }
}

/// Wait for Ctrl+C or SIGTERM, then cancel in-flight scrapes.
async fn shutdown_signal(scrapes: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    scrapes.cancel();
}
