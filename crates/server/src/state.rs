use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ticketscout_core::{Config, PreSaleMonitor, TicketScout};

/// Shared application state
pub struct AppState {
    config: Arc<Config>,
    monitor: Arc<PreSaleMonitor>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Arc<Config>, monitor: Arc<PreSaleMonitor>) -> Self {
        Self {
            config,
            monitor,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scout(&self) -> &TicketScout {
        self.monitor.scout()
    }

    pub fn monitor(&self) -> &PreSaleMonitor {
        &self.monitor
    }

    /// Cancelled on shutdown; in-flight scrapes run on child tokens.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}
