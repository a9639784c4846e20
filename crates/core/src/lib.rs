//! Ticket acquisition orchestrator.
//!
//! Classifies a search by demand, picks a scraping strategy, and runs it
//! concurrently across ticket platforms with pooled, fingerprinted sessions,
//! human pacing and virtual-queue handling. Results from every platform are
//! merged into one deduplicated, prioritized [`ResultSet`].

pub mod config;
pub mod delay;
pub mod demand;
pub mod executor;
pub mod fetch;
pub mod fingerprint;
pub mod kv;
pub mod listing;
pub mod merger;
pub mod metrics;
pub mod orchestrator;
pub mod parser;
pub mod queue;
pub mod session;
pub mod sink;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, PlatformConfig,
    WatchConfig,
};
pub use delay::{ActionKind, DelayConfig, Delayer, HumanPacer};
pub use demand::{DemandClassifier, DemandLevel, DemandProfile, StrategyName, StrategyProfile};
pub use executor::{ExecutionOutcome, FailureKind, PlatformExecution, ScrapeExecutor};
pub use fetch::{FetchError, FetchRequest, FetchResponse, Fetcher, ReqwestFetcher};
pub use fingerprint::{BrowserArchetype, FingerprintSynthesizer, SessionProfile};
pub use kv::{KeyValueStore, MemoryStore, StoreError};
pub use listing::{Availability, CandidateTicket, ScrapeCriteria, ScrapedTicket};
pub use merger::{PlatformStats, ResultSet};
pub use orchestrator::{
    OrchestratorError, PreSaleMonitor, ScrapeReport, TicketScout, TicketScoutBuilder,
};
pub use parser::{DocumentParser, JsonLdEventParser, ParseError, ParserRegistry};
pub use queue::{DeclineBypass, QueueBypass, QueuePhase, QueueState, QueueTracker};
pub use session::{SessionLease, SessionPool};
pub use sink::{SinkError, SqliteTicketSink, TicketSink};
