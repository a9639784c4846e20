//! Pluggable document parsers, selected per platform.

mod jsonld;

pub use jsonld::JsonLdEventParser;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::listing::CandidateTicket;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("Unsupported document: {0}")]
    Unsupported(String),
}

/// Turns a fetched document into candidate tickets.
///
/// Implementations are site-specific; the orchestrator only relies on this
/// contract. Errors are per document and never abort a batch.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, body: &str, platform: &str) -> Result<Vec<CandidateTicket>, ParseError>;
}

/// Explicit platform id → parser map, populated at startup.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn DocumentParser>>,
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut platforms: Vec<_> = self.parsers.keys().collect();
        platforms.sort();
        f.debug_struct("ParserRegistry")
            .field("platforms", &platforms)
            .finish()
    }
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the parser for a platform.
    pub fn register(&mut self, platform: impl Into<String>, parser: Arc<dyn DocumentParser>) {
        self.parsers.insert(platform.into(), parser);
    }

    pub fn with(mut self, platform: impl Into<String>, parser: Arc<dyn DocumentParser>) -> Self {
        self.register(platform, parser);
        self
    }

    pub fn get(&self, platform: &str) -> Option<Arc<dyn DocumentParser>> {
        self.parsers.get(platform).cloned()
    }

    pub fn contains(&self, platform: &str) -> bool {
        self.parsers.contains_key(platform)
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}
