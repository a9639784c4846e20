//! Mock document parser for testing.

use crate::listing::CandidateTicket;
use crate::parser::{DocumentParser, ParseError};

/// Returns the same candidates (or error) for every document.
#[derive(Debug, Clone)]
pub struct StaticParser {
    result: Result<Vec<CandidateTicket>, ParseError>,
}

impl StaticParser {
    pub fn new(candidates: Vec<CandidateTicket>) -> Self {
        Self {
            result: Ok(candidates),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(ParseError::Malformed(message.to_string())),
        }
    }
}

impl DocumentParser for StaticParser {
    fn parse(&self, _body: &str, _platform: &str) -> Result<Vec<CandidateTicket>, ParseError> {
        self.result.clone()
    }
}
