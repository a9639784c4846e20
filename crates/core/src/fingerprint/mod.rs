//! Browser fingerprint synthesis.
//!
//! Each platform is presented with a browser archetype drawn from its
//! demographic weights, and the resulting profile is cached so consecutive
//! requests inside the window look like the same visitor.

mod archetypes;
mod synthesizer;
mod types;

pub use archetypes::BrowserArchetype;
pub use synthesizer::{FingerprintSynthesizer, HeaderSynthesizer};
pub use types::*;
