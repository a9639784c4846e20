//! Demand classification and strategy selection.

mod classifier;
mod types;

pub use classifier::{DemandClassifier, GENERIC_PROFILE_ID, STANDARD_PROFILE_ID};
pub use types::*;
