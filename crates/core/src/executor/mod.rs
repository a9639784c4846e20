//! Concurrent attempt rounds against one platform.

mod challenge;
mod cooldown;
mod runner;
mod types;

pub use challenge::{Challenge, ChallengeConfig, ChallengeDetector, ChallengeProvider};
pub(crate) use challenge::compile_pattern;
pub use cooldown::{cooldown_key, CooldownMarker, CooldownMarkers};
pub use runner::ScrapeExecutor;
pub use types::*;
