//! Virtual queue detection, shared queue state and waiting.

mod bypass;
mod tracker;
mod types;
mod waiter;

pub use bypass::{BypassOutcome, DeclineBypass, QueueBypass};
pub use tracker::QueueTracker;
pub use types::*;
pub use waiter::WaitOutcome;
