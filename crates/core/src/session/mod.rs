//! Per-platform pools of pre-warmed client identities.

mod pool;
mod types;

pub use pool::SessionPool;
pub use types::*;
