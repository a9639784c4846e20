//! Ticket listings: search criteria, parsed candidates and scraped tickets.

pub mod normalize;
mod types;

pub use types::*;
