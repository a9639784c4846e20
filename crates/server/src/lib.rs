//! HTTP front end and scheduler for the ticket scout.
//!
//! The binary wires concrete collaborators into a [`ticketscout_core::TicketScout`],
//! starts the configured pre-sale watches and serves this crate's router.

pub mod api;
pub mod metrics;
pub mod state;

pub use api::create_router;
pub use state::AppState;
