pub mod handlers;
pub mod middleware;
pub mod queue;
pub mod routes;
pub mod scrape;
pub mod watches;

pub use routes::create_router;
