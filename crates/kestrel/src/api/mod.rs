//! HTTP and WebSocket surface of the host.

mod batch;
mod channel;
mod error;
mod health;
mod plugins;
mod router;

#[cfg(test)]
mod tests;

pub use error::ProblemDetails;
pub use router::{create_router, AppState};
