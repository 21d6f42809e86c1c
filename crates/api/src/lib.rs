//! HTTP API layer for livepoll.
//!
//! This crate provides the REST API and the live results stream:
//!
//! - **Endpoints**: poll creation, voting, results
//! - **Extractors**: voter fingerprint derivation
//! - **SSE**: per-poll `text/event-stream` of tally snapshots
//!
//! Built on Axum 0.8 with the Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod sse;
pub mod state;

pub use endpoints::router;
pub use state::AppState;
