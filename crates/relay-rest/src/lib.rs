//! # Relay REST
//!
//! HTTP surface of the voice relay: the inbound messaging webhook, health
//! checks and read-only job/queue inspection.

pub mod controllers;
pub mod middleware;
pub mod responses;
pub mod router;
pub mod state;

pub use router::*;
pub use state::*;
