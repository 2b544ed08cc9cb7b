//! # Relay Resilience
//!
//! Resilience patterns for the WhatsApp voice relay.
//! Provides a consecutive-failure circuit breaker and a timeout wrapper.

pub mod circuit_breaker;
pub mod timeout;

pub use circuit_breaker::*;
pub use timeout::*;
