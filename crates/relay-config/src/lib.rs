//! # Relay Config
//!
//! Configuration management for the WhatsApp voice relay.
//! Supports layered configuration from files, `.env` and environment
//! variables, validated once at load time.

mod app_config;
mod loader;
mod validation;

pub use app_config::*;
pub use loader::*;
pub use validation::*;
