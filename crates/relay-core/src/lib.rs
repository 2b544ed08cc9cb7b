//! # Relay Core
//!
//! Core error types and shared definitions for the WhatsApp voice relay.
//! Every other crate in the workspace reports failures that reach the
//! HTTP surface through [`RelayError`].

pub mod error;
pub mod result;

pub use error::*;
pub use result::*;

// Re-export shaku for dependency injection
pub use shaku::Interface;
