//! # Relay Server Library
//!
//! Dependency injection and application assembly for the relay binary.

pub mod app;
pub mod di;
pub mod startup;
