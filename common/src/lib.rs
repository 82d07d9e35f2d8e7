//! Shared building blocks for the kvharness workspace.
//!
//! This crate holds the small pieces every other crate leans on. It has
//! no knowledge of processes, configuration or the wire protocol.
//!
//! ## Architecture
//!
//! - **common** (this crate): error location tracking
//! - **harness-core**: provisioning, supervision and readiness of the server under test
//! - **kvharness**: command line wiring everything together

pub mod error;

pub use error::error_location::ErrorLocation;

#[cfg(test)]
mod tests;
