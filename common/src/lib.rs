//! Shared building blocks for the tunnelvision crates.
//!
//! Every error type in the workspace records where it was raised through
//! [`ErrorLocation`], so log lines point straight at the failing call site
//! even when the error crossed a task or thread boundary.
//!
//! ## Architecture
//!
//! - **common** (this crate): cross-cutting primitives
//! - **models**: array payloads and wire frames
//! - **viewer-client**: server supervision, connection and handshake protocol
//! - **tunnelvision**: application wiring

pub mod error_location;

pub use error_location::ErrorLocation;
