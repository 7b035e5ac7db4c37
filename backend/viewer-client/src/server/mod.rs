//! Viewer server lifecycle.
//!
//! This module provides functionality for:
//! - Launching the bundled viewer server and waiting for its startup banner
//! - Draining and persisting the server's output without stalling it
//! - Terminating the server and observing its exit
//! - Picking a free port and pinging a running server

pub mod health;
pub mod port;
pub mod relay;
pub mod supervisor;

pub use relay::{OutputRelay, OutputStream, RelayFiles, RelaySummary, RelayTargets};
pub use supervisor::{LaunchSpec, ServerInfo, Supervisor};
