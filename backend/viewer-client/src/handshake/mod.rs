//! Browser handshake rendezvous.
//!
//! Every view session has a token. Frames for a session may only go out once
//! the viewer page opened for that token has reported back over the shared
//! connection with `{"hash": <token>, "connected": <bool>}`. The registry
//! tracks one single-assignment cell per token; the listener resolves them.

pub mod listener;
pub mod registry;

pub use listener::{HandshakeNotice, parse_notice, spawn_listener};
pub use registry::{HandshakeRegistry, HandshakeWaiter, Resolution};
