//! View sessions and the process-wide session context.
//!
//! [`SessionContext`] owns everything that exists once per process: the
//! supervised server, the shared connection, the handshake registry and the
//! listener task. [`ViewSession`]s borrow it to stream frames to one viewer
//! page each.

pub mod context;
pub mod displayable;
pub mod view;

pub use context::SessionContext;
pub use displayable::Displayable;
pub use view::{Figsize, ImshowOptions, ViewSession};
