//! Domain models for tunnelvision.
//!
//! This crate contains the data that travels from a view session to the
//! viewer: element types, array payloads, and the header/binary frames they
//! are encoded into. Models have no I/O - they are validated values that the
//! `viewer-client` crate moves over the wire.
//!
//! ## Architecture
//!
//! - **models** (this crate): pure data structures and their validation
//! - **viewer-client**: process supervision, connection and handshake protocol
//! - **tunnelvision**: application wiring everything together

pub mod array;
pub mod colormap;
pub mod dtype;
pub mod error;
pub mod frame;
pub mod presets;

pub use array::element::Element;
pub use array::{ARRAY_RANK, ArrayPayload};
pub use colormap::Colormap;
pub use common::ErrorLocation;
pub use dtype::{DType, SUPPORTED_DTYPES};
pub use error::model_error::ModelError;
pub use frame::builder::FrameBuilder;
pub use frame::{Frame, HeaderFrame, payload_bytes};
pub use presets::Window;
