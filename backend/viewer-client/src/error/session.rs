use crate::error::{ConfigError, ConnectionError, HandshakeError, SupervisorError};

use common::ErrorLocation;
use models::ModelError;

use std::panic::Location;

use thiserror::Error as ThisError;

/// Errors surfaced to whoever drives a view session.
///
/// `Validation` is raised synchronously by `enqueue`/`imshow`; the others come
/// back from `flush` once the background consumer hit them.
#[derive(Debug, ThisError)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ModelError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("Runtime Error: {message} {location}")]
    Runtime {
        message: String,
        location: ErrorLocation,
    },
}

impl SessionError {
    #[track_caller]
    pub fn runtime(message: impl Into<String>) -> Self {
        SessionError::Runtime {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
