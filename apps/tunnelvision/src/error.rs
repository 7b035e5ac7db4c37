use common::ErrorLocation;

use viewer_client::error::{ConfigError, CoreError, HandshakeError, SessionError};

use std::panic::Location;

use thiserror::Error;

/// Errors surfaced by the tunnelvision binary.
///
/// Library errors are flattened into a message so the binary reports one
/// uniform line, while the location still points at the `?` that gave up.
#[derive(Debug, Error)]
pub enum TunnelvisionError {
    /// Error from this App
    #[error("Tunnelvision Error: {message} {location}")]
    Tunnelvision {
        message: String,
        location: ErrorLocation,
    },

    /// Logger could not be set up
    #[error("Logger Error: {message} {location}")]
    Logger {
        message: String,
        location: ErrorLocation,
    },

    /// Error from viewer-client operations (config, server, session, etc.)
    #[error("Core Error: {message} {location}")]
    Core {
        message: String,
        location: ErrorLocation,
    },
}

impl TunnelvisionError {
    #[track_caller]
    pub fn app(message: impl Into<String>) -> Self {
        Self::Tunnelvision {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn logger(message: impl Into<String>) -> Self {
        Self::Logger {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<CoreError> for TunnelvisionError {
    #[track_caller]
    fn from(error: CoreError) -> Self {
        Self::Core {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<ConfigError> for TunnelvisionError {
    #[track_caller]
    fn from(error: ConfigError) -> Self {
        Self::from(CoreError::from(error))
    }
}

impl From<SessionError> for TunnelvisionError {
    #[track_caller]
    fn from(error: SessionError) -> Self {
        Self::from(CoreError::from(error))
    }
}

impl From<HandshakeError> for TunnelvisionError {
    #[track_caller]
    fn from(error: HandshakeError) -> Self {
        Self::from(CoreError::from(error))
    }
}
