use common::ErrorLocation;

use std::panic::Location;
use std::time::Duration;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum HandshakeError {
    #[error("Not Connected Error: no open connection to the viewer server {location}")]
    NotConnected { location: ErrorLocation },

    #[error("Handshake Timeout Error: viewer '{token}' did not connect within {timeout:?} {location}")]
    HandshakeTimeout {
        token: String,
        timeout: Duration,
        location: ErrorLocation,
    },

    #[error("Handshake Rejected Error: viewer '{token}' reported connected=false {location}")]
    Rejected {
        token: String,
        location: ErrorLocation,
    },

    #[error("Handshake Evicted Error: '{token}' was removed before it resolved {location}")]
    Evicted {
        token: String,
        location: ErrorLocation,
    },
}

impl HandshakeError {
    #[track_caller]
    pub fn not_connected() -> Self {
        HandshakeError::NotConnected {
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn timeout(token: impl Into<String>, timeout: Duration) -> Self {
        HandshakeError::HandshakeTimeout {
            token: token.into(),
            timeout,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn rejected(token: impl Into<String>) -> Self {
        HandshakeError::Rejected {
            token: token.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn evicted(token: impl Into<String>) -> Self {
        HandshakeError::Evicted {
            token: token.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
