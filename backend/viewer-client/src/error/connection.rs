use common::ErrorLocation;
use models::ModelError;

use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ConnectionError {
    #[error("Not Running Error: viewer server is not running, start it first {location}")]
    NotRunning { location: ErrorLocation },

    #[error("Not Open Error: connection is not open {location}")]
    NotOpen { location: ErrorLocation },

    #[error("Connect Error: {message} {location}")]
    Connect {
        message: String,
        location: ErrorLocation,
    },

    #[error("Open Timeout Error: {message} {location}")]
    OpenTimeout {
        message: String,
        location: ErrorLocation,
    },

    #[error("Send Error: {message} {location}")]
    Send {
        message: String,
        location: ErrorLocation,
    },

    #[error("URL Error: {message} {location}")]
    Url {
        message: String,
        location: ErrorLocation,
    },

    #[error("Encode Error: {message} {location}")]
    Encode {
        message: String,
        location: ErrorLocation,
    },
}

impl ConnectionError {
    #[track_caller]
    pub fn not_running() -> Self {
        ConnectionError::NotRunning {
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn not_open() -> Self {
        ConnectionError::NotOpen {
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<url::ParseError> for ConnectionError {
    #[track_caller]
    fn from(error: url::ParseError) -> Self {
        ConnectionError::Url {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<ModelError> for ConnectionError {
    #[track_caller]
    fn from(error: ModelError) -> Self {
        ConnectionError::Encode {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
