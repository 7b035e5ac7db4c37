use common::ErrorLocation;

use std::error::Error as StdError;
use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum SupervisorError {
    #[error("Spawn Error: {message} {location}")]
    Spawn {
        message: String,
        location: ErrorLocation,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Startup Timeout Error: {message} {location}")]
    StartupTimeout {
        message: String,
        location: ErrorLocation,
    },

    #[error("Exited Error: {message} {location}")]
    Exited {
        message: String,
        location: ErrorLocation,
    },

    #[error("Port Exhausted Error: {message} {location}")]
    PortExhausted {
        message: String,
        location: ErrorLocation,
    },

    #[error("Terminate Error: {message} {location}")]
    Terminate {
        message: String,
        location: ErrorLocation,
    },

    #[error("Not Running Error: viewer server is not running, start it first {location}")]
    NotRunning { location: ErrorLocation },
}

impl SupervisorError {
    #[track_caller]
    pub fn exited(message: impl Into<String>) -> Self {
        SupervisorError::Exited {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn terminate(message: impl Into<String>) -> Self {
        SupervisorError::Terminate {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn not_running() -> Self {
        SupervisorError::NotRunning {
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
