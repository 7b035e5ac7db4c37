pub mod config;
pub mod connection;
pub mod handshake;
pub mod session;
pub mod supervisor;

pub use config::ConfigError;
pub use connection::ConnectionError;
pub use handshake::HandshakeError;
pub use session::SessionError;
pub use supervisor::SupervisorError;

use models::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Model(#[from] ModelError),
}
