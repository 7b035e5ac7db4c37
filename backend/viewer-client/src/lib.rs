pub mod config;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod server;
pub mod session;


pub const APP_DIR_NAME: &str = "tunnelvision";
pub const SERVER_BINARY: &str = "tunnelvision-server";
pub const SERVER_BIN_DIR: &str = "bin";
pub const SERVER_ASSET_DIR: &str = "dist";
pub const STARTUP_BANNER: &str = "--- tunnelvision ---";
pub const DEFAULT_HOSTNAME: &str = "localhost";
pub const WS_PATH: &str = "/ws";

const ENV_PREFIX: &str = "TUNNELVISION_";
pub const CONFIG_ENV_VAR: &str = const_format::concatcp!(ENV_PREFIX, "CONFIG");
pub const LOG_LEVEL_ENV_VAR: &str = const_format::concatcp!(ENV_PREFIX, "LOG_LEVEL");
