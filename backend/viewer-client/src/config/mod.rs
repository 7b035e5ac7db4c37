//! Process-wide viewer configuration.
//!
//! Settings are read from a TOML file, by default
//! `~/.cache/tunnelvision/default_config.toml`. The location can be overridden
//! with the `TUNNELVISION_CONFIG` environment variable. A missing file is
//! created empty on first load, so every key falls back to its default.
//!
//! ```toml
//! hostname = "localhost"
//! port = 49200        # pin the port, e.g. when forwarding it from a remote host
//! timeout = 5         # seconds
//! log_stdout = "/tmp/tunnelvision/server.out"
//! ```

use crate::error::config::ConfigError;
use crate::{APP_DIR_NAME, CONFIG_ENV_VAR, DEFAULT_HOSTNAME, SERVER_ASSET_DIR, SERVER_BIN_DIR, SERVER_BINARY};

use common::ErrorLocation;

use std::env::{current_exe, var_os};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "default_config.toml";
const CACHE_DIR_NAME: &str = ".cache";
const STDOUT_LOG_FILE_NAME: &str = "server.out";
const DEFAULT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Host the viewer server binds to and the client connects to.
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Fixed server port. `None` picks the first free ephemeral port.
    #[serde(default)]
    pub port: Option<u16>,

    /// Seconds to wait for server startup, connection open and browser handshakes.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Where the server's stdout is persisted. An empty path disables it.
    #[serde(default = "default_log_stdout")]
    pub log_stdout: Option<PathBuf>,

    #[serde(default)]
    pub log_stderr: Option<PathBuf>,

    #[serde(default)]
    pub server_binary: Option<PathBuf>,

    #[serde(default)]
    pub asset_dir: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            port: None,
            timeout: default_timeout(),
            log_stdout: default_log_stdout(),
            log_stderr: None,
            server_binary: None,
            asset_dir: None,
        }
    }
}

fn default_hostname() -> String {
    DEFAULT_HOSTNAME.to_string()
}
fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_log_stdout() -> Option<PathBuf> {
    cache_dir().map(|dir| dir.join(STDOUT_LOG_FILE_NAME))
}

/// `~/.cache/tunnelvision`, if a home directory is known.
pub fn cache_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CACHE_DIR_NAME).join(APP_DIR_NAME))
}

/// Resolve the config file location, honouring `TUNNELVISION_CONFIG`.
#[track_caller]
pub fn config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = var_os(CONFIG_ENV_VAR) {
        return Ok(PathBuf::from(path));
    }

    cache_dir()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .ok_or_else(|| ConfigError::DirectoryNotFound {
            location: ErrorLocation::from(Location::caller()),
            reason: format!("No home directory; set {CONFIG_ENV_VAR} to a config file path"),
        })
}

impl ViewerConfig {
    /// Load the config from its resolved location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_path()?)
    }

    /// Load config from `path`, creating an empty file when it does not exist.
    ///
    /// Stale server logs from a previous run are removed after a successful load.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - The file or its directory cannot be created or read
    /// - The contents are not valid TOML for this schema
    /// - A value fails validation
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("Config file not found at {}, creating it empty", path.display());
            create_empty(path)?;
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: ViewerConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        config.remove_stale_logs();

        info!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hostname.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "hostname cannot be empty".to_string(),
            });
        }

        if self.timeout == 0 {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "timeout must be at least 1 second".to_string(),
            });
        }

        if self.port == Some(0) {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "port 0 is not allowed, omit the key to pick a free port".to_string(),
            });
        }

        Ok(())
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn stdout_log(&self) -> Option<&Path> {
        non_empty(self.log_stdout.as_deref())
    }

    pub fn stderr_log(&self) -> Option<&Path> {
        non_empty(self.log_stderr.as_deref())
    }

    /// The server executable: the configured path, else `bin/tunnelvision-server`
    /// next to the running executable.
    #[track_caller]
    pub fn resolve_server_binary(&self) -> Result<PathBuf, ConfigError> {
        match &self.server_binary {
            Some(path) => Ok(path.clone()),
            None => Ok(install_dir()?.join(SERVER_BIN_DIR).join(SERVER_BINARY)),
        }
    }

    /// The front-end assets served by the viewer: the configured path, else
    /// `bin/dist` next to the running executable.
    #[track_caller]
    pub fn resolve_asset_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.asset_dir {
            Some(path) => Ok(path.clone()),
            None => Ok(install_dir()?.join(SERVER_BIN_DIR).join(SERVER_ASSET_DIR)),
        }
    }

    fn remove_stale_logs(&self) {
        for log in [self.stdout_log(), self.stderr_log()].into_iter().flatten() {
            if log.exists() {
                match std::fs::remove_file(log) {
                    Ok(()) => debug!("Removed stale server log {}", log.display()),
                    Err(e) => warn!("Failed to remove stale server log {}: {e}", log.display()),
                }
            }
        }
    }
}

fn non_empty(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| !p.as_os_str().is_empty())
}

fn create_empty(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    std::fs::write(path, "").map_err(|e| ConfigError::WriteError {
        location: ErrorLocation::from(Location::caller()),
        path: path.to_path_buf(),
        source: e,
    })
}

#[track_caller]
fn install_dir() -> Result<PathBuf, ConfigError> {
    let exe = current_exe().map_err(|e| ConfigError::DirectoryNotFound {
        location: ErrorLocation::from(Location::caller()),
        reason: format!("Failed to get current executable path: {e}"),
    })?;

    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| ConfigError::DirectoryNotFound {
            location: ErrorLocation::from(Location::caller()),
            reason: format!("Executable has no parent directory: {}", exe.display()),
        })
}
