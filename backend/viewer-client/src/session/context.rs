use crate::config::ViewerConfig;
use crate::connection::{Connection, ConnectionManager};
use crate::error::connection::ConnectionError;
use crate::error::handshake::HandshakeError;
use crate::error::session::SessionError;
use crate::error::supervisor::SupervisorError;
use crate::handshake::{HandshakeRegistry, spawn_listener};
use crate::server::health::ping;
use crate::server::port::{EPHEMERAL_PORT_RANGE, first_available_port};
use crate::server::{LaunchSpec, RelayTargets, ServerInfo, Supervisor};

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

/// Process-wide viewer state: the supervised server, the shared connection,
/// the handshake registry and the listener feeding it.
///
/// Create one per process and share it through the returned `Arc`. Call
/// [`SessionContext::shutdown`] before exiting; dropping the context only
/// aborts the listener and kills the server without waiting.
pub struct SessionContext {
    config: ViewerConfig,
    supervisor: AsyncMutex<Supervisor>,
    connections: ConnectionManager,
    registry: Arc<HandshakeRegistry>,
    listener: Mutex<Option<JoinHandle<()>>>,
    lifecycle: AsyncMutex<()>,
}

impl SessionContext {
    pub fn new(config: ViewerConfig) -> Arc<Self> {
        let targets = RelayTargets {
            stdout: config.stdout_log().map(Path::to_path_buf),
            stderr: config.stderr_log().map(Path::to_path_buf),
        };

        Arc::new(Self {
            supervisor: AsyncMutex::new(Supervisor::new(config.timeout_duration(), targets)),
            connections: ConnectionManager::new(),
            registry: Arc::new(HandshakeRegistry::new()),
            listener: Mutex::new(None),
            lifecycle: AsyncMutex::new(()),
            config,
        })
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn hostname(&self) -> &str {
        &self.config.hostname
    }

    /// Bound for server startup, connection open and handshake waits.
    pub fn timeout(&self) -> Duration {
        self.config.timeout_duration()
    }

    pub fn registry(&self) -> &Arc<HandshakeRegistry> {
        &self.registry
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    fn listener_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Launch the server described by `spec`, replacing any running one.
    pub async fn start(&self, spec: &LaunchSpec) -> Result<ServerInfo, SupervisorError> {
        self.supervisor.lock().await.start(spec).await
    }

    /// Launch the server using the configured port, binary and asset directory.
    ///
    /// Without a configured port the first free port in the ephemeral range is used.
    pub async fn auto_start(&self) -> Result<ServerInfo, SessionError> {
        let spec = self.launch_spec()?;
        Ok(self.start(&spec).await?)
    }

    fn launch_spec(&self) -> Result<LaunchSpec, SessionError> {
        let port = match self.config.port {
            Some(port) => port,
            None => first_available_port(self.hostname(), EPHEMERAL_PORT_RANGE)?,
        };

        Ok(LaunchSpec {
            executable: self.config.resolve_server_binary()?,
            port,
            asset_dir: self.config.resolve_asset_dir()?,
        })
    }

    /// The running server, if any.
    pub async fn server(&self) -> Option<ServerInfo> {
        self.supervisor.lock().await.running_info().ok()
    }

    pub async fn is_running(&self) -> bool {
        self.supervisor.lock().await.is_running()
    }

    /// Open the shared connection to the running server and start its
    /// handshake listener. A previous listener is aborted first.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotRunning`] if no server is running.
    pub async fn connect(&self) -> Result<Connection, ConnectionError> {
        let server = self.server().await;
        let (connection, inbound) = self
            .connections
            .connect(server, self.hostname(), self.timeout())
            .await?;

        let mut slot = self.listener_slot();
        if let Some(previous) = slot.take() {
            debug!("Aborting previous handshake listener");
            previous.abort();
        }
        *slot = Some(spawn_listener(
            inbound,
            Arc::clone(&self.registry),
            connection.open_flag(),
        ));

        Ok(connection)
    }

    /// Start the server and open the shared connection if needed.
    ///
    /// Safe to call from several sessions at once: only one of them launches
    /// or connects.
    pub async fn ensure_ready(&self) -> Result<ServerInfo, SessionError> {
        let _lifecycle = self.lifecycle.lock().await;

        let (server, started) = match self.server().await {
            Some(server) => (server, false),
            None => {
                info!("Viewer server not running, starting it");
                (self.auto_start().await?, true)
            }
        };

        if started || !self.connections.is_open() {
            self.connect().await?;
        }

        Ok(server)
    }

    /// Wait until the viewer page for `token` reports back.
    ///
    /// # Returns
    ///
    /// * `Ok(connected)` - The `connected` flag the viewer sent
    /// * `Err(HandshakeError::NotConnected)` - The shared connection is not open
    /// * `Err(HandshakeError::HandshakeTimeout)` - Nothing arrived within `timeout`
    pub async fn wait_for_handshake(
        &self,
        token: &str,
        timeout: Duration,
    ) -> Result<bool, HandshakeError> {
        if !self.connections.is_open() {
            return Err(HandshakeError::not_connected());
        }

        self.registry.wait_for(token, timeout).await
    }

    /// `true` if the running server answers HTTP.
    pub async fn health_check(&self) -> bool {
        match self.server().await {
            Some(server) => ping(self.hostname(), server.port, self.timeout()).await,
            None => false,
        }
    }

    /// Stop the server, close the connection and abort the listener.
    ///
    /// Best effort: failures are logged, never returned.
    pub async fn shutdown(&self) {
        info!("Shutting down viewer session");

        match self.supervisor.lock().await.terminate().await {
            Ok(Some(status)) => debug!("Viewer server exited: {status}"),
            Ok(None) => debug!("No viewer server to stop"),
            Err(e) => warn!("Failed to stop viewer server: {e}"),
        }

        self.connections.close().await;

        if let Some(listener) = self.listener_slot().take() {
            listener.abort();
        }
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        if let Some(listener) = self.listener_slot().take() {
            listener.abort();
        }
    }
}
