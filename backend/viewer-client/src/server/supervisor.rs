use crate::STARTUP_BANNER;
use crate::error::supervisor::SupervisorError;
use crate::server::relay::{OutputRelay, OutputStream, RelayFiles, RelayTargets};

use common::ErrorLocation;

use std::panic::Location;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, info, trace, warn};
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child as TokioChild, Command as TokioCommand};
use tokio::time::timeout as TokioTimeout;

const PORT_FLAG: &str = "--port";
const ASSET_DIR_FLAG: &str = "-d";
const TERMINATE_GRACE: Duration = Duration::from_secs(5);
const RELAY_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// What to launch: `<executable> --port <port> -d <asset_dir>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub executable: PathBuf,
    pub port: u16,
    pub asset_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerInfo {
    pub pid: u32,
    pub port: u16,
}

struct RunningServer {
    child: TokioChild,
    info: ServerInfo,
    relay: OutputRelay,
}

/// Owns the viewer server process. At most one server is tracked at a time.
pub struct Supervisor {
    startup_timeout: Duration,
    targets: RelayTargets,
    running: Option<RunningServer>,
    #[cfg(test)]
    pub(crate) fail_next_terminate: bool,
}

pub(crate) fn build_launch_command(spec: &LaunchSpec) -> TokioCommand {
    let mut cmd = TokioCommand::new(&spec.executable);
    cmd.arg(PORT_FLAG)
        .arg(spec.port.to_string())
        .arg(ASSET_DIR_FLAG)
        .arg(&spec.asset_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Read lines until one contains the startup banner.
///
/// # Errors
///
/// Returns [`SupervisorError::Exited`] if the output ends (or breaks) first.
pub(crate) async fn wait_for_banner<R>(lines: &mut Lines<R>) -> Result<(), SupervisorError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                trace!("Server stdout: {line}");

                if line.contains(STARTUP_BANNER) {
                    return Ok(());
                }
            }
            Ok(None) => {
                return Err(SupervisorError::exited(
                    "Server output ended before the startup banner",
                ));
            }
            Err(e) => {
                return Err(SupervisorError::exited(format!(
                    "Failed to read server output: {e}"
                )));
            }
        }
    }
}

impl Supervisor {
    pub fn new(startup_timeout: Duration, targets: RelayTargets) -> Self {
        Self {
            startup_timeout,
            targets,
            running: None,
            #[cfg(test)]
            fail_next_terminate: false,
        }
    }

    /// Launch the server and wait for its startup banner.
    ///
    /// A server that is already tracked is terminated, and its exit observed,
    /// before the new one is launched. Nothing is launched if that fails.
    ///
    /// # Returns
    ///
    /// * `Ok(ServerInfo)` - The server printed its banner and its output is being relayed
    /// * `Err(SupervisorError)` - The previous server could not be stopped, spawn failed,
    ///   the server exited early or the banner did not appear within the startup timeout
    pub async fn start(&mut self, spec: &LaunchSpec) -> Result<ServerInfo, SupervisorError> {
        if self.running.is_some() {
            info!("Replacing running viewer server");
            self.terminate().await?;
        }

        info!(
            "Launching {} on port {}",
            spec.executable.display(),
            spec.port
        );

        let mut child = build_launch_command(spec)
            .spawn()
            .map_err(|e| SupervisorError::Spawn {
                message: format!("Failed to spawn {}: {e}", spec.executable.display()),
                location: ErrorLocation::from(Location::caller()),
                source: Box::new(e),
            })?;

        let Some(pid) = child.id() else {
            return Err(SupervisorError::exited("Server exited immediately after spawn"));
        };

        let (Some(stdout), stderr) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill().await;
            return Err(SupervisorError::exited("Server has no stdout pipe"));
        };

        let files = self.targets.open().unwrap_or_else(|e| {
            warn!("Failed to open server log files, output will only be traced: {e}");
            RelayFiles::default()
        });

        let mut relay = OutputRelay::new(files);
        if let Some(stderr) = stderr {
            relay.attach(OutputStream::Stderr, BufReader::new(stderr).lines());
        }

        let mut lines = BufReader::new(stdout).lines();
        let banner = TokioTimeout(self.startup_timeout, wait_for_banner(&mut lines)).await;

        let failure = match banner {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(SupervisorError::StartupTimeout {
                message: format!(
                    "Server did not print '{STARTUP_BANNER}' within {:?}",
                    self.startup_timeout
                ),
                location: ErrorLocation::from(Location::caller()),
            }),
        };

        if let Some(e) = failure {
            warn!("Viewer server failed to start, killing it (PID: {pid})");
            let _ = child.kill().await;
            drop(lines);
            let _ = TokioTimeout(RELAY_JOIN_TIMEOUT, relay.join()).await;
            return Err(e);
        }

        relay.attach(OutputStream::Stdout, lines);

        let info = ServerInfo {
            pid,
            port: spec.port,
        };
        info!("Viewer server ready on port {} (PID: {pid})", info.port);

        self.running = Some(RunningServer { child, info, relay });
        Ok(info)
    }

    /// The tracked server, whether or not it is still alive.
    pub fn info(&self) -> Option<ServerInfo> {
        self.running.as_ref().map(|server| server.info)
    }

    /// `true` if a server is tracked and has not exited.
    pub fn is_running(&mut self) -> bool {
        match self.running.as_mut() {
            Some(server) => match server.child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    debug!("Viewer server (PID: {}) exited: {status}", server.info.pid);
                    false
                }
                Err(e) => {
                    warn!("Failed to poll viewer server: {e}");
                    false
                }
            },
            None => false,
        }
    }

    /// The tracked server, if it is still alive.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotRunning`] if no live server is tracked.
    #[track_caller]
    pub fn running_info(&mut self) -> Result<ServerInfo, SupervisorError> {
        let location = Location::caller();
        if self.is_running()
            && let Some(info) = self.info()
        {
            return Ok(info);
        }

        Err(SupervisorError::NotRunning {
            location: ErrorLocation::from(location),
        })
    }

    /// Terminate the tracked server and wait for it to exit.
    ///
    /// Sends SIGTERM first and escalates to a hard kill after a grace period.
    /// The output relay is joined once the process is gone.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(status))` - The server was stopped (or had already exited)
    /// * `Ok(None)` - Nothing was tracked
    /// * `Err(SupervisorError)` - The process could not be signalled or awaited
    pub async fn terminate(&mut self) -> Result<Option<ExitStatus>, SupervisorError> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_terminate) && self.running.is_some() {
            return Err(SupervisorError::terminate("Simulated stop failure"));
        }

        let Some(RunningServer {
            mut child,
            info,
            relay,
        }) = self.running.take()
        else {
            return Ok(None);
        };

        let status = stop_child(&mut child, info.pid).await;

        match TokioTimeout(RELAY_JOIN_TIMEOUT, relay.join()).await {
            Ok(summary) => debug!("Server output relay closed: {summary:?}"),
            Err(_) => warn!("Server output relay did not finish within {RELAY_JOIN_TIMEOUT:?}"),
        }

        let status = status?;
        info!("Viewer server (PID: {}) stopped: {status}", info.pid);
        Ok(Some(status))
    }
}

async fn stop_child(child: &mut TokioChild, pid: u32) -> Result<ExitStatus, SupervisorError> {
    if let Ok(Some(status)) = child.try_wait() {
        debug!("Viewer server (PID: {pid}) already exited");
        return Ok(status);
    }

    if !send_sigterm(pid) {
        debug!("SIGTERM unavailable for PID {pid}, killing");
        child
            .start_kill()
            .map_err(|e| SupervisorError::terminate(format!("Failed to kill PID {pid}: {e}")))?;
    }

    match TokioTimeout(TERMINATE_GRACE, child.wait()).await {
        Ok(Ok(status)) => Ok(status),
        Ok(Err(e)) => Err(SupervisorError::terminate(format!(
            "Failed to wait for PID {pid}: {e}"
        ))),
        Err(_) => {
            warn!("Viewer server (PID: {pid}) ignored SIGTERM for {TERMINATE_GRACE:?}, killing");
            child
                .kill()
                .await
                .map_err(|e| SupervisorError::terminate(format!("Failed to kill PID {pid}: {e}")))?;
            child.wait().await.map_err(|e| {
                SupervisorError::terminate(format!("Failed to wait for PID {pid}: {e}"))
            })
        }
    }
}

fn send_sigterm(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    match sys.process(pid).and_then(|p| p.kill_with(Signal::Term)) {
        Some(sent) => {
            debug!("Sent SIGTERM to PID {pid}: success={sent}");
            sent
        }
        None => false,
    }
}
