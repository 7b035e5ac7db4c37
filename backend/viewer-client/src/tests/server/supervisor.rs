use crate::error::supervisor::SupervisorError;
use crate::server::relay::RelayTargets;
use crate::server::supervisor::{LaunchSpec, Supervisor, build_launch_command, wait_for_banner};

use std::path::{Path, PathBuf};
use std::time::Duration;

use serial_test::serial;
use tempfile::{TempDir, tempdir};
use tokio::io::{AsyncBufReadExt, BufReader};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

fn fake_server(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("fake-server.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    path
}

fn launch_spec(executable: &Path) -> LaunchSpec {
    LaunchSpec {
        executable: executable.to_path_buf(),
        port: 49200,
        asset_dir: PathBuf::from("/srv/tunnelvision/dist"),
    }
}

const READY_SERVER: &str = "echo booting\necho '--- tunnelvision ---'\necho hello\nexec sleep 60";

/// **VALUE**: Verifies the launch line passes port and asset directory through.
///
/// **WHY THIS MATTERS**: The server binary only understands `--port N -d DIR`. Any other shape
/// makes it exit before printing its banner.
///
/// **BUG THIS CATCHES**: Would catch reordered or renamed flags.
#[test]
fn given_launch_spec_when_building_command_then_passes_port_and_asset_dir() {
    // GIVEN: A launch spec
    let spec = launch_spec(Path::new("/opt/tunnelvision/bin/tunnelvision-server"));

    // WHEN: Building the command
    let cmd = build_launch_command(&spec);

    // THEN: Program and arguments match the server's CLI
    let std_cmd = cmd.as_std();
    assert_eq!(
        std_cmd.get_program(),
        "/opt/tunnelvision/bin/tunnelvision-server"
    );
    let args: Vec<_> = std_cmd.get_args().collect();
    assert_eq!(args, ["--port", "49200", "-d", "/srv/tunnelvision/dist"]);
}

/// **VALUE**: Verifies readiness is detected after unrelated output.
///
/// **WHY THIS MATTERS**: The server may log before announcing itself; those lines must not
/// count as readiness or failure.
///
/// **BUG THIS CATCHES**: Would catch a check that only looks at the first line.
#[tokio::test]
async fn given_noise_before_banner_when_waiting_then_returns_ok() {
    let mut lines = BufReader::new(&b"loading assets\n--- tunnelvision ---\n"[..]).lines();

    let result = wait_for_banner(&mut lines).await;

    assert!(result.is_ok());
}

/// **VALUE**: Verifies output ending without a banner is reported as an exit.
///
/// **WHY THIS MATTERS**: A crashing server closes stdout. Waiting for the full timeout in that
/// case only delays the error.
///
/// **BUG THIS CATCHES**: Would catch EOF being treated as "keep waiting".
#[tokio::test]
async fn given_output_without_banner_when_waiting_then_returns_exited() {
    let mut lines = BufReader::new(&b"error: address in use\n"[..]).lines();

    let result = wait_for_banner(&mut lines).await;

    assert!(matches!(result, Err(SupervisorError::Exited { .. })));
}

/// **VALUE**: Verifies a server that prints its banner is tracked and can be terminated.
///
/// **WHY THIS MATTERS**: This is the normal lifecycle of every notebook session.
///
/// **BUG THIS CATCHES**: Would catch the child being dropped (and killed) after startup, or
/// `terminate()` returning before the process exited.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_banner_printed_when_starting_then_server_runs_until_terminated() {
    // GIVEN: A fake server that prints the banner and keeps running
    let dir = tempdir().unwrap();
    let script = fake_server(&dir, READY_SERVER);
    let mut supervisor = Supervisor::new(STARTUP_TIMEOUT, RelayTargets::default());

    // WHEN: Starting it
    let info = supervisor.start(&launch_spec(&script)).await.unwrap();

    // THEN: It is tracked and running
    assert_eq!(info.port, 49200);
    assert!(supervisor.is_running());
    assert_eq!(supervisor.running_info().unwrap(), info);

    // WHEN: Terminating it
    let status = supervisor.terminate().await.unwrap();

    // THEN: Its exit was observed and nothing is tracked any more
    assert!(status.is_some(), "Exit status should be reported");
    assert!(!supervisor.is_running());
    assert_eq!(supervisor.info(), None);
}

/// **VALUE**: Verifies starting twice never leaves two servers alive.
///
/// **WHY THIS MATTERS**: Two servers would fight over ports and leave an orphan behind after
/// the notebook exits.
///
/// **BUG THIS CATCHES**: Would catch `start()` overwriting the tracked child without
/// terminating and awaiting it first.
#[tokio::test]
#[serial]
#[cfg(target_os = "linux")]
async fn given_running_server_when_starting_again_then_previous_process_is_gone() {
    // GIVEN: A running server
    let dir = tempdir().unwrap();
    let script = fake_server(&dir, READY_SERVER);
    let mut supervisor = Supervisor::new(STARTUP_TIMEOUT, RelayTargets::default());
    let first = supervisor.start(&launch_spec(&script)).await.unwrap();

    // WHEN: Starting again
    let second = supervisor.start(&launch_spec(&script)).await.unwrap();

    // THEN: The first process no longer exists and the second one is tracked
    assert_ne!(first.pid, second.pid);
    assert!(
        !Path::new(&format!("/proc/{}", first.pid)).exists(),
        "First server should have exited and been reaped"
    );
    assert_eq!(supervisor.info(), Some(second));

    supervisor.terminate().await.unwrap();
}

/// **VALUE**: Verifies a failed stop of the previous server aborts the new launch.
///
/// **WHY THIS MATTERS**: Launching anyway would leave the old process unreaped next to the
/// new one, which is exactly the overlap `start()` promises to avoid.
///
/// **BUG THIS CATCHES**: Would catch a terminate failure being logged and ignored.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_previous_server_cannot_be_stopped_when_starting_then_nothing_is_launched() {
    // GIVEN: A running server whose launches are counted, and a stop that will fail
    let dir = tempdir().unwrap();
    let launches = dir.path().join("launches.log");
    let script = fake_server(
        &dir,
        &format!("echo launch >> '{}'\n{READY_SERVER}", launches.display()),
    );
    let mut supervisor = Supervisor::new(STARTUP_TIMEOUT, RelayTargets::default());
    let first = supervisor.start(&launch_spec(&script)).await.unwrap();
    supervisor.fail_next_terminate = true;

    // WHEN: Starting again
    let result = supervisor.start(&launch_spec(&script)).await;

    // THEN: The stop error is returned and no second process was spawned
    assert!(
        matches!(result, Err(SupervisorError::Terminate { .. })),
        "Expected Terminate error, got {result:?}"
    );
    assert_eq!(std::fs::read_to_string(&launches).unwrap().lines().count(), 1);
    assert_eq!(supervisor.running_info().unwrap(), first);

    supervisor.terminate().await.unwrap();
}

/// **VALUE**: Verifies a silent server fails with `StartupTimeout` and is killed.
///
/// **WHY THIS MATTERS**: A hung server must not block the caller forever, and must not be
/// left running in the background.
///
/// **BUG THIS CATCHES**: Would catch the wait ignoring the startup timeout, or the child
/// being tracked after a failed start.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_no_banner_when_starting_then_returns_startup_timeout() {
    // GIVEN: A server that never prints the banner
    let dir = tempdir().unwrap();
    let script = fake_server(&dir, "echo booting\nexec sleep 60");
    let mut supervisor = Supervisor::new(Duration::from_millis(500), RelayTargets::default());

    // WHEN: Starting it
    let result = supervisor.start(&launch_spec(&script)).await;

    // THEN: Startup timed out and nothing is tracked
    assert!(
        matches!(result, Err(SupervisorError::StartupTimeout { .. })),
        "Expected StartupTimeout, got {result:?}"
    );
    assert_eq!(supervisor.info(), None);
}

/// **VALUE**: Verifies a server that dies before its banner reports `Exited`.
///
/// **WHY THIS MATTERS**: Bad asset paths make the server exit at once; the caller needs that
/// error, not a timeout several seconds later.
///
/// **BUG THIS CATCHES**: Would catch early exits being misreported as timeouts.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_server_exits_early_when_starting_then_returns_exited() {
    let dir = tempdir().unwrap();
    let script = fake_server(&dir, "echo 'asset dir missing' >&2\nexit 3");
    let mut supervisor = Supervisor::new(STARTUP_TIMEOUT, RelayTargets::default());

    let result = supervisor.start(&launch_spec(&script)).await;

    assert!(
        matches!(result, Err(SupervisorError::Exited { .. })),
        "Expected Exited, got {result:?}"
    );
}

/// **VALUE**: Verifies a missing executable fails with `Spawn`.
///
/// **WHY THIS MATTERS**: A broken install should name the path that could not be launched.
///
/// **BUG THIS CATCHES**: Would catch spawn errors being mapped to a generic variant.
#[tokio::test]
#[serial]
async fn given_missing_executable_when_starting_then_returns_spawn_error() {
    let mut supervisor = Supervisor::new(STARTUP_TIMEOUT, RelayTargets::default());

    let result = supervisor
        .start(&launch_spec(Path::new("/nonexistent/tunnelvision-server")))
        .await;

    match result {
        Err(SupervisorError::Spawn { message, .. }) => {
            assert!(message.contains("/nonexistent/tunnelvision-server"));
        }
        other => panic!("Expected Spawn error, got {other:?}"),
    }
}

/// **VALUE**: Verifies lifecycle queries without a server are harmless.
///
/// **WHY THIS MATTERS**: Shutdown runs even when startup never happened.
///
/// **BUG THIS CATCHES**: Would catch `terminate()` erroring when nothing is tracked.
#[tokio::test]
async fn given_no_server_when_querying_then_reports_not_running() {
    let mut supervisor = Supervisor::new(STARTUP_TIMEOUT, RelayTargets::default());

    assert!(!supervisor.is_running());
    assert!(matches!(
        supervisor.running_info(),
        Err(SupervisorError::NotRunning { .. })
    ));
    assert!(supervisor.terminate().await.unwrap().is_none());
}

/// **VALUE**: Verifies output after the banner lands in the stdout log.
///
/// **WHY THIS MATTERS**: The banner wait and the relay share one reader; lines buffered during
/// the wait must not be lost when the relay takes over.
///
/// **BUG THIS CATCHES**: Would catch the relay opening a fresh reader on the pipe.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_stdout_log_when_server_prints_after_banner_then_line_is_persisted() {
    // GIVEN: A supervisor relaying stdout into a temp file
    let dir = tempdir().unwrap();
    let script = fake_server(&dir, READY_SERVER);
    let log = dir.path().join("server.out");
    let targets = RelayTargets {
        stdout: Some(log.clone()),
        stderr: None,
    };
    let mut supervisor = Supervisor::new(STARTUP_TIMEOUT, targets);

    // WHEN: The server starts, prints, and is terminated
    supervisor.start(&launch_spec(&script)).await.unwrap();
    supervisor.terminate().await.unwrap();

    // THEN: The post-banner line was written
    let contents = std::fs::read_to_string(&log).unwrap();
    assert_eq!(contents, "hello\n");
}
