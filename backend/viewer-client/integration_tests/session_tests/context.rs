use crate::session_tests::helpers::{FakeViewer, context_for, viewer_config};

use viewer_client::config::ViewerConfig;
use viewer_client::error::{ConnectionError, HandshakeError};
use viewer_client::session::SessionContext;

use std::time::{Duration, Instant};

use serial_test::serial;
use tempfile::tempdir;

/// **VALUE**: Verifies a handshake injected at t=1s resolves the wait at t≈1s.
///
/// **WHY THIS MATTERS**: This is the rendezvous every session depends on, measured end to
/// end through the real listener and shared connection.
///
/// **BUG THIS CATCHES**: Would catch the listener not feeding the registry, or the wait only
/// returning when its 5s bound expires.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_abc123_resolved_after_one_second_when_waiting_then_returns_true_early() {
    // GIVEN: A running server and an open connection
    let dir = tempdir().unwrap();
    let viewer = FakeViewer::start().await;
    let context = context_for(&dir, &viewer, 5);
    context.ensure_ready().await.unwrap();

    // WHEN: The viewer answers for "abc123" after one second
    let started = Instant::now();
    let (connected, ()) = tokio::join!(
        context.wait_for_handshake("abc123", Duration::from_secs(5)),
        async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            viewer.handshake("abc123", true);
        }
    );

    // THEN: The wait returned true well before the timeout
    let elapsed = started.elapsed();
    assert!(connected.unwrap());
    assert!(elapsed >= Duration::from_secs(1), "Resolved too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "Resolved too late: {elapsed:?}");

    context.shutdown().await;
}

/// **VALUE**: Verifies malformed viewer messages do not break the handshake channel.
///
/// **WHY THIS MATTERS**: One page sending garbage must not stall every other session.
///
/// **BUG THIS CATCHES**: Would catch the listener task exiting on a parse error.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_malformed_message_when_valid_notice_follows_then_handshake_still_resolves() {
    let dir = tempdir().unwrap();
    let viewer = FakeViewer::start().await;
    let context = context_for(&dir, &viewer, 5);
    context.ensure_ready().await.unwrap();

    viewer.send_text("{not json");
    viewer.handshake("after-garbage", true);

    let connected = context
        .wait_for_handshake("after-garbage", Duration::from_secs(5))
        .await
        .unwrap();

    assert!(connected);
    assert!(context.connections().is_open());

    context.shutdown().await;
}

/// **VALUE**: Verifies waiting for a handshake without a connection fails with `NotConnected`.
///
/// **WHY THIS MATTERS**: Without a connection no notice can ever arrive; waiting out the
/// timeout would only hide the real problem.
///
/// **BUG THIS CATCHES**: Would catch the open check being skipped.
#[tokio::test]
async fn given_no_connection_when_waiting_for_handshake_then_returns_not_connected() {
    let context = SessionContext::new(ViewerConfig::default());

    let result = context
        .wait_for_handshake("token", Duration::from_secs(5))
        .await;

    assert!(matches!(result, Err(HandshakeError::NotConnected { .. })));
}

/// **VALUE**: Verifies connecting before the server runs fails with `NotRunning`.
///
/// **WHY THIS MATTERS**: The connection target is the running server's port; there is none yet.
///
/// **BUG THIS CATCHES**: Would catch connect falling back to a guessed port.
#[tokio::test]
async fn given_no_server_when_connecting_then_returns_not_running() {
    let context = SessionContext::new(ViewerConfig::default());

    let result = context.connect().await;

    assert!(matches!(result, Err(ConnectionError::NotRunning { .. })));
    assert!(!context.is_running().await);
}

/// **VALUE**: Verifies shutdown stops the server and closes the connection.
///
/// **WHY THIS MATTERS**: The server must not outlive the process that launched it.
///
/// **BUG THIS CATCHES**: Would catch shutdown leaving the child running or the shared
/// connection reporting open.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_ready_context_when_shutting_down_then_server_stops_and_connection_closes() {
    // GIVEN: A ready context
    let dir = tempdir().unwrap();
    let viewer = FakeViewer::start().await;
    let context = context_for(&dir, &viewer, 5);
    let server = context.ensure_ready().await.unwrap();
    assert_eq!(server.port, viewer.port);
    assert!(context.is_running().await);
    assert!(context.connections().is_open());

    // WHEN: Shutting down
    context.shutdown().await;

    // THEN: Nothing is left running or open
    assert!(!context.is_running().await);
    assert!(!context.connections().is_open());
    assert_eq!(context.server().await, None);

    // AND: Shutting down again is harmless
    context.shutdown().await;
}

/// **VALUE**: Verifies repeated readiness checks reuse the running server.
///
/// **WHY THIS MATTERS**: Every new session calls this; relaunching each time would kill the
/// pages of earlier sessions.
///
/// **BUG THIS CATCHES**: Would catch `ensure_ready()` restarting a healthy server.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_ready_context_when_ensuring_ready_again_then_server_is_reused() {
    let dir = tempdir().unwrap();
    let viewer = FakeViewer::start().await;
    let context = SessionContext::new(viewer_config(&dir, viewer.port, 5));

    let first = context.ensure_ready().await.unwrap();
    let second = context.ensure_ready().await.unwrap();

    assert_eq!(first, second);

    context.shutdown().await;
}
