use crate::error::handshake::HandshakeError;
use crate::handshake::registry::{HandshakeRegistry, MAX_UNSOLICITED, Resolution};

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// **VALUE**: Verifies a resolution at t=1s wakes the waiter at t≈1s, not at the timeout.
///
/// **WHY THIS MATTERS**: Every display operation waits on this. Waking only at the timeout
/// would add five seconds of latency to every first frame.
///
/// **BUG THIS CATCHES**: Would catch a waiter that polls on an interval or only checks the
/// value when the timeout fires.
#[tokio::test(start_paused = true)]
async fn given_resolution_after_one_second_when_waiting_then_returns_true_at_one_second() {
    // GIVEN: A registry and a resolver that answers after 1s
    let registry = Arc::new(HandshakeRegistry::new());
    let resolver = Arc::clone(&registry);
    tokio::spawn(async move {
        sleep(Duration::from_secs(1)).await;
        resolver.resolve("abc123", true);
    });

    // WHEN: Waiting with a 5s bound
    let started = Instant::now();
    let connected = registry.wait_for("abc123", HANDSHAKE_TIMEOUT).await.unwrap();

    // THEN: Resolved true at about 1s
    let elapsed = started.elapsed();
    assert!(connected);
    assert!(elapsed >= Duration::from_secs(1), "Resolved too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "Resolved too late: {elapsed:?}");
}

/// **VALUE**: Verifies an unanswered handshake fails no earlier than its timeout.
///
/// **WHY THIS MATTERS**: Browsers can take seconds to load the viewer page. Failing early
/// drops the user's first image.
///
/// **BUG THIS CATCHES**: Would catch a timeout measured in the wrong unit or started too early.
#[tokio::test(start_paused = true)]
async fn given_no_resolution_when_waiting_then_times_out_at_or_after_timeout() {
    let registry = HandshakeRegistry::new();

    let started = Instant::now();
    let result = registry.wait_for("never", HANDSHAKE_TIMEOUT).await;

    assert!(started.elapsed() >= HANDSHAKE_TIMEOUT);
    match result {
        Err(HandshakeError::HandshakeTimeout { token, timeout, .. }) => {
            assert_eq!(token, "never");
            assert_eq!(timeout, HANDSHAKE_TIMEOUT);
        }
        other => panic!("Expected HandshakeTimeout, got {other:?}"),
    }
}

/// **VALUE**: Verifies a notification arriving before registration is kept.
///
/// **WHY THIS MATTERS**: A fast browser can answer before the session registered its token.
/// Losing that answer would leave the session waiting until it times out.
///
/// **BUG THIS CATCHES**: Would catch `resolve()` dropping unknown tokens.
#[tokio::test]
async fn given_late_registration_when_registering_then_waiter_is_already_resolved() {
    // GIVEN: A resolution for a token nobody registered yet
    let registry = HandshakeRegistry::new();
    let resolution = registry.resolve("early", true);

    // WHEN: Registering the token
    let mut waiter = registry.register("early");

    // THEN: The outcome is available immediately
    assert_eq!(resolution, Resolution::Preregistered);
    assert_eq!(waiter.outcome(), Some(true));
    assert!(waiter.wait_timeout(Duration::from_millis(10)).await.unwrap());
}

/// **VALUE**: Verifies repeated notifications keep the first outcome.
///
/// **WHY THIS MATTERS**: A page reload sends another handshake. Flipping the stored value
/// would change the behaviour of a session that is already streaming.
///
/// **BUG THIS CATCHES**: Would catch `resolve()` overwriting a resolved entry.
#[test]
fn given_resolved_entry_when_resolving_again_then_reports_duplicate_and_keeps_first() {
    let registry = HandshakeRegistry::new();
    let waiter = registry.register("token");

    assert_eq!(registry.resolve("token", true), Resolution::Resolved);
    assert_eq!(registry.resolve("token", false), Resolution::Duplicate);
    assert_eq!(waiter.outcome(), Some(true));
}

/// **VALUE**: Verifies registering twice shares one entry.
///
/// **WHY THIS MATTERS**: The session and its consumer both wait on the same token.
///
/// **BUG THIS CATCHES**: Would catch `register()` replacing an existing pending entry and
/// orphaning the first waiter.
#[test]
fn given_pending_entry_when_registering_again_then_both_waiters_see_resolution() {
    let registry = HandshakeRegistry::new();
    let first = registry.register("shared");
    let second = registry.register("shared");

    registry.resolve("shared", true);

    assert_eq!(registry.len(), 1);
    assert_eq!(first.outcome(), Some(true));
    assert_eq!(second.outcome(), Some(true));
}

/// **VALUE**: Verifies eviction wakes pending waiters with `Evicted`.
///
/// **WHY THIS MATTERS**: A dropped session must not leave its consumer waiting for the full
/// timeout, and its entry must not stay in the registry forever.
///
/// **BUG THIS CATCHES**: Would catch eviction that only removes the map entry.
#[tokio::test]
async fn given_pending_waiter_when_evicting_then_waiter_fails_with_evicted() {
    let registry = HandshakeRegistry::new();
    let mut waiter = registry.register("gone");

    assert!(registry.evict("gone"));
    let result = waiter.wait_timeout(HANDSHAKE_TIMEOUT).await;

    assert!(matches!(result, Err(HandshakeError::Evicted { .. })));
    assert!(!registry.contains("gone"));
    assert!(registry.is_empty());
}

/// **VALUE**: Verifies unclaimed notifications are bounded.
///
/// **WHY THIS MATTERS**: Stray or forged notifications must not grow the registry without limit.
///
/// **BUG THIS CATCHES**: Would catch the cap being missing or evicting the newest entry.
#[test]
fn given_too_many_unclaimed_notifications_when_resolving_then_oldest_are_dropped() {
    let registry = HandshakeRegistry::new();

    for i in 0..MAX_UNSOLICITED + 10 {
        registry.resolve(&format!("stray-{i}"), true);
    }

    assert_eq!(registry.len(), MAX_UNSOLICITED);
    assert!(!registry.contains("stray-0"));
    assert!(registry.contains(&format!("stray-{}", MAX_UNSOLICITED + 9)));
}

/// **VALUE**: Verifies claimed notifications no longer count against the cap.
///
/// **WHY THIS MATTERS**: An entry a session registered for must never be dropped by the cap.
///
/// **BUG THIS CATCHES**: Would catch registration leaving the token in the unclaimed list.
#[test]
fn given_claimed_notification_when_cap_is_exceeded_then_claimed_entry_survives() {
    let registry = HandshakeRegistry::new();
    registry.resolve("claimed", true);
    let waiter = registry.register("claimed");

    for i in 0..MAX_UNSOLICITED + 1 {
        registry.resolve(&format!("stray-{i}"), true);
    }

    assert!(registry.contains("claimed"));
    assert_eq!(waiter.outcome(), Some(true));
}

/// **VALUE**: Verifies a timed-out standalone wait leaves nothing behind.
///
/// **WHY THIS MATTERS**: Every `wait_for_handshake` call creates an entry; keeping the ones
/// nobody answered grows the registry for as long as the process lives.
///
/// **BUG THIS CATCHES**: Would catch `wait_for` registering without releasing the entry.
#[tokio::test(start_paused = true)]
async fn given_unanswered_wait_when_it_times_out_then_registry_is_empty() {
    let registry = HandshakeRegistry::new();

    let result = registry.wait_for("never", HANDSHAKE_TIMEOUT).await;

    assert!(matches!(result, Err(HandshakeError::HandshakeTimeout { .. })));
    assert_eq!(registry.len(), 0);
    assert!(!registry.contains("never"));
}

/// **VALUE**: Verifies a wait that consumed an early notification releases it.
///
/// **WHY THIS MATTERS**: Claimed notifications leave the capped unsolicited list; without a
/// release they would stay forever.
///
/// **BUG THIS CATCHES**: Would catch only the timeout path being cleaned up.
#[tokio::test]
async fn given_preregistered_token_when_waiting_then_returns_outcome_and_releases_entry() {
    let registry = HandshakeRegistry::new();
    assert_eq!(registry.resolve("early", true), Resolution::Preregistered);

    let connected = registry.wait_for("early", HANDSHAKE_TIMEOUT).await.unwrap();

    assert!(connected);
    assert!(registry.is_empty());
}

/// **VALUE**: Verifies a standalone wait does not evict a token a session still holds.
///
/// **WHY THIS MATTERS**: View sessions keep their waiter for their whole lifetime and gate
/// every batch on it.
///
/// **BUG THIS CATCHES**: Would catch the release evicting unconditionally, which fails the
/// session's next batch with `Evicted`.
#[tokio::test]
async fn given_token_held_by_session_when_standalone_wait_finishes_then_entry_survives() {
    let registry = HandshakeRegistry::new();
    let session_waiter = registry.register("owned");
    registry.resolve("owned", true);

    let connected = registry.wait_for("owned", HANDSHAKE_TIMEOUT).await.unwrap();

    assert!(connected);
    assert!(registry.contains("owned"));
    assert_eq!(session_waiter.outcome(), Some(true));
}
