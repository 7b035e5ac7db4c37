use crate::error::supervisor::SupervisorError;
use crate::server::port::{EPHEMERAL_PORT_RANGE, first_available_port};

use std::net::TcpListener;

/// **VALUE**: Verifies a free port is found in the ephemeral range.
///
/// **WHY THIS MATTERS**: Without a pinned port, auto-start depends on this to launch the server.
///
/// **BUG THIS CATCHES**: Would catch an off-by-one that returns a port outside the range.
#[test]
fn given_ephemeral_range_when_searching_then_returns_bindable_port_in_range() {
    let port = first_available_port("127.0.0.1", EPHEMERAL_PORT_RANGE).unwrap();

    assert!(EPHEMERAL_PORT_RANGE.contains(&port));
    TcpListener::bind(("127.0.0.1", port)).expect("Returned port should be bindable");
}

/// **VALUE**: Verifies occupied ports are skipped.
///
/// **WHY THIS MATTERS**: Launching the server on a taken port makes it exit right away and
/// surfaces as a confusing startup failure.
///
/// **BUG THIS CATCHES**: Would catch a probe that returns the first port without binding it.
#[test]
fn given_first_port_taken_when_searching_then_skips_it() {
    // GIVEN: A listener holding an OS-assigned port
    let held = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let taken = held.local_addr().unwrap().port();

    // WHEN: Searching a range that starts at the taken port
    let port = first_available_port("127.0.0.1", taken..taken.saturating_add(50)).unwrap();

    // THEN: A different port is returned
    assert_ne!(port, taken);
}

/// **VALUE**: Verifies an exhausted range fails with `PortExhausted`.
///
/// **WHY THIS MATTERS**: The user must be told to free a port rather than seeing a hang.
///
/// **BUG THIS CATCHES**: Would catch an empty search falling through to port 0.
#[test]
fn given_every_port_taken_when_searching_then_returns_port_exhausted() {
    let held = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let taken = held.local_addr().unwrap().port();

    let result = first_available_port("127.0.0.1", taken..taken.saturating_add(1));

    assert!(matches!(result, Err(SupervisorError::PortExhausted { .. })));
}
