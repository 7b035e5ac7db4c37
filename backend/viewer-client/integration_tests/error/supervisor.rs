use viewer_client::error::{CoreError, SessionError, SupervisorError};

use common::ErrorLocation;

use std::error::Error;
use std::io::{Error as IoError, ErrorKind};
use std::panic::Location;

/// **VALUE**: Verifies `SupervisorError::Spawn` shows its location and keeps the io error as source.
///
/// **WHY THIS MATTERS**: A server that cannot be launched is usually a packaging problem; the
/// underlying OS error is what tells the user which.
///
/// **BUG THIS CATCHES**: Would catch the `#[source]` attribute being dropped or the location
/// missing from the Display output.
#[test]
#[track_caller]
fn given_spawn_error_when_formatted_then_includes_location_and_source() {
    // GIVEN: A Spawn error wrapping an io error
    let err = SupervisorError::Spawn {
        message: "Failed to spawn tunnelvision-server".to_string(),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(IoError::new(ErrorKind::PermissionDenied, "not executable")),
    };

    // WHEN: Formatting it
    let error_string = err.to_string();

    // THEN: Kind, message and location are present, and the source is reachable
    assert!(error_string.starts_with("Spawn Error: Failed to spawn tunnelvision-server ["));
    assert!(error_string.contains("supervisor.rs"));
    assert_eq!(err.source().unwrap().to_string(), "not executable");
}

/// **VALUE**: Verifies helper constructors capture the caller's location.
///
/// **WHY THIS MATTERS**: These helpers are called from many places; the location must point
/// at the call site, not at the helper.
///
/// **BUG THIS CATCHES**: Would catch a missing `#[track_caller]` on the helpers.
#[test]
fn given_helper_constructor_when_called_then_location_is_the_call_site() {
    let line = line!() + 1;
    let err = SupervisorError::exited("Server output ended");

    match err {
        SupervisorError::Exited { location, .. } => {
            assert_eq!(location.line, line);
            assert!(location.file.ends_with("supervisor.rs"));
        }
        other => panic!("Expected Exited, got {other:?}"),
    }
}

/// **VALUE**: Verifies supervisor errors pass through session and core errors unchanged.
///
/// **WHY THIS MATTERS**: Callers match on the inner variant no matter which layer returned it.
///
/// **BUG THIS CATCHES**: Would catch a wrapper that rewrites the message.
#[test]
fn given_supervisor_error_when_wrapped_then_display_is_transparent() {
    let err = SupervisorError::not_running();
    let expected = err.to_string();

    let session: SessionError = err.into();
    assert_eq!(session.to_string(), expected);

    let core: CoreError = session.into();
    assert_eq!(core.to_string(), expected);
}
