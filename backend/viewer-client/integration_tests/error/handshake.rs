use viewer_client::error::{HandshakeError, SessionError};

use std::time::Duration;

/// **VALUE**: Verifies the timeout error names the token and the bound.
///
/// **WHY THIS MATTERS**: With several sessions open, the user has to know which viewer page
/// never loaded.
///
/// **BUG THIS CATCHES**: Would catch the token being left out of the message.
#[test]
fn given_handshake_timeout_when_formatted_then_names_token_and_timeout() {
    let err = HandshakeError::timeout("abc123", Duration::from_secs(5));

    let error_string = err.to_string();

    assert!(error_string.starts_with("Handshake Timeout Error: viewer 'abc123'"));
    assert!(error_string.contains("5s"));
    assert!(error_string.contains("handshake.rs"));
}

/// **VALUE**: Verifies handshake failures convert into the session error users receive.
///
/// **WHY THIS MATTERS**: `flush()` returns `SessionError`; callers match the inner variant.
///
/// **BUG THIS CATCHES**: Would catch a missing `#[from]` conversion.
#[test]
fn given_rejected_handshake_when_converted_then_session_error_wraps_it() {
    let session: SessionError = HandshakeError::rejected("abc123").into();

    assert!(matches!(
        session,
        SessionError::Handshake(HandshakeError::Rejected { ref token, .. }) if token == "abc123"
    ));
}
