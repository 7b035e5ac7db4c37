use crate::handshake::listener::{HandshakeNotice, listen, parse_notice};
use crate::handshake::registry::HandshakeRegistry;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

fn text(body: &str) -> Result<Message, WsError> {
    Ok(Message::Text(body.to_string().into()))
}

/// **VALUE**: Verifies the handshake notification format.
///
/// **WHY THIS MATTERS**: The viewer page sends `{"hash": ..., "connected": ...}`; a field
/// name mismatch means no session ever resolves.
///
/// **BUG THIS CATCHES**: Would catch the token field being read as `token` instead of `hash`.
#[test]
fn given_viewer_notice_when_parsing_then_reads_hash_and_connected() {
    let notice = parse_notice(r#"{"hash":"abc123","connected":true}"#).unwrap();

    assert_eq!(
        notice,
        HandshakeNotice {
            token: "abc123".to_string(),
            connected: true
        }
    );
    assert!(parse_notice(r#"{"hash":"abc123"}"#).is_err());
}

/// **VALUE**: Verifies malformed messages do not stop the listener.
///
/// **WHY THIS MATTERS**: One bad message from any page would otherwise stall every session
/// sharing the connection.
///
/// **BUG THIS CATCHES**: Would catch parse errors being propagated out of the loop.
#[tokio::test]
async fn given_malformed_message_before_valid_one_when_listening_then_valid_one_resolves() {
    // GIVEN: Garbage, an unrelated binary frame, then a valid notice
    let registry = Arc::new(HandshakeRegistry::new());
    let waiter = registry.register("abc123");
    let open = Arc::new(AtomicBool::new(true));
    let inbound = stream::iter(vec![
        text("not json"),
        text(r#"{"connected":true}"#),
        Ok(Message::Binary(vec![1u8, 2, 3].into())),
        text(r#"{"hash":"abc123","connected":true}"#),
    ]);

    // WHEN: The listener runs to the end of the stream
    listen(inbound, Arc::clone(&registry), Arc::clone(&open)).await;

    // THEN: The valid notice resolved the token
    assert_eq!(waiter.outcome(), Some(true));
}

/// **VALUE**: Verifies the listener marks the connection closed when it ends.
///
/// **WHY THIS MATTERS**: Sessions check the open flag before sending; a stale `true` makes
/// them write into a dead socket.
///
/// **BUG THIS CATCHES**: Would catch the flag only being cleared on explicit close.
#[tokio::test]
async fn given_close_frame_when_listening_then_stops_and_clears_open_flag() {
    // GIVEN: A close frame followed by a notice that must not be processed
    let registry = Arc::new(HandshakeRegistry::new());
    let open = Arc::new(AtomicBool::new(true));
    let inbound = stream::iter(vec![
        Ok(Message::Close(None)),
        text(r#"{"hash":"after-close","connected":true}"#),
    ]);

    // WHEN: Listening
    listen(inbound, Arc::clone(&registry), Arc::clone(&open)).await;

    // THEN: The loop stopped at the close and the flag is cleared
    assert!(!open.load(Ordering::Acquire));
    assert!(!registry.contains("after-close"));
}

/// **VALUE**: Verifies socket errors end the listener.
///
/// **WHY THIS MATTERS**: After a transport error the stream is unusable; spinning on it would
/// burn a core.
///
/// **BUG THIS CATCHES**: Would catch errors being treated like malformed messages.
#[tokio::test]
async fn given_socket_error_when_listening_then_stops_and_clears_open_flag() {
    let registry = Arc::new(HandshakeRegistry::new());
    let open = Arc::new(AtomicBool::new(true));
    let inbound = stream::iter(vec![
        Err(WsError::ConnectionClosed),
        text(r#"{"hash":"after-error","connected":true}"#),
    ]);

    listen(inbound, Arc::clone(&registry), Arc::clone(&open)).await;

    assert!(!open.load(Ordering::Acquire));
    assert!(!registry.contains("after-error"));
}

/// **VALUE**: Verifies notices for unknown tokens are stored pre-resolved.
///
/// **WHY THIS MATTERS**: The browser may answer before the session registered.
///
/// **BUG THIS CATCHES**: Would catch the listener only resolving registered tokens.
#[tokio::test]
async fn given_notice_for_unregistered_token_when_listening_then_entry_is_preregistered() {
    let registry = Arc::new(HandshakeRegistry::new());
    let open = Arc::new(AtomicBool::new(true));
    let inbound = stream::iter(vec![text(r#"{"hash":"early","connected":false}"#)]);

    listen(inbound, Arc::clone(&registry), open).await;

    assert_eq!(registry.register("early").outcome(), Some(false));
}
