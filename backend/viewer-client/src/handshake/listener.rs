use crate::connection::Inbound;
use crate::handshake::registry::HandshakeRegistry;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{Stream, StreamExt};
use log::{debug, info, trace, warn};
use serde::Deserialize;
use tokio::spawn as TokioSpawn;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Handshake notification pushed by the viewer page for a session token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HandshakeNotice {
    #[serde(rename = "hash")]
    pub token: String,
    pub connected: bool,
}

/// Parse an inbound text message as a handshake notification.
pub fn parse_notice(text: &str) -> Result<HandshakeNotice, serde_json::Error> {
    serde_json::from_str(text)
}

/// Run the handshake listener on the read half of the shared connection.
///
/// The task ends when the connection closes or errors, clearing `open`.
pub fn spawn_listener(
    inbound: Inbound,
    registry: Arc<HandshakeRegistry>,
    open: Arc<AtomicBool>,
) -> JoinHandle<()> {
    TokioSpawn(listen(inbound, registry, open))
}

pub(crate) async fn listen<S>(mut inbound: S, registry: Arc<HandshakeRegistry>, open: Arc<AtomicBool>)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    debug!("Handshake listener started");

    while let Some(message) = inbound.next().await {
        match message {
            Ok(Message::Text(text)) => match parse_notice(text.as_str()) {
                Ok(HandshakeNotice { token, connected }) => {
                    let resolution = registry.resolve(&token, connected);
                    trace!("Handshake notice for {token}: {resolution:?}");
                }
                Err(e) => warn!("Ignoring malformed viewer message: {e}"),
            },
            Ok(Message::Close(frame)) => {
                info!("Viewer server closed the connection: {frame:?}");
                break;
            }
            Ok(_) => trace!("Ignoring non-text viewer message"),
            Err(e) => {
                warn!("Connection to viewer server failed: {e}");
                break;
            }
        }
    }

    open.store(false, Ordering::Release);
    debug!("Handshake listener stopped");
}
