//! Shared websocket connection to the viewer server.
//!
//! One connection per process carries the frames of every view session. The
//! write half sits behind an async mutex so that the frames of one display
//! operation go out back to back. The read half is handed to the handshake
//! listener.
//!
//! # Protocol
//!
//! `ws://<hostname>:<port>/ws`. Headers are UTF-8 JSON text messages; array
//! payloads are binary messages.

use crate::WS_PATH;
use crate::error::connection::ConnectionError;
use crate::server::ServerInfo;

use common::ErrorLocation;
use models::Frame;

use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep as TokioSleep, timeout as TokioTimeout};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

const CONNECT_INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const CONNECT_MAX_BACKOFF: Duration = Duration::from_millis(500);

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = SplitSink<WsStream, Message>;
/// Read half of the shared connection, consumed by the handshake listener.
pub type Inbound = SplitStream<WsStream>;

/// `ws://<hostname>:<port>/ws`
#[track_caller]
pub fn ws_url(hostname: &str, port: u16) -> Result<Url, ConnectionError> {
    Ok(Url::parse(&format!("ws://{hostname}:{port}{WS_PATH}"))?)
}

/// Cloneable handle to one open websocket.
#[derive(Clone)]
pub struct Connection {
    url: Url,
    sink: Arc<AsyncMutex<WsSink>>,
    open: Arc<AtomicBool>,
}

impl Connection {
    fn new(url: Url, sink: WsSink) -> Self {
        Self {
            url,
            sink: Arc::new(AsyncMutex::new(sink)),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Flag shared with the handshake listener, cleared when the inbound side ends.
    pub(crate) fn open_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.open)
    }

    pub async fn send(&self, frame: &Frame) -> Result<(), ConnectionError> {
        self.send_batch(std::slice::from_ref(frame)).await
    }

    /// Send `frames` in order without letting other senders interleave.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotOpen`] if the connection is closed before
    /// a frame goes out, or [`ConnectionError::Send`] if the socket write fails.
    /// A failed write marks the connection closed.
    pub async fn send_batch(&self, frames: &[Frame]) -> Result<(), ConnectionError> {
        let mut sink = self.sink.lock().await;

        for frame in frames {
            if !self.is_open() {
                return Err(ConnectionError::not_open());
            }

            let message = to_message(frame)?;
            trace!("Sending {} frame to {}", frame_kind(frame), self.url);

            if let Err(e) = sink.send(message).await {
                self.open.store(false, Ordering::Release);
                return Err(ConnectionError::Send {
                    message: format!("Failed to send {} frame: {e}", frame_kind(frame)),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }

        Ok(())
    }

    /// Mark the connection closed and close the write half.
    ///
    /// The sink is closed even when the inbound side already cleared the flag.
    pub async fn close(&self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            trace!("Connection to {} already marked closed", self.url);
        }

        let mut sink = self.sink.lock().await;
        match sink.close().await {
            Ok(()) => debug!("Closed connection to {}", self.url),
            Err(e) => debug!("Connection to {} closed uncleanly: {e}", self.url),
        }
    }
}

fn frame_kind(frame: &Frame) -> &'static str {
    match frame {
        Frame::Header(_) => "header",
        Frame::Payload(_) => "payload",
    }
}

fn to_message(frame: &Frame) -> Result<Message, ConnectionError> {
    Ok(match frame {
        Frame::Header(header) => Message::Text(header.to_json()?.into()),
        Frame::Payload(bytes) => Message::Binary(bytes.clone().into()),
    })
}

/// Owner of the process-wide shared connection.
#[derive(Default)]
pub struct ConnectionManager {
    current: RwLock<Option<Connection>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the shared connection to a running server.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotRunning`] if `server` is `None`, otherwise
    /// whatever [`ConnectionManager::connect_url`] returns.
    pub async fn connect(
        &self,
        server: Option<ServerInfo>,
        hostname: &str,
        open_timeout: Duration,
    ) -> Result<(Connection, Inbound), ConnectionError> {
        let server = server.ok_or_else(ConnectionError::not_running)?;
        let url = ws_url(hostname, server.port)?;
        self.connect_url(url, open_timeout).await
    }

    /// Open a connection to `url` and make it the shared one.
    ///
    /// Any previous connection is closed first. Refused connections are
    /// retried with exponential backoff until `open_timeout` elapses.
    ///
    /// # Returns
    ///
    /// * `Ok((Connection, Inbound))` - The new shared connection and its read half
    /// * `Err(ConnectionError)` - The handshake failed or timed out
    pub async fn connect_url(
        &self,
        url: Url,
        open_timeout: Duration,
    ) -> Result<(Connection, Inbound), ConnectionError> {
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(previous) = previous {
            debug!("Closing previous connection to {}", previous.url());
            previous.close().await;
        }

        info!("Connecting to {url}");

        let stream = match TokioTimeout(open_timeout, open_with_retry(&url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConnectionError::OpenTimeout {
                    message: format!("Could not open {url} within {open_timeout:?}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        };

        let (sink, inbound) = stream.split();
        let connection = Connection::new(url, sink);

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(connection.clone());

        info!("Connected to {}", connection.url());
        Ok((connection, inbound))
    }

    pub fn current(&self) -> Option<Connection> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_open(&self) -> bool {
        self.current().is_some_and(|connection| connection.is_open())
    }

    #[track_caller]
    fn open_connection(&self) -> Result<Connection, ConnectionError> {
        let location = Location::caller();
        self.current()
            .filter(Connection::is_open)
            .ok_or(ConnectionError::NotOpen {
                location: ErrorLocation::from(location),
            })
    }

    pub async fn send(&self, frame: &Frame) -> Result<(), ConnectionError> {
        self.open_connection()?.send(frame).await
    }

    pub async fn send_batch(&self, frames: &[Frame]) -> Result<(), ConnectionError> {
        self.open_connection()?.send_batch(frames).await
    }

    /// Close and forget the shared connection, if any.
    pub async fn close(&self) {
        let current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(connection) = current {
            connection.close().await;
        }
    }
}

async fn open_with_retry(url: &Url) -> Result<WsStream, ConnectionError> {
    let mut backoff = ExponentialBackoff {
        current_interval: CONNECT_INITIAL_BACKOFF,
        initial_interval: CONNECT_INITIAL_BACKOFF,
        max_interval: CONNECT_MAX_BACKOFF,
        max_elapsed_time: None,
        ..Default::default()
    };

    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, response)) => {
                debug!("Websocket handshake with {url} answered {}", response.status());
                return Ok(stream);
            }
            Err(WsError::Io(e)) => {
                let delay = backoff.next_backoff().unwrap_or(CONNECT_MAX_BACKOFF);
                trace!("Connecting to {url} failed ({e}), retrying after {delay:?}");
                TokioSleep(delay).await;
            }
            Err(e) => {
                warn!("Websocket handshake with {url} failed: {e}");
                return Err(ConnectionError::Connect {
                    message: format!("Failed to open {url}: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }
    }
}
