//! Test helpers for session integration tests.
//!
//! This module provides:
//! - A fake viewer: an in-process websocket server that records every frame it
//!   receives and can push handshake notifications back
//! - A fake server binary: a shell script that prints the startup banner and idles
//! - Config and context builders wiring the two together

use viewer_client::config::ViewerConfig;
use viewer_client::session::SessionContext;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

pub const FRAME_WAIT: Duration = Duration::from_secs(5);

/// In-process stand-in for the viewer server's websocket endpoint.
pub struct FakeViewer {
    pub port: u16,
    path: Arc<Mutex<Option<String>>>,
    received: UnboundedReceiver<Message>,
    outbound: UnboundedSender<Message>,
    task: JoinHandle<()>,
}

impl FakeViewer {
    /// Listen on an OS-assigned port and serve one client.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake viewer");
        let port = listener.local_addr().unwrap().port();

        let path = Arc::new(Mutex::new(None));
        let recorded_path = Arc::clone(&path);
        let (received_tx, received) = unbounded_channel();
        let (outbound, mut outbound_rx) = unbounded_channel::<Message>();

        let task = tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };

            let record_path = move |request: &Request, response: Response| {
                *recorded_path.lock().unwrap() = Some(request.uri().path().to_string());
                Ok::<Response, ErrorResponse>(response)
            };

            let Ok(ws) = accept_hdr_async(stream, record_path).await else {
                return;
            };
            let (mut write, mut read) = ws.split();

            loop {
                tokio::select! {
                    message = read.next() => match message {
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(message)) => {
                            let _ = received_tx.send(message);
                        }
                    },
                    Some(message) = outbound_rx.recv() => {
                        if write.send(message).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            port,
            path,
            received,
            outbound,
            task,
        }
    }

    /// Request path of the websocket upgrade, once a client connected.
    pub fn path(&self) -> Option<String> {
        self.path.lock().unwrap().clone()
    }

    /// Push `{"hash": token, "connected": connected}` to the client.
    pub fn handshake(&self, token: &str, connected: bool) {
        let notice = json!({ "hash": token, "connected": connected }).to_string();
        self.outbound
            .send(Message::Text(notice.into()))
            .expect("Fake viewer stopped");
    }

    /// Push an arbitrary text message to the client.
    pub fn send_text(&self, text: &str) {
        self.outbound
            .send(Message::Text(text.to_string().into()))
            .expect("Fake viewer stopped");
    }

    /// The next frame the client sent.
    pub async fn next_frame(&mut self) -> Message {
        timeout(FRAME_WAIT, self.received.recv())
            .await
            .expect("No frame within wait")
            .expect("Fake viewer connection ended")
    }

    /// The next frame, which must be a JSON text header.
    pub async fn next_header(&mut self) -> serde_json::Value {
        match self.next_frame().await {
            Message::Text(text) => serde_json::from_str(text.as_str()).expect("Header is not JSON"),
            other => panic!("Expected text header, got {other:?}"),
        }
    }

    /// The next frame, which must be binary.
    pub async fn next_payload(&mut self) -> Vec<u8> {
        match self.next_frame().await {
            Message::Binary(bytes) => bytes.to_vec(),
            other => panic!("Expected binary payload, got {other:?}"),
        }
    }

    /// Panic if any frame arrives within `window`.
    pub async fn assert_silent(&mut self, window: Duration) {
        if let Ok(frame) = timeout(window, self.received.recv()).await {
            panic!("Expected no frames, got {frame:?}");
        }
    }
}

impl Drop for FakeViewer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Shell script standing in for the viewer server binary.
pub fn fake_server_binary(dir: &Path) -> PathBuf {
    let path = dir.join("tunnelvision-server");
    std::fs::write(
        &path,
        "#!/bin/sh\necho 'serving assets'\necho '--- tunnelvision ---'\nexec sleep 60\n",
    )
    .expect("Failed to write fake server");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    path
}

/// Config launching the fake server binary and connecting to `viewer_port`.
pub fn viewer_config(dir: &TempDir, viewer_port: u16, timeout_secs: u64) -> ViewerConfig {
    ViewerConfig {
        hostname: "127.0.0.1".to_string(),
        port: Some(viewer_port),
        timeout: timeout_secs,
        log_stdout: Some(dir.path().join("server.out")),
        log_stderr: None,
        server_binary: Some(fake_server_binary(dir.path())),
        asset_dir: Some(dir.path().to_path_buf()),
    }
}

pub fn context_for(dir: &TempDir, viewer: &FakeViewer, timeout_secs: u64) -> Arc<SessionContext> {
    SessionContext::new(viewer_config(dir, viewer.port, timeout_secs))
}
