//! Output relay for the supervised viewer server.
//!
//! One async reader per piped stream drains lines as they arrive, so the
//! server can never block on a full pipe. Lines destined for a log file are
//! handed to a single dedicated writer thread through a bounded channel with
//! `try_send`: when the writer falls behind, lines are dropped and counted
//! instead of slowing the readers down.

use std::fmt::{Display, Formatter, Result as FormatResult};
use std::fs::File;
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{Builder as ThreadBuilder, JoinHandle as ThreadHandle};

use log::{debug, trace, warn};
use tokio::io::{AsyncBufRead, Lines};
use tokio::spawn as TokioSpawn;
use tokio::sync::mpsc::{Receiver, Sender, channel};
use tokio::task::{JoinHandle, spawn_blocking};

const RELAY_CHANNEL_CAPACITY: usize = 1024;
const RELAY_THREAD_NAME: &str = "tunnelvision-log-relay";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl Display for OutputStream {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        match self {
            OutputStream::Stdout => formatter.write_str("stdout"),
            OutputStream::Stderr => formatter.write_str("stderr"),
        }
    }
}

/// Log destinations per stream. `None` means the stream is drained and traced only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayTargets {
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
}

impl RelayTargets {
    /// Create (truncate) the configured log files.
    pub fn open(&self) -> io::Result<RelayFiles> {
        Ok(RelayFiles {
            stdout: self.stdout.as_deref().map(create_log).transpose()?,
            stderr: self.stderr.as_deref().map(create_log).transpose()?,
        })
    }
}

/// Opened log files, owned by the writer thread once the relay starts.
#[derive(Debug, Default)]
pub struct RelayFiles {
    stdout: Option<LineWriter<File>>,
    stderr: Option<LineWriter<File>>,
}

impl RelayFiles {
    fn is_empty(&self) -> bool {
        self.stdout.is_none() && self.stderr.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    /// Lines persisted to log files.
    pub written: u64,
    /// Lines discarded because the writer could not keep up.
    pub dropped: u64,
}

struct RelayLine {
    stream: OutputStream,
    line: String,
}

/// Handle to the running relay. Finishes once every attached stream reached EOF.
pub struct OutputRelay {
    sender: Option<Sender<RelayLine>>,
    readers: Vec<JoinHandle<()>>,
    writer: Option<ThreadHandle<io::Result<u64>>>,
    dropped: Arc<AtomicU64>,
}

impl OutputRelay {
    /// Start the relay. The writer thread is only spawned when `files` holds
    /// at least one destination.
    pub fn new(files: RelayFiles) -> Self {
        let (sender, writer) = if files.is_empty() {
            (None, None)
        } else {
            let (tx, rx) = channel(RELAY_CHANNEL_CAPACITY);
            match spawn_writer(rx, files) {
                Ok(handle) => (Some(tx), Some(handle)),
                Err(e) => {
                    warn!("Failed to start log relay thread, server output will only be traced: {e}");
                    (None, None)
                }
            }
        };

        Self {
            sender,
            readers: Vec::with_capacity(2),
            writer,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Drain `lines` in a background task until EOF.
    ///
    /// Must be called within a Tokio runtime.
    pub fn attach<R>(&mut self, stream: OutputStream, lines: Lines<R>)
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        self.readers.push(TokioSpawn(relay_lines(
            lines,
            stream,
            self.sender.clone(),
            Arc::clone(&self.dropped),
        )));
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wait for every reader to hit EOF and for the writer to flush and close its files.
    pub async fn join(mut self) -> RelaySummary {
        self.sender.take();

        for reader in self.readers.drain(..) {
            if let Err(e) = reader.await {
                warn!("Log relay reader ended abnormally: {e}");
            }
        }

        let written = match self.writer.take() {
            Some(handle) => match spawn_blocking(move || handle.join()).await {
                Ok(Ok(Ok(written))) => written,
                Ok(Ok(Err(e))) => {
                    warn!("Log relay writer failed: {e}");
                    0
                }
                Ok(Err(_)) => {
                    warn!("Log relay writer panicked");
                    0
                }
                Err(e) => {
                    warn!("Failed to join log relay writer: {e}");
                    0
                }
            },
            None => 0,
        };

        let summary = RelaySummary {
            written,
            dropped: self.dropped.load(Ordering::Relaxed),
        };

        if summary.dropped > 0 {
            warn!("Log relay dropped {} server output lines", summary.dropped);
        }
        debug!("Log relay finished: {summary:?}");

        summary
    }
}

async fn relay_lines<R>(
    mut lines: Lines<R>,
    stream: OutputStream,
    sender: Option<Sender<RelayLine>>,
    dropped: Arc<AtomicU64>,
) where
    R: AsyncBufRead + Unpin,
{
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                trace!("Server {stream}: {line}");

                if let Some(sender) = &sender
                    && sender.try_send(RelayLine { stream, line }).is_err()
                {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Stopped reading server {stream}: {e}");
                break;
            }
        }
    }

    trace!("Server {stream} closed");
}

fn spawn_writer(
    receiver: Receiver<RelayLine>,
    files: RelayFiles,
) -> io::Result<ThreadHandle<io::Result<u64>>> {
    ThreadBuilder::new()
        .name(RELAY_THREAD_NAME.to_string())
        .spawn(move || write_lines(receiver, files))
}

fn write_lines(mut receiver: Receiver<RelayLine>, mut files: RelayFiles) -> io::Result<u64> {
    let mut written = 0;

    while let Some(RelayLine { stream, line }) = receiver.blocking_recv() {
        let sink = match stream {
            OutputStream::Stdout => files.stdout.as_mut(),
            OutputStream::Stderr => files.stderr.as_mut(),
        };

        if let Some(sink) = sink {
            writeln!(sink, "{line}")?;
            written += 1;
        }
    }

    for sink in [files.stdout.as_mut(), files.stderr.as_mut()].into_iter().flatten() {
        sink.flush()?;
    }

    Ok(written)
}

fn create_log(path: &Path) -> io::Result<LineWriter<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    File::create(path).map(LineWriter::new)
}
