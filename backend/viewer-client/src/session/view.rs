use crate::error::handshake::HandshakeError;
use crate::error::session::SessionError;
use crate::handshake::HandshakeWaiter;
use crate::session::context::SessionContext;
use crate::session::displayable::Displayable;

use models::{ArrayPayload, Colormap, Frame, FrameBuilder};

use std::collections::VecDeque;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, trace, warn};
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use uuid::Uuid;

const DEFAULT_FIGURE_SIDE: u32 = 512;

/// Figure size in pixels, excluding the viewer toolbar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Figsize {
    pub height: u32,
    pub width: u32,
}

impl Default for Figsize {
    fn default() -> Self {
        Self {
            height: DEFAULT_FIGURE_SIDE,
            width: DEFAULT_FIGURE_SIDE,
        }
    }
}

/// Extra inputs to [`ViewSession::imshow`].
#[derive(Debug, Clone, Default)]
pub struct ImshowOptions {
    pub config: Map<String, Value>,
    pub metadata: Map<String, Value>,
    /// Colormap keyword; only `seg` is supported.
    pub cmap: Option<String>,
}

#[derive(Default)]
struct OutboundQueue {
    batches: VecDeque<Vec<Frame>>,
    active: bool,
}

type SharedQueue = Arc<Mutex<OutboundQueue>>;
type FailureSlot = Arc<Mutex<Option<SessionError>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// One viewer page fed from this process.
///
/// Display operations are validated synchronously and queued. A background
/// consumer sends them in order once the viewer page for this session's token
/// has completed its handshake. The consumer stops when the queue is empty and
/// is restarted by the next enqueue.
pub struct ViewSession {
    token: String,
    figsize: Figsize,
    uri: String,
    context: Arc<SessionContext>,
    handshake: HandshakeWaiter,
    queue: SharedQueue,
    consumer: Mutex<Option<JoinHandle<()>>>,
    failure: FailureSlot,
}

impl ViewSession {
    /// Create a session, starting the server and connecting to it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the server cannot be started or the shared
    /// connection cannot be opened.
    pub async fn new(context: Arc<SessionContext>, figsize: Figsize) -> Result<Self, SessionError> {
        let server = context.ensure_ready().await?;

        let token = new_token();
        let handshake = context.registry().register(&token);
        let uri = format!("http://{}:{}", context.hostname(), server.port);

        info!("Created view session {token} at {uri}");

        Ok(Self {
            token,
            figsize,
            uri,
            context,
            handshake,
            queue: SharedQueue::default(),
            consumer: Mutex::new(None),
            failure: FailureSlot::default(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn figsize(&self) -> Figsize {
        self.figsize
    }

    /// Address of the viewer page for this session.
    pub fn uri(&self) -> String {
        format!("{}?hash={}", self.uri, self.token)
    }

    /// The handshake outcome, if the viewer page has reported back.
    pub fn handshake(&self) -> Option<bool> {
        self.handshake.outcome()
    }

    /// Batches queued but not yet handed to the connection.
    pub fn pending(&self) -> usize {
        lock(&self.queue).batches.len()
    }

    /// Queue a display operation.
    ///
    /// The array, when present, must be 5-dimensional `[B, Z, H, W, C]` with a
    /// supported element type. Validation happens here, before anything is
    /// queued; send failures are reported by [`ViewSession::flush`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] for an invalid array, or
    /// [`SessionError::Runtime`] when called outside a Tokio runtime.
    pub fn enqueue(
        &self,
        array: Option<ArrayPayload>,
        config: Map<String, Value>,
        metadata: Map<String, Value>,
    ) -> Result<(), SessionError> {
        let frames = FrameBuilder::default()
            .with_token(&self.token)
            .with_key(new_token())
            .with_config(config)
            .with_metadata(metadata)
            .with_array(array)
            .build()?;

        let runtime = Handle::try_current().map_err(|e| {
            SessionError::runtime(format!("enqueue must run inside a Tokio runtime: {e}"))
        })?;

        let start_consumer = {
            let mut queue = lock(&self.queue);
            queue.batches.push_back(frames);
            !std::mem::replace(&mut queue.active, true)
        };

        if start_consumer {
            trace!("Starting consumer for view session {}", self.token);
            let consumer = runtime.spawn(consume(
                self.token.clone(),
                Arc::clone(&self.context),
                self.handshake.clone(),
                Arc::clone(&self.queue),
                Arc::clone(&self.failure),
            ));
            *lock(&self.consumer) = Some(consumer);
        }

        Ok(())
    }

    /// Show anything [`Displayable`].
    ///
    /// Maps in `options` are merged over the displayable's own; a colormap
    /// keyword is validated and folded into the config.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] for an unsupported colormap or an
    /// invalid array.
    pub fn imshow<D>(&self, displayable: &D, options: ImshowOptions) -> Result<(), SessionError>
    where
        D: Displayable + ?Sized,
    {
        let ImshowOptions {
            config,
            metadata,
            cmap,
        } = options;

        let mut merged_config = displayable.to_config();
        merged_config.extend(config);

        let mut merged_metadata = displayable.to_metadata();
        merged_metadata.extend(metadata);

        if let Some(cmap) = cmap {
            cmap.parse::<Colormap>()?.apply(&mut merged_config);
        }

        self.enqueue(displayable.to_array(), merged_config, merged_metadata)
    }

    /// Wait for queued operations to be sent.
    ///
    /// # Errors
    ///
    /// Returns the first failure the consumer hit since the last flush.
    pub async fn flush(&self) -> Result<(), SessionError> {
        loop {
            let consumer = lock(&self.consumer).take();
            let Some(consumer) = consumer else {
                break;
            };

            if let Err(e) = consumer.await {
                record_failure(
                    &self.failure,
                    SessionError::runtime(format!("View session consumer failed: {e}")),
                );
            }
        }

        match lock(&self.failure).take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Display for ViewSession {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        write!(
            formatter,
            "ViewSession(\n  uri={},\n  height={},\n  width={},\n)",
            self.uri(),
            self.figsize.height,
            self.figsize.width
        )
    }
}

impl Drop for ViewSession {
    fn drop(&mut self) {
        self.context.registry().evict(&self.token);
    }
}

fn record_failure(slot: &Mutex<Option<SessionError>>, failure: SessionError) {
    let mut slot = lock(slot);
    if slot.is_none() {
        *slot = Some(failure);
    }
}

async fn consume(
    token: String,
    context: Arc<SessionContext>,
    mut handshake: HandshakeWaiter,
    queue: SharedQueue,
    failure: FailureSlot,
) {
    if let Err(e) = drain(&token, &context, &mut handshake, &queue).await {
        let discarded = {
            let mut queue = lock(&queue);
            queue.active = false;
            std::mem::take(&mut queue.batches).len()
        };

        error!("View session {token} stopped streaming ({discarded} queued operations discarded): {e}");
        record_failure(&failure, e);
    }
}

async fn drain(
    token: &str,
    context: &SessionContext,
    handshake: &mut HandshakeWaiter,
    queue: &Mutex<OutboundQueue>,
) -> Result<(), SessionError> {
    loop {
        let batch = {
            let mut queue = lock(queue);
            let batch = queue.batches.pop_front();
            if batch.is_none() {
                queue.active = false;
            }
            batch
        };

        let Some(batch) = batch else {
            trace!("View session {token} queue drained");
            return Ok(());
        };

        if !context.connections().is_open() {
            return Err(HandshakeError::not_connected().into());
        }

        if handshake.outcome().is_none() {
            debug!("View session {token} waiting for viewer handshake");
        }

        if !handshake.wait_timeout(context.timeout()).await? {
            warn!("Viewer for {token} reported connected=false");
            return Err(HandshakeError::rejected(token).into());
        }

        context.connections().send_batch(&batch).await?;
        trace!("View session {token} sent {} frames", batch.len());
    }
}
