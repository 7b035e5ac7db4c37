use crate::error::handshake::HandshakeError;

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, trace, warn};
use tokio::sync::watch::{Receiver, Sender, channel};
use tokio::time::timeout as TokioTimeout;

/// Pre-resolved entries nobody registered for are capped at this many; the
/// oldest is dropped first.
pub const MAX_UNSOLICITED: usize = 1024;

/// What [`HandshakeRegistry::resolve`] did with a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A pending entry was completed.
    Resolved,
    /// No entry existed; one was stored already resolved.
    Preregistered,
    /// The entry was already resolved; the first value is kept.
    Duplicate,
}

/// Await side of one token's handshake.
#[derive(Debug, Clone)]
pub struct HandshakeWaiter {
    token: String,
    receiver: Receiver<Option<bool>>,
}

impl HandshakeWaiter {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The resolved value, without waiting.
    pub fn outcome(&self) -> Option<bool> {
        *self.receiver.borrow()
    }

    /// Wait until the handshake resolves.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::Evicted`] if the entry is removed first.
    pub async fn wait(&mut self) -> Result<bool, HandshakeError> {
        let outcome = match self.receiver.wait_for(Option::is_some).await {
            Ok(value) => *value,
            Err(_) => None,
        };

        outcome.ok_or_else(|| HandshakeError::evicted(&self.token))
    }

    /// [`HandshakeWaiter::wait`] bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::HandshakeTimeout`] if nothing arrives in time.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> Result<bool, HandshakeError> {
        match TokioTimeout(timeout, self.wait()).await {
            Ok(result) => result,
            Err(_) => Err(HandshakeError::timeout(&self.token, timeout)),
        }
    }
}

#[derive(Default)]
struct Entries {
    cells: HashMap<String, Sender<Option<bool>>>,
    unsolicited: VecDeque<String>,
}

/// Token to handshake outcome map shared by the listener and all view sessions.
#[derive(Default)]
pub struct HandshakeRegistry {
    entries: Mutex<Entries>,
}

impl HandshakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a waiter for `token`, creating a pending entry if none exists.
    ///
    /// Registering after the viewer already answered returns a waiter that is
    /// resolved immediately.
    pub fn register(&self, token: &str) -> HandshakeWaiter {
        let mut entries = self.entries();
        entries.unsolicited.retain(|pending| pending != token);

        let sender = entries
            .cells
            .entry(token.to_string())
            .or_insert_with(|| channel(None).0);

        trace!("Registered handshake for {token}");

        HandshakeWaiter {
            token: token.to_string(),
            receiver: sender.subscribe(),
        }
    }

    /// Record the viewer's answer for `token`.
    pub fn resolve(&self, token: &str, connected: bool) -> Resolution {
        let mut entries = self.entries();

        if let Some(sender) = entries.cells.get(token) {
            let previous = *sender.borrow();
            return match previous {
                Some(first) => {
                    warn!(
                        "Ignoring repeated handshake for {token} (connected={connected}, kept {first})"
                    );
                    Resolution::Duplicate
                }
                None => {
                    sender.send_replace(Some(connected));
                    debug!("Handshake resolved for {token}: connected={connected}");
                    Resolution::Resolved
                }
            };
        }

        entries
            .cells
            .insert(token.to_string(), channel(Some(connected)).0);
        entries.unsolicited.push_back(token.to_string());

        while entries.unsolicited.len() > MAX_UNSOLICITED {
            if let Some(oldest) = entries.unsolicited.pop_front() {
                debug!("Dropping unclaimed handshake for {oldest}");
                entries.cells.remove(&oldest);
            }
        }

        debug!("Handshake for {token} arrived before registration: connected={connected}");
        Resolution::Preregistered
    }

    /// Remove `token`. Waiters still pending fail with [`HandshakeError::Evicted`].
    pub fn evict(&self, token: &str) -> bool {
        let mut entries = self.entries();
        entries.unsolicited.retain(|pending| pending != token);
        let removed = entries.cells.remove(token).is_some();

        if removed {
            trace!("Evicted handshake for {token}");
        }
        removed
    }

    pub fn contains(&self, token: &str) -> bool {
        self.entries().cells.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.entries().cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove `token` if nobody holds a waiter on it.
    fn evict_unwatched(&self, token: &str) -> bool {
        let mut entries = self.entries();
        let unwatched = entries
            .cells
            .get(token)
            .is_some_and(|sender| sender.receiver_count() == 0);

        if unwatched {
            entries.cells.remove(token);
            entries.unsolicited.retain(|pending| pending != token);
            trace!("Released handshake for {token}");
        }
        unwatched
    }

    /// Register `token` and wait for its outcome.
    ///
    /// The entry is removed afterwards (resolved, timed out or cancelled)
    /// unless another waiter, such as a view session, still holds it.
    pub async fn wait_for(&self, token: &str, timeout: Duration) -> Result<bool, HandshakeError> {
        let _release = ReleaseOnDrop {
            registry: self,
            token,
        };
        let mut waiter = self.register(token);
        waiter.wait_timeout(timeout).await
    }
}

/// Drops after the waiter it guards, then evicts the entry if it is unwatched.
struct ReleaseOnDrop<'a> {
    registry: &'a HandshakeRegistry,
    token: &'a str,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.registry.evict_unwatched(self.token);
    }
}
