//! Coordination service contract consumed by the election core
//!
//! A coordination service provides two primitives: an exclusive lock keyed by
//! a string, which hands back a revocation signal when the lock is lost, and
//! a key-value read whose consistency can be chosen per call.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Trait for distributed coordination backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoordinationService: Send + Sync {
    /// Block until the lock at `key` is acquired with `value` as its payload.
    ///
    /// Returns `Ok(None)` when `cancel` fires before the lock is acquired.
    async fn acquire_lock(
        &self,
        key: &str,
        value: &str,
        cancel: CancellationToken,
    ) -> Result<Option<AcquiredLock>>;

    /// Release a lock previously returned by `acquire_lock`
    async fn release_lock(&self, handle: &LockHandle) -> Result<()>;

    /// Read the value stored at `key`, `Ok(None)` when the key is absent
    async fn read(&self, key: &str, consistency: ReadConsistency) -> Result<Option<StoredValue>>;

    /// Identity this node claims when it takes the lock
    async fn local_node_identity(&self) -> Result<String>;
}

/// Consistency requested for a key-value read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadConsistency {
    /// Backend default, usually served by the current leader
    Default,

    /// Any replica may answer, possibly with stale data
    Stale,

    /// Linearizable read, stale answers are forbidden
    Consistent,
}

/// A value read from the coordination service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredValue {
    /// Stored payload, the leader identity for an election key
    pub value: String,

    /// Session currently holding the key, if any
    pub holder: Option<String>,
}

impl StoredValue {
    pub fn new(value: impl Into<String>, holder: Option<String>) -> Self {
        Self {
            value: value.into(),
            holder,
        }
    }

    /// Whether the value is backed by a live lock holder
    pub fn has_active_holder(&self) -> bool {
        self.holder.as_deref().is_some_and(|h| !h.is_empty())
    }
}

/// Opaque ownership token for a held lock
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockHandle {
    key: String,
    session: String,
}

impl LockHandle {
    pub fn new(key: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            session: session.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn session(&self) -> &str {
        &self.session
    }
}

impl fmt::Display for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.key, self.session)
    }
}

/// One-shot signal that fires when a held lock is lost.
///
/// Dropping the sending half counts as a loss: a backend that can no longer
/// vouch for the lock must not leave its holder waiting forever.
#[derive(Debug)]
pub struct Revocation {
    rx: oneshot::Receiver<()>,
    done: bool,
}

impl Revocation {
    /// Create a revocation signal and the sender that fires it
    pub fn channel() -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx, done: false })
    }

    /// Wait until the lock is lost
    pub async fn fired(&mut self) {
        if !self.done {
            let _ = (&mut self.rx).await;
            self.done = true;
        }
    }

    /// Check for loss without waiting
    pub fn has_fired(&mut self) -> bool {
        if !self.done {
            self.done = !matches!(self.rx.try_recv(), Err(oneshot::error::TryRecvError::Empty));
        }
        self.done
    }
}

/// A successfully acquired lock and its revocation signal
#[derive(Debug)]
pub struct AcquiredLock {
    pub handle: LockHandle,
    pub revocation: Revocation,
}

impl AcquiredLock {
    pub fn new(handle: LockHandle, revocation: Revocation) -> Self {
        Self { handle, revocation }
    }
}
