//! In-process coordination service
//!
//! Sessions, exclusive locks and a key-value store kept behind one lock, so
//! every read is linearizable regardless of the requested consistency.
//! Several nodes share a backend through [`MemoryCoordinator::for_node`].

use crate::coordination::{
    AcquiredLock, CoordinationService, LockHandle, ReadConsistency, Revocation, StoredValue,
};
use crate::error::{ElectionError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, watch, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// In-memory coordination service implementation
#[derive(Clone)]
pub struct MemoryCoordinator {
    node_name: String,
    state: Arc<RwLock<MemoryState>>,
    changed: Arc<watch::Sender<u64>>,
}

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, StoredValue>,
    sessions: HashMap<String, Session>,
}

struct Session {
    key: String,
    node: String,
    revoke: oneshot::Sender<()>,
}

impl MemoryCoordinator {
    /// Create a fresh backend with a client bound to `node_name`
    pub fn new(node_name: impl Into<String>) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            node_name: node_name.into(),
            state: Arc::new(RwLock::new(MemoryState::default())),
            changed: Arc::new(changed),
        }
    }

    /// Client for another node sharing this backend
    pub fn for_node(&self, node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            state: self.state.clone(),
            changed: self.changed.clone(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Write a value without taking the lock; an existing holder is kept
    pub async fn put(&self, key: &str, value: impl Into<String>) {
        let mut state = self.state.write().await;
        let holder = state.entries.get(key).and_then(|e| e.holder.clone());
        state
            .entries
            .insert(key.to_string(), StoredValue::new(value, holder));
        drop(state);

        self.notify_changed();
    }

    /// Remove a key, revoking the session that held it
    pub async fn delete(&self, key: &str) -> Option<StoredValue> {
        let mut state = self.state.write().await;
        let removed = state.entries.remove(key);
        if let Some(session) = removed.as_ref().and_then(|e| e.holder.clone()) {
            if let Some(session) = state.sessions.remove(&session) {
                let _ = session.revoke.send(());
            }
        }
        drop(state);

        self.notify_changed();
        removed
    }

    /// Session currently holding `key`
    pub async fn holder(&self, key: &str) -> Option<String> {
        let state = self.state.read().await;
        state.entries.get(key).and_then(|e| e.holder.clone())
    }

    /// Expire a session: its lock is released, the stored value stays
    pub async fn invalidate_session(&self, session: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(removed) = state.sessions.remove(session) else {
            return false;
        };

        if let Some(entry) = state.entries.get_mut(&removed.key) {
            if entry.holder.as_deref() == Some(session) {
                entry.holder = None;
            }
        }
        drop(state);

        tracing::info!(
            "Session {} of node {} invalidated, lock on {} released",
            session,
            removed.node,
            removed.key
        );
        let _ = removed.revoke.send(());
        self.notify_changed();
        true
    }

    /// Expire whichever session currently holds `key`
    pub async fn invalidate_holder(&self, key: &str) -> Option<String> {
        let session = self.holder(key).await?;
        self.invalidate_session(&session).await.then_some(session)
    }

    fn notify_changed(&self) {
        self.changed.send_modify(|version| *version = version.wrapping_add(1));
    }
}

#[async_trait]
impl CoordinationService for MemoryCoordinator {
    async fn acquire_lock(
        &self,
        key: &str,
        value: &str,
        cancel: CancellationToken,
    ) -> Result<Option<AcquiredLock>> {
        // Subscribe before the first check so a release between the check and
        // the wait still wakes us.
        let mut changes = self.changed.subscribe();

        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            {
                let mut state = self.state.write().await;
                let held = state
                    .entries
                    .get(key)
                    .is_some_and(StoredValue::has_active_holder);

                if !held {
                    let session = Uuid::new_v4().to_string();
                    let (revoke, revocation) = Revocation::channel();
                    state.sessions.insert(
                        session.clone(),
                        Session {
                            key: key.to_string(),
                            node: self.node_name.clone(),
                            revoke,
                        },
                    );
                    state.entries.insert(
                        key.to_string(),
                        StoredValue::new(value, Some(session.clone())),
                    );
                    drop(state);

                    tracing::debug!("Node {} took lock {} with session {}", self.node_name, key, session);
                    self.notify_changed();
                    return Ok(Some(AcquiredLock::new(
                        LockHandle::new(key, session),
                        revocation,
                    )));
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                changed = changes.changed() => {
                    changed.map_err(|_| ElectionError::coordination("Coordinator shut down"))?;
                }
            }
        }
    }

    async fn release_lock(&self, handle: &LockHandle) -> Result<()> {
        let mut state = self.state.write().await;
        if state.sessions.remove(handle.session()).is_none() {
            return Err(ElectionError::lock_not_held(handle.to_string()));
        }

        if let Some(entry) = state.entries.get_mut(handle.key()) {
            if entry.holder.as_deref() == Some(handle.session()) {
                entry.holder = None;
            }
        }
        drop(state);

        tracing::debug!("Node {} released lock {}", self.node_name, handle);
        self.notify_changed();
        Ok(())
    }

    async fn read(&self, key: &str, consistency: ReadConsistency) -> Result<Option<StoredValue>> {
        tracing::trace!("Reading {} with {:?} consistency", key, consistency);
        let state = self.state.read().await;
        Ok(state.entries.get(key).cloned())
    }

    async fn local_node_identity(&self) -> Result<String> {
        if self.node_name.is_empty() {
            return Err(ElectionError::coordination("Local node name is not set"));
        }
        Ok(self.node_name.clone())
    }
}
