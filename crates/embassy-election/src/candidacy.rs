//! Candidacy lifecycle: acquire the election lock, hold it until it is lost
//! or given up, and retry forever on failure.
//!
//! All transitions run inside one background task per candidacy, so they are
//! strictly sequential. Stopping is a rendezvous: the task's cancellation
//! token is fired and its join handle awaited, which means no acquisition or
//! watch is still running once [`ElectionController::step_down`] returns.

use crate::config::ElectionSettings;
use crate::coordination::{AcquiredLock, CoordinationService};
use crate::dispatch::Dispatcher;
use crate::error::{ElectionError, Result};
use crate::observer::{ElectionEvent, ElectionObserver};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Where a node stands in the election
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidacyState {
    /// Not a candidate
    Idle,
    /// Waiting on the coordination service for the lock
    Acquiring,
    /// Holding the lock
    Elected,
    /// Last attempt failed, waiting out the retry interval
    RetryPending,
}

impl fmt::Display for CandidacyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Acquiring => "acquiring",
            Self::Elected => "elected",
            Self::RetryPending => "retry_pending",
        };
        f.write_str(name)
    }
}

/// Drives one node's candidacy for a single election key
pub struct ElectionController {
    key: String,
    retry_interval: Duration,
    client: Arc<dyn CoordinationService>,
    state: Arc<watch::Sender<CandidacyState>>,
    inner: Mutex<ControllerInner>,
}

#[derive(Default)]
struct ControllerInner {
    running: Option<RunningCandidacy>,
    events: Option<Dispatcher<ElectionEvent>>,
}

struct RunningCandidacy {
    cancel: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl ElectionController {
    pub fn new(settings: &ElectionSettings, client: Arc<dyn CoordinationService>) -> Self {
        let (state, _) = watch::channel(CandidacyState::Idle);
        Self {
            key: settings.key().to_string(),
            retry_interval: settings.retry_interval(),
            client,
            state: Arc::new(state),
            inner: Mutex::new(ControllerInner::default()),
        }
    }

    /// Current candidacy state
    pub fn state(&self) -> CandidacyState {
        *self.state.borrow()
    }

    /// Follow candidacy state changes
    pub fn subscribe(&self) -> watch::Receiver<CandidacyState> {
        self.state.subscribe()
    }

    /// Whether a candidacy task is still running
    pub async fn is_candidate(&self) -> bool {
        let inner = self.inner.lock().await;
        inner
            .running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Register `observer` and start campaigning in the background.
    ///
    /// Fails with [`ElectionError::AlreadyCandidate`] while a previous
    /// candidacy is still running; the registered observer is left as is.
    pub async fn become_candidate(&self, observer: impl ElectionObserver + 'static) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if let Some(running) = inner.running.take() {
            if !running.task.is_finished() {
                inner.running = Some(running);
                return Err(ElectionError::AlreadyCandidate);
            }

            // A candidacy that stopped on its own, reap it.
            match running.task.await {
                Ok(Err(e)) => tracing::warn!("Previous candidacy for {} ended with: {}", self.key, e),
                Err(e) => tracing::warn!("Previous candidacy for {} failed: {}", self.key, e),
                Ok(Ok(())) => {}
            }
        }

        let observer: Arc<dyn ElectionObserver> = Arc::new(observer);
        let events = match inner.events.as_ref() {
            Some(events) => {
                events.replace(observer).await;
                events.clone()
            }
            None => {
                let events = Dispatcher::spawn(observer);
                inner.events = Some(events.clone());
                events
            }
        };

        let cancel = CancellationToken::new();
        let campaign = Campaign {
            key: self.key.clone(),
            retry_interval: self.retry_interval,
            client: self.client.clone(),
            state: self.state.clone(),
            events,
            cancel: cancel.clone(),
        };

        tracing::info!("Becoming candidate for {}", self.key);
        inner.running = Some(RunningCandidacy {
            cancel,
            task: tokio::spawn(campaign.run()),
        });

        Ok(())
    }

    /// Stop campaigning and give up the lock if it is held.
    ///
    /// Returns the coordination service's release error, if any. Returns
    /// once the background task has exited; a no-op when not a candidate.
    pub async fn step_down(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let Some(running) = inner.running.take() else {
            tracing::debug!("Step down for {} requested while not a candidate", self.key);
            return Ok(());
        };

        running.cancel.cancel();
        let result = running.task.await;

        // Closing the queue lets its delivery task drain what is left and exit.
        inner.events = None;

        tracing::info!("Stepped down from {}", self.key);
        result?
    }

    /// Send future notifications to `observer`, including ones already
    /// queued but not yet delivered. A no-op while not a candidate.
    pub async fn replace_observer(&self, observer: impl ElectionObserver + 'static) {
        let inner = self.inner.lock().await;
        if let Some(events) = inner.events.as_ref() {
            events.replace(Arc::new(observer)).await;
        }
    }
}

impl Drop for ElectionController {
    fn drop(&mut self) {
        // The task winds down on its own and releases a held lock.
        if let Some(running) = self.inner.get_mut().running.as_ref() {
            running.cancel.cancel();
        }
    }
}

/// State owned by the background candidacy task
struct Campaign {
    key: String,
    retry_interval: Duration,
    client: Arc<dyn CoordinationService>,
    state: Arc<watch::Sender<CandidacyState>>,
    events: Dispatcher<ElectionEvent>,
    cancel: CancellationToken,
}

impl Campaign {
    async fn run(self) -> Result<()> {
        let result = self.campaign().await;
        self.set_state(CandidacyState::Idle);
        result
    }

    async fn campaign(&self) -> Result<()> {
        loop {
            self.set_state(CandidacyState::Acquiring);

            let mut lock = match self.acquire().await {
                Ok(Some(lock)) => lock,
                Ok(None) => {
                    tracing::info!("Lock acquisition for {} cancelled, leaving candidacy", self.key);
                    return Ok(());
                }
                Err(_) if self.cancel.is_cancelled() => return Ok(()),
                Err(e) => {
                    if e.is_transient() {
                        tracing::warn!("Failed to acquire lock {}: {}", self.key, e);
                    } else {
                        tracing::error!("Failed to acquire lock {}: {}", self.key, e);
                    }
                    self.set_state(CandidacyState::RetryPending);
                    self.events.send(ElectionEvent::GotElected(Err(e)));

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(self.retry_interval) => continue,
                    }
                }
            };

            if self.cancel.is_cancelled() {
                tracing::info!("Step down raced acquisition of {}, releasing", self.key);
                return self.client.release_lock(&lock.handle).await;
            }

            self.set_state(CandidacyState::Elected);
            tracing::info!("Elected leader for {} ({})", self.key, lock.handle);
            self.events.send(ElectionEvent::GotElected(Ok(())));

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!("Leave received, releasing {}", lock.handle);
                    return self.client.release_lock(&lock.handle).await;
                }
                _ = lock.revocation.fired() => {
                    tracing::warn!("Lost lock {}, campaigning again", lock.handle);
                    self.set_state(CandidacyState::Acquiring);
                    self.events.send(ElectionEvent::LostMaster(Ok(())));

                    if let Err(e) = self.client.release_lock(&lock.handle).await {
                        tracing::warn!("Failed to release lost lock {}: {}", lock.handle, e);
                    }
                }
            }
        }
    }

    /// One acquisition attempt; `Ok(None)` when cancelled.
    ///
    /// Only the identity lookup is abandoned on cancel. The lock request
    /// always runs to completion so a grant racing the stop is returned and
    /// released by the caller.
    async fn acquire(&self) -> Result<Option<AcquiredLock>> {
        let identity = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(None),
            identity = self.client.local_node_identity() => identity?,
        };
        tracing::info!("Trying to acquire lock {} as {}", self.key, identity);

        self.client
            .acquire_lock(&self.key, &identity, self.cancel.child_token())
            .await
    }

    fn set_state(&self, state: CandidacyState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!("Candidacy for {}: {} -> {}", self.key, previous, state);
        }
    }
}
