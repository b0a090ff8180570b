//! Leader identity polling

use crate::config::ElectionSettings;
use crate::coordination::{CoordinationService, ReadConsistency, StoredValue};
use crate::dispatch::Dispatcher;
use crate::error::{ElectionError, Result};
use crate::observer::{LeaderEvent, LeadershipObserver};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Last known leader, as published under the election key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderInfo {
    pub identity: String,
    pub is_live: bool,
}

/// Polls the coordination service for the current leader
pub struct LeaderWatcher {
    key: String,
    poll_interval: Duration,
    warmup: Duration,
    client: Arc<dyn CoordinationService>,
    info: Arc<watch::Sender<Option<LeaderInfo>>>,
    inner: Mutex<WatcherInner>,
}

#[derive(Default)]
struct WatcherInner {
    running: Option<RunningWatch>,
    events: Option<Dispatcher<LeaderEvent>>,
}

struct RunningWatch {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LeaderWatcher {
    pub fn new(settings: &ElectionSettings, client: Arc<dyn CoordinationService>) -> Self {
        let (info, _) = watch::channel(None);
        Self {
            key: settings.key().to_string(),
            poll_interval: settings.poll_interval(),
            warmup: settings.warmup(),
            client,
            info: Arc::new(info),
            inner: Mutex::new(WatcherInner::default()),
        }
    }

    /// Leader seen by the last successful poll
    pub fn leader_info(&self) -> Option<LeaderInfo> {
        self.info.borrow().clone()
    }

    /// Follow leader info updates
    pub fn subscribe(&self) -> watch::Receiver<Option<LeaderInfo>> {
        self.info.subscribe()
    }

    pub async fn is_watching(&self) -> bool {
        let inner = self.inner.lock().await;
        inner
            .running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Register `observer` and start polling after the warm-up delay.
    ///
    /// Fails with [`ElectionError::AlreadyWatching`] while polling.
    pub async fn watch_leader(&self, observer: impl LeadershipObserver + 'static) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if inner
            .running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
        {
            return Err(ElectionError::AlreadyWatching);
        }

        let observer: Arc<dyn LeadershipObserver> = Arc::new(observer);
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
        let poller = Poller {
            key: self.key.clone(),
            poll_interval: self.poll_interval,
            warmup: self.warmup,
            client: self.client.clone(),
            info: self.info.clone(),
            events,
            cancel: cancel.clone(),
        };

        tracing::info!(
            "Watching leader of {} every {:?} after {:?}",
            self.key,
            self.poll_interval,
            self.warmup
        );
        inner.running = Some(RunningWatch {
            cancel,
            task: tokio::spawn(poller.run()),
        });

        Ok(())
    }

    /// Stop polling; returns once the polling task has exited.
    /// A no-op when not watching.
    pub async fn stop_watching(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let Some(running) = inner.running.take() else {
            return Ok(());
        };

        running.cancel.cancel();
        let result = running.task.await;
        inner.events = None;

        result?;
        Ok(())
    }

    /// Send future poll notifications to `observer`. A no-op while not
    /// watching.
    pub async fn replace_observer(&self, observer: impl LeadershipObserver + 'static) {
        let inner = self.inner.lock().await;
        if let Some(events) = inner.events.as_ref() {
            events.replace(Arc::new(observer)).await;
        }
    }
}

impl Drop for LeaderWatcher {
    fn drop(&mut self) {
        if let Some(running) = self.inner.get_mut().running.as_ref() {
            running.cancel.cancel();
        }
    }
}

/// Turn one read into the notification sent to the observer
fn classify(key: &str, read: Result<Option<StoredValue>>) -> LeaderEvent {
    match read {
        Err(e) => LeaderEvent::failed(e),
        Ok(None) => LeaderEvent::failed(ElectionError::no_entry(key)),
        Ok(Some(stored)) => {
            let is_live = stored.has_active_holder();
            LeaderEvent::found(stored.value, is_live)
        }
    }
}

struct Poller {
    key: String,
    poll_interval: Duration,
    warmup: Duration,
    client: Arc<dyn CoordinationService>,
    info: Arc<watch::Sender<Option<LeaderInfo>>>,
    events: Dispatcher<LeaderEvent>,
    cancel: CancellationToken,
}

impl Poller {
    async fn run(self) {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            _ = tokio::time::sleep(self.warmup) => {}
        }

        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                read = self.client.read(&self.key, ReadConsistency::Consistent) => read,
            };

            let event = classify(&self.key, read);
            match &event.error {
                Some(e) => tracing::warn!("Leader poll for {} failed: {}", self.key, e),
                None => {
                    tracing::debug!(
                        "Leader of {} is {} (live: {})",
                        self.key,
                        event.identity,
                        event.is_live
                    );
                    self.info.send_replace(Some(LeaderInfo {
                        identity: event.identity.clone(),
                        is_live: event.is_live,
                    }));
                }
            }

            self.events.send(event);
        }

        tracing::info!("Leave received, stopped watching leader of {}", self.key);
    }
}
