//! Ordered, non-blocking delivery of observer notifications
//!
//! Each candidacy and each watch owns one queue drained by a single task, so
//! the background loops never wait on an observer and notifications arrive
//! in the order they were emitted.

use crate::observer::{ElectionEvent, ElectionObserver, LeaderEvent, LeadershipObserver};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// A notification that knows how to reach its observer
#[async_trait]
pub(crate) trait Notification: Send + 'static {
    type Observer: ?Sized + Send + Sync + 'static;

    async fn deliver(self, observer: &Self::Observer);
}

#[async_trait]
impl Notification for ElectionEvent {
    type Observer = dyn ElectionObserver;

    async fn deliver(self, observer: &Self::Observer) {
        match self {
            ElectionEvent::GotElected(result) => observer.got_elected(result).await,
            ElectionEvent::LostMaster(result) => observer.lost_master(result).await,
        }
    }
}

#[async_trait]
impl Notification for LeaderEvent {
    type Observer = dyn LeadershipObserver;

    async fn deliver(self, observer: &Self::Observer) {
        observer
            .leader_info(self.identity, self.is_live, self.error)
            .await
    }
}

/// Single-consumer notification queue with a swappable observer
pub(crate) struct Dispatcher<E: Notification> {
    tx: mpsc::UnboundedSender<E>,
    observer: Arc<RwLock<Arc<E::Observer>>>,
}

impl<E: Notification> Clone for Dispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            observer: self.observer.clone(),
        }
    }
}

impl<E: Notification> Dispatcher<E> {
    /// Start the delivery task. It exits once every handle is dropped and
    /// the queue is drained.
    pub(crate) fn spawn(observer: Arc<E::Observer>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<E>();
        let observer = Arc::new(RwLock::new(observer));
        let current = observer.clone();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                // Resolve the target per event so a swap applies to
                // everything still queued.
                let target = current.read().await.clone();
                event.deliver(target.as_ref()).await;
            }
        });

        Self { tx, observer }
    }

    pub(crate) fn send(&self, event: E) {
        if self.tx.send(event).is_err() {
            tracing::warn!("Observer delivery task has stopped, notification dropped");
        }
    }

    pub(crate) async fn replace(&self, observer: Arc<E::Observer>) {
        *self.observer.write().await = observer;
    }
}
