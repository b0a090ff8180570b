//! Observer contracts and the events delivered to them

use crate::error::{ElectionError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receives candidacy lifecycle notifications
#[async_trait]
pub trait ElectionObserver: Send + Sync {
    /// An acquisition attempt finished: `Ok` when this node became leader,
    /// `Err` when the attempt failed and a retry has been scheduled
    async fn got_elected(&self, result: Result<()>);

    /// A held lock was lost
    async fn lost_master(&self, result: Result<()>);
}

/// Receives the outcome of every leader-identity poll
#[async_trait]
pub trait LeadershipObserver: Send + Sync {
    async fn leader_info(&self, identity: String, is_live: bool, error: Option<ElectionError>);
}

/// Candidacy notification, as queued for an [`ElectionObserver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionEvent {
    GotElected(Result<()>),
    LostMaster(Result<()>),
}

/// Leader poll outcome, as queued for a [`LeadershipObserver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderEvent {
    pub identity: String,
    pub is_live: bool,
    pub error: Option<ElectionError>,
}

impl LeaderEvent {
    pub fn failed(error: ElectionError) -> Self {
        Self {
            identity: String::new(),
            is_live: false,
            error: Some(error),
        }
    }

    pub fn found(identity: impl Into<String>, is_live: bool) -> Self {
        Self {
            identity: identity.into(),
            is_live,
            error: None,
        }
    }
}

#[async_trait]
impl<T: ElectionObserver + ?Sized> ElectionObserver for Arc<T> {
    async fn got_elected(&self, result: Result<()>) {
        (**self).got_elected(result).await
    }

    async fn lost_master(&self, result: Result<()>) {
        (**self).lost_master(result).await
    }
}

#[async_trait]
impl<T: LeadershipObserver + ?Sized> LeadershipObserver for Arc<T> {
    async fn leader_info(&self, identity: String, is_live: bool, error: Option<ElectionError>) {
        (**self).leader_info(identity, is_live, error).await
    }
}

/// Forward candidacy events into a channel
#[async_trait]
impl ElectionObserver for mpsc::UnboundedSender<ElectionEvent> {
    async fn got_elected(&self, result: Result<()>) {
        let _ = self.send(ElectionEvent::GotElected(result));
    }

    async fn lost_master(&self, result: Result<()>) {
        let _ = self.send(ElectionEvent::LostMaster(result));
    }
}

/// Forward leader poll outcomes into a channel
#[async_trait]
impl LeadershipObserver for mpsc::UnboundedSender<LeaderEvent> {
    async fn leader_info(&self, identity: String, is_live: bool, error: Option<ElectionError>) {
        let _ = self.send(LeaderEvent {
            identity,
            is_live,
            error,
        });
    }
}
