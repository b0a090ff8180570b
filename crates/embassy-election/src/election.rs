//! Facade tying the candidacy controller and the leader watcher to one
//! election key and one coordination client

use crate::candidacy::{CandidacyState, ElectionController};
use crate::config::{ElectionConfig, ElectionSettings};
use crate::coordination::CoordinationService;
use crate::error::{ElectionError, Result};
use crate::observer::{ElectionObserver, LeadershipObserver};
use crate::watcher::{LeaderInfo, LeaderWatcher};
use std::sync::Arc;
use tokio::sync::watch;

/// Leader election for one key
pub struct Election {
    settings: ElectionSettings,
    controller: ElectionController,
    watcher: LeaderWatcher,
}

/// Builder for [`Election`]
#[derive(Default)]
pub struct ElectionBuilder {
    settings: Option<ElectionSettings>,
    config: Option<ElectionConfig>,
    client: Option<Arc<dyn CoordinationService>>,
}

impl ElectionBuilder {
    /// Use already-validated settings
    pub fn settings(mut self, settings: ElectionSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Use a raw configuration, validated by [`ElectionBuilder::build`]
    pub fn config(mut self, config: ElectionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Coordination service connection
    pub fn client(mut self, client: Arc<dyn CoordinationService>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<Election> {
        let settings = match (self.settings, self.config) {
            (Some(settings), _) => settings,
            (None, Some(config)) => ElectionSettings::from_config(&config)?,
            (None, None) => {
                return Err(ElectionError::configuration("No election settings provided"))
            }
        };

        let client = self.client.ok_or(ElectionError::NotConnected)?;

        Ok(Election::new(settings, client))
    }
}

impl Election {
    pub fn builder() -> ElectionBuilder {
        ElectionBuilder::default()
    }

    pub fn new(settings: ElectionSettings, client: Arc<dyn CoordinationService>) -> Self {
        let controller = ElectionController::new(&settings, client.clone());
        let watcher = LeaderWatcher::new(&settings, client);

        Self {
            settings,
            controller,
            watcher,
        }
    }

    pub fn settings(&self) -> &ElectionSettings {
        &self.settings
    }

    /// Start campaigning for leadership, see [`ElectionController::become_candidate`]
    pub async fn become_candidate(&self, observer: impl ElectionObserver + 'static) -> Result<()> {
        self.controller.become_candidate(observer).await
    }

    /// Stop campaigning, see [`ElectionController::step_down`]
    pub async fn step_down(&self) -> Result<()> {
        self.controller.step_down().await
    }

    /// Start polling for the leader, see [`LeaderWatcher::watch_leader`]
    pub async fn watch_leader(&self, observer: impl LeadershipObserver + 'static) -> Result<()> {
        self.watcher.watch_leader(observer).await
    }

    pub async fn stop_watching(&self) -> Result<()> {
        self.watcher.stop_watching().await
    }

    pub async fn replace_election_observer(&self, observer: impl ElectionObserver + 'static) {
        self.controller.replace_observer(observer).await
    }

    pub async fn replace_leadership_observer(&self, observer: impl LeadershipObserver + 'static) {
        self.watcher.replace_observer(observer).await
    }

    pub fn candidacy_state(&self) -> CandidacyState {
        self.controller.state()
    }

    pub fn subscribe_candidacy(&self) -> watch::Receiver<CandidacyState> {
        self.controller.subscribe()
    }

    /// Check if this node currently holds the election lock
    pub fn is_leader(&self) -> bool {
        self.controller.state() == CandidacyState::Elected
    }

    pub fn leader_info(&self) -> Option<LeaderInfo> {
        self.watcher.leader_info()
    }

    pub fn subscribe_leader_info(&self) -> watch::Receiver<Option<LeaderInfo>> {
        self.watcher.subscribe()
    }

    /// Stop both loops. Polling is always stopped; the step-down error wins
    /// when both fail.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down election for {}", self.settings.key());

        let watching = self.watcher.stop_watching().await;
        let candidacy = self.controller.step_down().await;

        candidacy.and(watching)
    }
}
