//! Leader election demonstration
//!
//! Two candidates and a watcher share one in-memory coordination backend.
//! The leader's session is expired halfway through to show failover.

use async_trait::async_trait;
use embassy_election::{
    Election, ElectionConfig, ElectionError, ElectionObserver, LeadershipObserver,
    MemoryCoordinator, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

struct LoggingCandidate {
    name: String,
}

#[async_trait]
impl ElectionObserver for LoggingCandidate {
    async fn got_elected(&self, result: Result<()>) {
        match result {
            Ok(()) => tracing::info!("{} is now the leader", self.name),
            Err(e) => tracing::warn!("{} failed to get elected: {}", self.name, e),
        }
    }

    async fn lost_master(&self, _result: Result<()>) {
        tracing::warn!("{} lost leadership", self.name);
    }
}

struct LoggingWatcher;

#[async_trait]
impl LeadershipObserver for LoggingWatcher {
    async fn leader_info(&self, identity: String, is_live: bool, error: Option<ElectionError>) {
        match error {
            Some(e) => tracing::warn!("Leader poll failed: {}", e),
            None => tracing::info!("Leader: {} (live: {})", identity, is_live),
        }
    }
}

fn create_election(backend: &MemoryCoordinator, name: &str) -> anyhow::Result<Election> {
    let config = ElectionConfig {
        key: "service/demo/leader".to_string(),
        poll_interval: "500ms".to_string(),
        retry_interval: "1s".to_string(),
        warmup: "0".to_string(),
    };

    Ok(Election::builder()
        .config(config)
        .client(Arc::new(backend.for_node(name)))
        .build()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,embassy_election=debug".into()),
        )
        .init();

    let backend = MemoryCoordinator::new("backend");
    let node_1 = create_election(&backend, "node-1")?;
    let node_2 = create_election(&backend, "node-2")?;

    node_1
        .become_candidate(LoggingCandidate {
            name: "node-1".to_string(),
        })
        .await?;
    sleep(Duration::from_millis(200)).await;
    node_2
        .become_candidate(LoggingCandidate {
            name: "node-2".to_string(),
        })
        .await?;
    node_2.watch_leader(LoggingWatcher).await?;

    sleep(Duration::from_secs(2)).await;

    if let Some(session) = backend.invalidate_holder("service/demo/leader").await {
        tracing::info!("Expired leader session {}", session);
    }

    sleep(Duration::from_secs(2)).await;

    node_1.shutdown().await?;
    node_2.shutdown().await?;
    tracing::info!("Demo finished");

    Ok(())
}
