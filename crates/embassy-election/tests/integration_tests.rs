//! Integration tests for elections between several nodes sharing one
//! coordination backend

use embassy_election::{
    CandidacyState, Election, ElectionConfig, ElectionError, ElectionEvent, ElectionSettings,
    LeaderEvent, LeaderInfo, MemoryCoordinator,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

const KEY: &str = "service/integration/leader";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn settings() -> ElectionSettings {
    ElectionSettings::new(KEY, Duration::from_millis(50), Duration::from_millis(100))
        .unwrap()
        .with_warmup(Duration::ZERO)
}

fn node(backend: &MemoryCoordinator, name: &str) -> Election {
    Election::builder()
        .settings(settings())
        .client(Arc::new(backend.for_node(name)))
        .build()
        .unwrap()
}

async fn next_event<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("observer channel closed")
}

async fn wait_for_state(election: &Election, want: CandidacyState) {
    let mut rx = election.subscribe_candidacy();
    timeout(Duration::from_secs(5), rx.wait_for(|state| *state == want))
        .await
        .expect("timed out waiting for candidacy state")
        .unwrap();
}

/// Test that stepping down hands leadership to the waiting node
#[tokio::test]
async fn test_step_down_hands_over_leadership() {
    init_tracing();
    let backend = MemoryCoordinator::new("backend");
    let node_a = node(&backend, "node-a");
    let node_b = node(&backend, "node-b");

    let (a_tx, mut a_rx) = mpsc::unbounded_channel();
    node_a.become_candidate(a_tx).await.unwrap();
    assert_eq!(next_event(&mut a_rx).await, ElectionEvent::GotElected(Ok(())));

    let (b_tx, mut b_rx) = mpsc::unbounded_channel();
    node_b.become_candidate(b_tx).await.unwrap();
    wait_for_state(&node_b, CandidacyState::Acquiring).await;
    assert!(node_a.is_leader());
    assert!(!node_b.is_leader());

    node_a.step_down().await.unwrap();
    assert_eq!(node_a.candidacy_state(), CandidacyState::Idle);

    assert_eq!(next_event(&mut b_rx).await, ElectionEvent::GotElected(Ok(())));
    assert!(node_b.is_leader());

    node_b.shutdown().await.unwrap();
    assert!(backend.holder(KEY).await.is_none());
}

/// Test that the watcher follows the published leader across a handover
#[tokio::test]
async fn test_watcher_tracks_leader() {
    init_tracing();
    let backend = MemoryCoordinator::new("backend");
    let node_a = node(&backend, "node-a");
    let observer = node(&backend, "observer");

    let (a_tx, mut a_rx) = mpsc::unbounded_channel();
    node_a.become_candidate(a_tx).await.unwrap();
    assert_eq!(next_event(&mut a_rx).await, ElectionEvent::GotElected(Ok(())));

    let (tx, mut rx) = mpsc::unbounded_channel::<LeaderEvent>();
    observer.watch_leader(tx).await.unwrap();
    assert_eq!(next_event(&mut rx).await, LeaderEvent::found("node-a", true));
    assert_eq!(
        observer.leader_info(),
        Some(LeaderInfo {
            identity: "node-a".to_string(),
            is_live: true,
        })
    );

    // Released: the value stays, nobody backs it.
    node_a.step_down().await.unwrap();
    let mut info = observer.subscribe_leader_info();
    timeout(
        Duration::from_secs(5),
        info.wait_for(|info| info.as_ref().is_some_and(|i| !i.is_live)),
    )
    .await
    .unwrap()
    .unwrap();

    observer.stop_watching().await.unwrap();
}

/// Test that a missing election key is reported without stopping the watch
#[tokio::test]
async fn test_watcher_reports_missing_key() {
    init_tracing();
    let backend = MemoryCoordinator::new("backend");
    let observer = node(&backend, "observer");

    let (tx, mut rx) = mpsc::unbounded_channel::<LeaderEvent>();
    observer.watch_leader(tx).await.unwrap();

    let event = next_event(&mut rx).await;
    assert_eq!(event.error, Some(ElectionError::no_entry(KEY)));
    assert!(observer.leader_info().is_none());

    backend.put(KEY, "manual").await;
    loop {
        let event = next_event(&mut rx).await;
        if event.error.is_none() {
            assert_eq!(event, LeaderEvent::found("manual", false));
            break;
        }
    }

    observer.stop_watching().await.unwrap();
}

/// Test that session expiry never leaves two leaders
#[tokio::test]
async fn test_session_expiry_single_leader() {
    init_tracing();
    let backend = MemoryCoordinator::new("backend");
    let node_a = node(&backend, "node-a");
    let node_b = node(&backend, "node-b");

    let (a_tx, mut a_rx) = mpsc::unbounded_channel();
    node_a.become_candidate(a_tx).await.unwrap();
    assert_eq!(next_event(&mut a_rx).await, ElectionEvent::GotElected(Ok(())));

    let (b_tx, _b_rx) = mpsc::unbounded_channel();
    node_b.become_candidate(b_tx).await.unwrap();
    wait_for_state(&node_b, CandidacyState::Acquiring).await;

    backend.invalidate_holder(KEY).await.unwrap();
    assert_eq!(next_event(&mut a_rx).await, ElectionEvent::LostMaster(Ok(())));

    // Someone takes over; never both.
    timeout(Duration::from_secs(5), async {
        while backend.holder(KEY).await.is_none() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    sleep(Duration::from_millis(100)).await;
    assert!(!(node_a.is_leader() && node_b.is_leader()));
    assert!(node_a.is_leader() || node_b.is_leader());

    node_a.shutdown().await.unwrap();
    node_b.shutdown().await.unwrap();
    assert!(backend.holder(KEY).await.is_none());
}

/// Test that no observer calls arrive after shutdown returns
#[tokio::test]
async fn test_shutdown_is_quiet() {
    init_tracing();
    let backend = MemoryCoordinator::new("backend");
    let election = node(&backend, "node-a");

    let (tx, mut rx) = mpsc::unbounded_channel();
    election.become_candidate(tx).await.unwrap();
    let (leader_tx, mut leader_rx) = mpsc::unbounded_channel::<LeaderEvent>();
    election.watch_leader(leader_tx).await.unwrap();

    assert_eq!(next_event(&mut rx).await, ElectionEvent::GotElected(Ok(())));
    next_event(&mut leader_rx).await;

    election.shutdown().await.unwrap();
    assert_eq!(election.candidacy_state(), CandidacyState::Idle);

    sleep(Duration::from_millis(20)).await;
    while leader_rx.try_recv().is_ok() {}
    sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err());
    assert!(leader_rx.try_recv().is_err());
}

/// Test building an election straight from a TOML document
#[tokio::test]
async fn test_election_from_toml() {
    let config = ElectionConfig::from_toml(
        r#"
        key = "service/integration/leader"
        poll_interval = "50ms"
        retry_interval = "100ms"
        warmup = "0"
        "#,
    )
    .unwrap();

    let election = Election::builder()
        .config(config)
        .client(Arc::new(MemoryCoordinator::new("node-a")))
        .build()
        .unwrap();
    assert_eq!(election.settings(), &settings());

    let (tx, mut rx) = mpsc::unbounded_channel();
    election.become_candidate(tx).await.unwrap();
    assert_eq!(next_event(&mut rx).await, ElectionEvent::GotElected(Ok(())));
    election.step_down().await.unwrap();
}
