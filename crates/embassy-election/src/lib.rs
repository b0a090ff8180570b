//! Embassy Leader Election
//!
//! This crate provides client-side leader election on top of a distributed
//! coordination service offering session-backed locks and consistent reads.
//!
//! Two independent loops do the work:
//!
//! - **Candidacy** ([`ElectionController`]): acquires the election lock,
//!   notices when it is lost, and keeps retrying after failures.
//! - **Leader watch** ([`LeaderWatcher`]): polls the election key for the
//!   identity of the current leader.
//!
//! [`Election`] bundles both for one key and one [`CoordinationService`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use embassy_election::{Election, ElectionConfig, MemoryCoordinator};
//! use tokio::sync::mpsc;
//!
//! let election = Election::builder()
//!     .config(ElectionConfig::default())
//!     .client(Arc::new(MemoryCoordinator::new("node-a")))
//!     .build()?;
//!
//! let (tx, mut events) = mpsc::unbounded_channel();
//! election.become_candidate(tx).await?;
//!
//! // ... later
//! election.step_down().await?;
//! ```

pub mod candidacy;
pub mod config;
pub mod coordination;
mod dispatch;
pub mod election;
pub mod error;
pub mod memory;
pub mod observer;
pub mod watcher;

pub use candidacy::{CandidacyState, ElectionController};
pub use config::{parse_duration, ElectionConfig, ElectionSettings};
pub use coordination::{
    AcquiredLock, CoordinationService, LockHandle, ReadConsistency, Revocation, StoredValue,
};
pub use election::{Election, ElectionBuilder};
pub use error::{ElectionError, Result};
pub use memory::MemoryCoordinator;
pub use observer::{ElectionEvent, ElectionObserver, LeaderEvent, LeadershipObserver};
pub use watcher::{LeaderInfo, LeaderWatcher};
