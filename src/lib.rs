//! farol - Realm Discovery and Selection
//!
//! Selects the best available "realm" (a catalyst server cluster) for a
//! connecting client out of a dynamic, partially trustworthy set of
//! candidates, combining cached state, explicit configuration and live
//! health probing.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and selection inputs
//! - [`probe`] - Health probing of individual servers
//! - [`gate`] - Semantic version gating of candidates
//! - [`scanner`] - Discovery fetch and parallel candidate probing
//! - [`cache`] - Durable, network-scoped realm/candidate cache
//! - [`selector`] - The priority-tier selection algorithm
//! - [`session`] - Committed realm state and collaborator events
//! - [`models`] - Core data structures and types
//!
//! # Example
//!
//! ```no_run
//! use farol::cache::{RealmCache, SqliteStorage};
//! use farol::config::Config;
//! use farol::selector::RealmSelector;
//! use farol::session::RealmSession;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let storage = Arc::new(SqliteStorage::open(&config.storage.sqlite_path)?);
//!     let session = RealmSession::new(
//!         config.network,
//!         RealmSelector::new(config.discovery.clone())?,
//!         RealmCache::new(storage),
//!     );
//!     let realm = session.initialize(&config.selection).await?;
//!     println!("joined realm {}", realm.domain);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod gate;
pub mod models;
pub mod probe;
pub mod scanner;
pub mod selector;
pub mod session;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{MemoryStorage, PersistentStorage, RealmCache, SqliteStorage};
    pub use crate::config::{Config, DiscoveryConfig, SelectionConfig};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{CacheEntry, Candidate, CandidateSet, NetworkIdentity, Realm};
    pub use crate::probe::{HealthProbe, ProbeReport};
    pub use crate::scanner::CandidateScanner;
    pub use crate::selector::{RealmSelector, SelectionOutcome, SelectionPath};
    pub use crate::session::{RealmEvent, RealmSession};
}

// Direct re-exports for convenience
pub use models::{Candidate, CandidateSet, NetworkIdentity, Realm};
