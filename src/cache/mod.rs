//! Durable cache of the last selected realm and candidate set
//!
//! Storage is a plain key/value interface behind a trait so tests can swap
//! the SQLite backend for an in-memory one. The realm and the candidate list
//! live under separate, network-scoped keys and are written independently;
//! a missing key reads back as an empty value, never an error.
//!
//! Writes are awaited to completion before returning - the committed realm
//! must be durable before the process can be assumed to exit, so there is no
//! in-memory write buffering.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::models::{CacheEntry, Candidate, NetworkIdentity, Realm};

/// Storage-level errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage lock poisoned")]
    Poisoned,
}

// ============================================================================
// Storage Trait
// ============================================================================

/// Durable key/value storage
///
/// `get` of a missing key returns `None`; `set` must be durable by the time
/// it resolves.
#[async_trait]
pub trait PersistentStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

// ============================================================================
// SQLite Backend
// ============================================================================

/// SQLite-backed key/value storage
///
/// A single table, single connection behind a mutex; the cache sees a
/// handful of writes per session so contention is not a concern.
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-process database that vanishes on drop
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl PersistentStorage for SqliteStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

// ============================================================================
// In-Memory Backend
// ============================================================================

/// In-memory storage for tests and throwaway sessions
#[derive(Default)]
pub struct MemoryStorage {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently present, for assertions in tests
    pub fn keys(&self) -> Vec<String> {
        self.map
            .lock()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PersistentStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let map = self.map.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.map.lock().map_err(|_| StorageError::Poisoned)?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ============================================================================
// Realm Cache
// ============================================================================

/// Network-scoped cache of the last realm and last candidate set
#[derive(Clone)]
pub struct RealmCache {
    storage: Arc<dyn PersistentStorage>,
}

impl RealmCache {
    pub fn new(storage: Arc<dyn PersistentStorage>) -> Self {
        Self { storage }
    }

    fn realm_key(network: NetworkIdentity) -> String {
        format!("last_realm_{network}")
    }

    fn candidates_key(network: NetworkIdentity) -> String {
        format!("last_realm_candidates_{network}")
    }

    /// Load everything the cache knows about one network
    ///
    /// Missing keys yield the empty entry; a value that no longer parses is
    /// treated as a miss so a cache from an older build cannot wedge startup.
    pub async fn load(&self, network: NetworkIdentity) -> Result<CacheEntry, StorageError> {
        let realm = match self.storage.get(&Self::realm_key(network)).await? {
            Some(raw) => match serde_json::from_str::<Realm>(&raw) {
                Ok(realm) => Some(realm),
                Err(e) => {
                    tracing::warn!(network = %network, error = %e, "discarding corrupt cached realm");
                    None
                }
            },
            None => None,
        };

        let candidates = match self.storage.get(&Self::candidates_key(network)).await? {
            Some(raw) => match serde_json::from_str::<Vec<Candidate>>(&raw) {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::warn!(network = %network, error = %e, "discarding corrupt cached candidates");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        Ok(CacheEntry {
            network,
            realm,
            candidates,
        })
    }

    /// Persist the committed realm for this network
    pub async fn save_realm(
        &self,
        network: NetworkIdentity,
        realm: &Realm,
    ) -> Result<(), StorageError> {
        let raw = serde_json::to_string(realm)?;
        self.storage.set(&Self::realm_key(network), &raw).await?;
        tracing::debug!(network = %network, domain = %realm.domain, "cached realm");
        Ok(())
    }

    /// Persist the current full candidate list for this network
    pub async fn save_candidates(
        &self,
        network: NetworkIdentity,
        candidates: &[Candidate],
    ) -> Result<(), StorageError> {
        let raw = serde_json::to_string(candidates)?;
        self.storage
            .set(&Self::candidates_key(network), &raw)
            .await?;
        tracing::debug!(network = %network, count = candidates.len(), "cached candidates");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
