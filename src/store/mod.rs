//! Shared Store
//!
//! A last-writer-wins key-value medium visible to every actor on the host.
//! Each key carries a version stamp so writers can detect that another actor
//! got there first; the typed read-modify-write loop lives in [`SyncContext`].

pub mod memory;
pub mod redis_store;
mod sync;
#[cfg(test)]
pub mod testing;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use sync::{Mutation, SyncContext};

use crate::bus::Topic;
use crate::config::{StoreConfig, StoreKind};
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Write contention on {key}: gave up after {attempts} attempts")]
    Contention { key: String, attempts: u32 },

    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Redis(err.to_string())
    }
}

/// Raw value of a key together with its version stamp.
///
/// A key that was never written reads as version 0 with no value. Clearing a
/// key bumps the version and drops the value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Versioned {
    pub version: u64,
    pub value: Option<String>,
}

impl Versioned {
    pub fn absent() -> Self {
        Self::default()
    }
}

/// Result of a conditional write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// Write applied; carries the new version.
    Committed(u64),
    /// Another writer moved the key; carries the version actually found.
    Conflict(u64),
}

/// Contract every store backend fulfils.
///
/// Implementations are cheap-to-clone handles onto one shared medium.
pub trait SharedStore: Clone + Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Result<Versioned, StoreError>> + Send;

    /// Unconditional write; the latest write wins. `None` clears the key.
    fn put(
        &self,
        key: &str,
        value: Option<String>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Write only if the key is still at `expected` version.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: u64,
        value: Option<String>,
    ) -> impl Future<Output = Result<CasOutcome, StoreError>> + Send;
}

/// Persisted record types, one key each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKey {
    Players,
    Queue,
    Match,
    Upcoming,
    Round,
}

impl RecordKey {
    pub const ALL: [RecordKey; 5] = [
        RecordKey::Players,
        RecordKey::Queue,
        RecordKey::Match,
        RecordKey::Upcoming,
        RecordKey::Round,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKey::Players => "rps_players_v1",
            RecordKey::Queue => "rps_queue_v1",
            RecordKey::Match => "rps_match_v1",
            RecordKey::Upcoming => "rps_upcoming_v1",
            RecordKey::Round => "rps_round_v1",
        }
    }

    /// Notification topic announced after a write to this key
    pub fn topic(&self) -> Topic {
        match self {
            RecordKey::Players => Topic::Players,
            RecordKey::Queue => Topic::Queue,
            RecordKey::Match => Topic::Match,
            RecordKey::Upcoming => Topic::Upcoming,
            RecordKey::Round => Topic::Round,
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend chosen at start-up from `STORE_BACKEND`.
#[derive(Clone)]
pub enum StoreBackend {
    Memory(MemoryStore),
    Redis(RedisStore),
}

impl StoreBackend {
    pub async fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        match config.kind {
            StoreKind::Memory => Ok(StoreBackend::Memory(MemoryStore::new())),
            StoreKind::Redis => Ok(StoreBackend::Redis(
                RedisStore::connect(&config.redis_url).await?,
            )),
        }
    }

    pub fn kind(&self) -> StoreKind {
        match self {
            StoreBackend::Memory(_) => StoreKind::Memory,
            StoreBackend::Redis(_) => StoreKind::Redis,
        }
    }
}

impl SharedStore for StoreBackend {
    async fn get(&self, key: &str) -> Result<Versioned, StoreError> {
        match self {
            StoreBackend::Memory(store) => store.get(key).await,
            StoreBackend::Redis(store) => store.get(key).await,
        }
    }

    async fn put(&self, key: &str, value: Option<String>) -> Result<u64, StoreError> {
        match self {
            StoreBackend::Memory(store) => store.put(key, value).await,
            StoreBackend::Redis(store) => store.put(key, value).await,
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: u64,
        value: Option<String>,
    ) -> Result<CasOutcome, StoreError> {
        match self {
            StoreBackend::Memory(store) => store.compare_and_swap(key, expected, value).await,
            StoreBackend::Redis(store) => store.compare_and_swap(key, expected, value).await,
        }
    }
}
