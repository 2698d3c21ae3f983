use super::{CasOutcome, RecordKey, SharedStore, StoreError};
use crate::bus::{ActorId, NotificationBus};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

/// What a read-modify-write step wants done with the record it was handed.
#[derive(Debug)]
pub enum Mutation<T, R> {
    /// Leave the record as it is; nothing is written or announced.
    Keep(R),
    /// Replace the record.
    Put(T, R),
    /// Remove the record.
    Clear(R),
}

/// One actor's handle onto the shared store and notification bus.
///
/// Every engine writes through [`SyncContext::modify`]: it re-reads and
/// re-applies the step whenever another actor committed in between, so a
/// contested write is admitted exactly once.
#[derive(Clone)]
pub struct SyncContext<S> {
    store: S,
    bus: NotificationBus,
    actor: ActorId,
    max_attempts: u32,
}

impl<S: SharedStore> SyncContext<S> {
    pub fn new(store: S, bus: NotificationBus, max_attempts: u32) -> Self {
        Self {
            store,
            bus,
            actor: ActorId::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current value of a record; undecodable values read as absent.
    pub async fn read<T: DeserializeOwned>(&self, key: RecordKey) -> Result<Option<T>, StoreError> {
        Ok(self.read_versioned(key).await?.1)
    }

    async fn read_versioned<T: DeserializeOwned>(
        &self,
        key: RecordKey,
    ) -> Result<(u64, Option<T>), StoreError> {
        let raw = self.store.get(key.as_str()).await?;
        let value = raw.value.as_deref().and_then(|json| decode(key, json));
        Ok((raw.version, value))
    }

    /// Read-modify-write `key` with optimistic concurrency.
    ///
    /// `step` may run several times; only the result of the attempt that
    /// committed (or decided to keep the record) is returned.
    pub async fn modify<T, R, F>(&self, key: RecordKey, mut step: F) -> Result<R, StoreError>
    where
        T: Serialize + DeserializeOwned + Send,
        R: Send,
        F: FnMut(Option<T>) -> Mutation<T, R> + Send,
    {
        for attempt in 1..=self.max_attempts {
            let (version, current) = self.read_versioned::<T>(key).await?;

            let (next, result) = match step(current) {
                Mutation::Keep(result) => return Ok(result),
                Mutation::Put(value, result) => (Some(serde_json::to_string(&value)?), result),
                Mutation::Clear(result) => (None, result),
            };

            match self.store.compare_and_swap(key.as_str(), version, next).await? {
                CasOutcome::Committed(version) => {
                    debug!(key = %key, version, actor = %self.actor, "Record committed");
                    self.bus.publish(key.topic(), self.actor);
                    return Ok(result);
                }
                CasOutcome::Conflict(found) => {
                    debug!(
                        key = %key,
                        expected = version,
                        found,
                        attempt,
                        "Concurrent write detected, retrying"
                    );
                }
            }
        }

        warn!(key = %key, attempts = self.max_attempts, "Giving up on contested record");
        Err(StoreError::Contention {
            key: key.as_str().to_string(),
            attempts: self.max_attempts,
        })
    }
}

fn decode<T: DeserializeOwned>(key: RecordKey, json: &str) -> Option<T> {
    match serde_json::from_str(json) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = %key, error = %e, "Discarding undecodable record");
            None
        }
    }
}
