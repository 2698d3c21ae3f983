//! Store wrappers for exercising races and backend failures in tests.

use super::{CasOutcome, MemoryStore, RecordKey, SharedStore, StoreError, Versioned};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Pauses once, right after reading `key`, until the test releases it.
///
/// Lets a test slot another actor's writes between this actor's read and
/// its conditional write.
#[derive(Clone)]
pub struct GatedStore {
    inner: MemoryStore,
    key: RecordKey,
    armed: Arc<AtomicBool>,
    reached: Arc<Notify>,
    release: Arc<Notify>,
}

impl GatedStore {
    pub fn new(inner: MemoryStore, key: RecordKey) -> Self {
        Self {
            inner,
            key,
            armed: Arc::new(AtomicBool::new(false)),
            reached: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }

    /// Hold the next read of the key.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Resolves once the held read has happened.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

impl SharedStore for GatedStore {
    async fn get(&self, key: &str) -> Result<Versioned, StoreError> {
        let read = self.inner.get(key).await?;
        if key == self.key.as_str() && self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.release.notified().await;
        }
        Ok(read)
    }

    async fn put(&self, key: &str, value: Option<String>) -> Result<u64, StoreError> {
        self.inner.put(key, value).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: u64,
        value: Option<String>,
    ) -> Result<CasOutcome, StoreError> {
        self.inner.compare_and_swap(key, expected, value).await
    }
}

/// Fails the next `n` writes to `key` as a dropped backend connection would.
#[derive(Clone)]
pub struct FlakyStore {
    inner: MemoryStore,
    key: RecordKey,
    failures: Arc<AtomicU32>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore, key: RecordKey) -> Self {
        Self {
            inner,
            key,
            failures: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    fn trip(&self, key: &str) -> Result<(), StoreError> {
        if key != self.key.as_str() {
            return Ok(());
        }
        let tripped = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(StoreError::Redis("connection reset".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SharedStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Versioned, StoreError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Option<String>) -> Result<u64, StoreError> {
        self.trip(key)?;
        self.inner.put(key, value).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: u64,
        value: Option<String>,
    ) -> Result<CasOutcome, StoreError> {
        self.trip(key)?;
        self.inner.compare_and_swap(key, expected, value).await
    }
}
