use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use exam_core::model::{PersistedSnapshot, QuestionId};

/// Errors surfaced by persistence adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable store for the session snapshot, surviving page reloads.
///
/// Writes are per key, mirroring how the session mutates: the timer writes
/// `remaining_time` every tick, answer capture rewrites `answers`, the
/// reporter writes `violations`. `clear` removes all three together; that is
/// the only way any of them is ever removed.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist the remaining countdown seconds (may be the `-1` sentinel).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be stored.
    async fn save_remaining(&self, seconds: i64) -> Result<(), StorageError>;

    /// Persist the full answer map.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the map cannot be stored.
    async fn save_answers(
        &self,
        answers: &BTreeMap<QuestionId, String>,
    ) -> Result<(), StorageError>;

    /// Persist the local violation count.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be stored.
    async fn save_violations(&self, count: u32) -> Result<(), StorageError>;

    /// Read back whatever keys survive from a previous load of the page.
    /// An empty snapshot means a first load.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    async fn load(&self) -> Result<PersistedSnapshot, StorageError>;

    /// Remove all persisted keys. Called exactly once, at finalization.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the keys cannot be removed.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// In-memory store for tests and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<PersistedSnapshot>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store, simulating state left behind by an earlier
    /// load of the page.
    #[must_use]
    pub fn seeded(snapshot: PersistedSnapshot) -> Self {
        Self {
            inner: Arc::new(Mutex::new(snapshot)),
        }
    }
}

#[async_trait]
impl SnapshotStore for InMemoryStore {
    async fn save_remaining(&self, seconds: i64) -> Result<(), StorageError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remaining_seconds = Some(seconds);
        Ok(())
    }

    async fn save_answers(
        &self,
        answers: &BTreeMap<QuestionId, String>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.answers = Some(answers.clone());
        Ok(())
    }

    async fn save_violations(&self, count: u32) -> Result<(), StorageError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.violation_count = Some(count);
        Ok(())
    }

    async fn load(&self) -> Result<PersistedSnapshot, StorageError> {
        let guard = self
            .inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.clone())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = PersistedSnapshot::default();
        Ok(())
    }
}
