use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::collections::BTreeMap;

use exam_core::model::{PersistedSnapshot, QuestionId};

use super::SqliteStore;
use crate::repository::{SnapshotStore, StorageError};

const KEY_REMAINING: &str = "remaining_time";
const KEY_ANSWERS: &str = "answers";
const KEY_VIOLATIONS: &str = "violations";

impl SqliteStore {
    async fn upsert(&self, key: &str, value: String) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO exam_state (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn save_remaining(&self, seconds: i64) -> Result<(), StorageError> {
        self.upsert(KEY_REMAINING, seconds.to_string()).await
    }

    async fn save_answers(
        &self,
        answers: &BTreeMap<QuestionId, String>,
    ) -> Result<(), StorageError> {
        let json = serde_json::to_string(answers)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        self.upsert(KEY_ANSWERS, json).await
    }

    async fn save_violations(&self, count: u32) -> Result<(), StorageError> {
        self.upsert(KEY_VIOLATIONS, count.to_string()).await
    }

    async fn load(&self) -> Result<PersistedSnapshot, StorageError> {
        let rows = sqlx::query("SELECT key, value FROM exam_state")
            .fetch_all(self.pool())
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;

        let mut snapshot = PersistedSnapshot::default();
        for row in rows {
            let key: String = row
                .try_get("key")
                .map_err(|err| StorageError::Serialization(err.to_string()))?;
            let value: String = row
                .try_get("value")
                .map_err(|err| StorageError::Serialization(err.to_string()))?;
            match key.as_str() {
                KEY_REMAINING => {
                    let seconds = value
                        .parse::<i64>()
                        .map_err(|err| StorageError::Serialization(err.to_string()))?;
                    snapshot.remaining_seconds = Some(seconds);
                }
                KEY_ANSWERS => {
                    let answers: BTreeMap<QuestionId, String> = serde_json::from_str(&value)
                        .map_err(|err| StorageError::Serialization(err.to_string()))?;
                    snapshot.answers = Some(answers);
                }
                KEY_VIOLATIONS => {
                    let count = value
                        .parse::<u32>()
                        .map_err(|err| StorageError::Serialization(err.to_string()))?;
                    snapshot.violation_count = Some(count);
                }
                // Unknown keys are left alone; a newer schema may own them.
                _ => {}
            }
        }
        Ok(snapshot)
    }

    async fn clear(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM exam_state WHERE key IN (?1, ?2, ?3)")
            .bind(KEY_REMAINING)
            .bind(KEY_ANSWERS)
            .bind(KEY_VIOLATIONS)
            .execute(self.pool())
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(())
    }
}
