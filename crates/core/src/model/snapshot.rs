use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::ids::QuestionId;

/// Durable projection of the session state, read once at startup.
///
/// Each field maps to one persisted key (`remaining_time`, `answers`,
/// `violations`). Fields are optional because the keys are written
/// independently on mutation, so a reload can observe any subset; missing
/// keys fall back to first-load defaults when the state is rebuilt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub remaining_seconds: Option<i64>,
    pub answers: Option<BTreeMap<QuestionId, String>>,
    pub violation_count: Option<u32>,
}

impl PersistedSnapshot {
    /// True when no key is present, i.e. a first load.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining_seconds.is_none() && self.answers.is_none() && self.violation_count.is_none()
    }
}
