use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::ExamConfig;
use crate::model::ids::QuestionId;
use crate::model::snapshot::PersistedSnapshot;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("session already submitted")]
    AlreadySubmitted,
}

/// Terminal-state marker for the whole session.
///
/// "Blocked" is user-facing messaging, not a state: a violation block and a
/// voluntary submission converge on the same finalization, so the machine
/// has exactly one transition, `Active → Submitted`, and it fires once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Submitted,
}

/// The single per-page session state: countdown, answer map, and the local
/// violation counter that stands in when the server is unreachable.
///
/// All mutators are guarded on `SessionStatus::Active`; after finalization
/// no mutation is observable. The guard, not timer cancellation, is what
/// makes repeated timer firings safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    remaining_seconds: i64,
    answers: BTreeMap<QuestionId, String>,
    violation_count: u32,
    status: SessionStatus,
}

impl SessionState {
    /// Fresh session at full duration, no answers, no violations.
    #[must_use]
    pub fn fresh(config: &ExamConfig) -> Self {
        Self {
            remaining_seconds: config.total_seconds(),
            answers: BTreeMap::new(),
            violation_count: 0,
            status: SessionStatus::Active,
        }
    }

    /// Rebuild the session after a reload, falling back to first-load
    /// defaults for any key the snapshot is missing.
    #[must_use]
    pub fn restore(config: &ExamConfig, snapshot: PersistedSnapshot) -> Self {
        Self {
            remaining_seconds: snapshot
                .remaining_seconds
                .unwrap_or_else(|| config.total_seconds()),
            answers: snapshot.answers.unwrap_or_default(),
            violation_count: snapshot.violation_count.unwrap_or(0),
            status: SessionStatus::Active,
        }
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> i64 {
        self.remaining_seconds
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, String> {
        &self.answers
    }

    #[must_use]
    pub fn violation_count(&self) -> u32 {
        self.violation_count
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// One countdown tick: decrement and return the new remaining value.
    ///
    /// Returns `None` once the session is no longer active, so a timer that
    /// keeps firing after finalization observes nothing. The value may reach
    /// `-1`, the "expired, finalize" sentinel; `0` is still a live second.
    pub fn tick_down(&mut self) -> Option<i64> {
        if !self.is_active() {
            return None;
        }
        self.remaining_seconds -= 1;
        Some(self.remaining_seconds)
    }

    /// Record the selected option for a question, last write wins.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::AlreadySubmitted` after finalization.
    pub fn record_answer(
        &mut self,
        question: QuestionId,
        value: String,
    ) -> Result<(), SessionStateError> {
        if !self.is_active() {
            return Err(SessionStateError::AlreadySubmitted);
        }
        self.answers.insert(question, value);
        Ok(())
    }

    /// Bump the local violation counter and return the new count.
    ///
    /// The counter is monotonic; nothing in the session ever lowers it, and
    /// an authoritative server count is never written back into it.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::AlreadySubmitted` after finalization.
    pub fn record_violation(&mut self) -> Result<u32, SessionStateError> {
        if !self.is_active() {
            return Err(SessionStateError::AlreadySubmitted);
        }
        self.violation_count += 1;
        Ok(self.violation_count)
    }

    /// Take the one-way transition to `Submitted`.
    ///
    /// First call returns the final answer map for the submission payload;
    /// every later call returns `None`. This is the idempotence anchor for
    /// the finalizer.
    pub fn finalize(&mut self) -> Option<BTreeMap<QuestionId, String>> {
        if !self.is_active() {
            return None;
        }
        self.status = SessionStatus::Submitted;
        Some(self.answers.clone())
    }

    /// Full durable projection of the current state.
    #[must_use]
    pub fn snapshot(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            remaining_seconds: Some(self.remaining_seconds),
            answers: Some(self.answers.clone()),
            violation_count: Some(self.violation_count),
        }
    }
}
