use std::collections::BTreeMap;
use std::fmt;

use exam_core::model::{QuestionId, SessionStatus, ViolationReason};

/// Advisory shown when the platform has no fullscreen API; a degraded
/// capability is a message, not a violation.
pub const FULLSCREEN_ADVISORY: &str =
    "Please keep this page open. Leaving it will count as a violation.";

/// Aggregated view of the running session, for the page host to render.
///
/// `answers` carries the restored selections after a reload so the host can
/// re-check the matching options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub countdown: String,
    pub answers: BTreeMap<QuestionId, String>,
    pub violation_count: u32,
    pub status: SessionStatus,
    pub notice: Option<ViolationNotice>,
}

/// Content of the user-facing status line after a processed violation.
///
/// `count` is the authoritative server count when one was returned, the
/// local fallback otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationNotice {
    pub reason: ViolationReason,
    pub count: u32,
    pub max: u32,
}

impl fmt::Display for ViolationNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Warning: {}. Violations: {} / {}",
            self.reason, self.count, self.max
        )
    }
}

/// What triggered finalization; messaging-only, the terminal state is the
/// same either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitCause {
    TimeExpired,
    ViolationBlock,
    UserSubmit,
}

impl SubmitCause {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitCause::TimeExpired => "time-expired",
            SubmitCause::ViolationBlock => "violation-block",
            SubmitCause::UserSubmit => "user-submit",
        }
    }
}

/// Proof that finalization ran: what was submitted and why. Produced at most
/// once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub cause: SubmitCause,
    pub answers_json: String,
}

/// Result of one countdown tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub countdown: String,
    pub submission: Option<SubmissionReceipt>,
}

/// Result of classifying and debouncing one raw signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// Not a violation (or arrived after finalization).
    Ignored,
    /// A violation, but inside the cooldown window of the previous one.
    Debounced,
    /// Accepted: counted, persisted, and ready to report to the server.
    Report(ViolationReason),
}

/// Result of processing a violation report's response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerdictOutcome {
    /// The verdict arrived after finalization and was discarded.
    Ignored,
    /// Session continues; the status line should show this notice.
    Notice(ViolationNotice),
    /// The verdict (or local fallback) crossed the threshold.
    Submitted(SubmissionReceipt),
}
