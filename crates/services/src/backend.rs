use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use exam_core::model::{QuestionId, ViolationReason};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    #[error("request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

//
// ─── WIRE SHAPES ───────────────────────────────────────────────────────────────
//

/// Autosave payload pushed on every answer change and every heartbeat tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatePush {
    pub answers: BTreeMap<QuestionId, String>,
    pub remaining: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Ok,
    Blocked,
}

/// Server response to a violation report. Both fields are best-effort: an
/// older server may return neither, in which case the local count decides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ViolationVerdict {
    #[serde(default)]
    pub violations: Option<u32>,
    #[serde(default)]
    pub status: Option<VerdictStatus>,
}

impl ViolationVerdict {
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.status == Some(VerdictStatus::Blocked)
    }
}

/// Form-style submission payload: one hidden field holding the
/// JSON-serialized final answer map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionForm {
    pub answers_json: String,
}

#[derive(Serialize)]
struct ReasonBody<'a> {
    reason: &'a str,
}

//
// ─── BACKEND CONTRACT ──────────────────────────────────────────────────────────
//

/// The trusted server's endpoints as seen from the exam page.
///
/// Every call is best-effort from the session's point of view: there is no
/// retry and no timeout, and callers are permitted to ignore errors. The
/// periodic sources (heartbeat tick, next answer change) are the retry
/// mechanism.
#[async_trait]
pub trait ExamBackend: Send + Sync {
    /// Push current answers and remaining time for durability.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport failure; callers drop it.
    async fn push_state(&self, push: &StatePush) -> Result<(), BackendError>;

    /// Report one accepted violation and fetch the authoritative verdict.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport failure or a non-JSON body; the
    /// caller then falls back to the local count.
    async fn report_violation(&self, reason: ViolationReason)
    -> Result<ViolationVerdict, BackendError>;

    /// One-way last-gasp notice during page teardown. No response, no error:
    /// the page may be gone before either could be observed.
    async fn send_exit_beacon(&self, event_name: &str);

    /// Deliver the final submission form.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport failure.
    async fn submit_exam(&self, form: &SubmissionForm) -> Result<(), BackendError>;
}

//
// ─── HTTP IMPLEMENTATION ───────────────────────────────────────────────────────
//

/// `reqwest`-backed `ExamBackend` talking JSON to the exam server.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

#[async_trait]
impl ExamBackend for HttpBackend {
    async fn push_state(&self, push: &StatePush) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.endpoint("heartbeat"))
            .json(push)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::HttpStatus(response.status()));
        }
        Ok(())
    }

    async fn report_violation(
        &self,
        reason: ViolationReason,
    ) -> Result<ViolationVerdict, BackendError> {
        let response = self
            .client
            .post(self.endpoint("violation"))
            .json(&ReasonBody {
                reason: reason.as_str(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::HttpStatus(response.status()));
        }
        let verdict = response.json::<ViolationVerdict>().await?;
        Ok(verdict)
    }

    async fn send_exit_beacon(&self, event_name: &str) {
        let result = self
            .client
            .post(self.endpoint("violation-beacon"))
            .json(&ReasonBody { reason: event_name })
            .send()
            .await;
        if let Err(err) = result {
            tracing::debug!(error = %err, "exit beacon dropped");
        }
    }

    async fn submit_exam(&self, form: &SubmissionForm) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.endpoint("submit"))
            .form(&[("answers_json", form.answers_json.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::HttpStatus(response.status()));
        }
        Ok(())
    }
}
