use std::sync::Arc;

use tracing::{debug, info, warn};

use exam_core::model::{
    QuestionId, RawSignal, SessionState, ViolationDetector, ViolationReason,
};
use exam_core::time::format_hms;
use exam_core::{Clock, ExamConfig, ViolationDebouncer};
use storage::repository::SnapshotStore;

use crate::backend::{BackendError, ExamBackend, StatePush, SubmissionForm, ViolationVerdict};
use crate::error::SessionError;

use super::view::{
    SessionView, SignalOutcome, SubmissionReceipt, SubmitCause, TickOutcome, VerdictOutcome,
    ViolationNotice,
};

/// Owner of the session state for one exam page lifetime.
///
/// Wires the signal path (detector → debouncer → reporter) to the countdown
/// and the persistence store. All mutation goes through `&mut self`, so a
/// single driver task gets the event-loop semantics of the page for free.
///
/// Backend pushes are best-effort and detached; only the violation report's
/// verdict flows back, through [`SessionController::apply_verdict`], which
/// is safe to call at any point after the matching signal — including after
/// the session has already finalized.
pub struct SessionController {
    config: ExamConfig,
    clock: Clock,
    state: SessionState,
    detector: ViolationDetector,
    debouncer: ViolationDebouncer,
    store: Arc<dyn SnapshotStore>,
    backend: Arc<dyn ExamBackend>,
    last_notice: Option<ViolationNotice>,
}

impl SessionController {
    /// Build the controller, restoring a persisted snapshot when one exists
    /// (reload recovery) and starting fresh otherwise.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the snapshot cannot be read.
    pub async fn resume_or_start(
        config: ExamConfig,
        clock: Clock,
        store: Arc<dyn SnapshotStore>,
        backend: Arc<dyn ExamBackend>,
    ) -> Result<Self, SessionError> {
        let snapshot = store.load().await?;
        let state = if snapshot.is_empty() {
            SessionState::fresh(&config)
        } else {
            let state = SessionState::restore(&config, snapshot);
            info!(
                remaining = state.remaining_seconds(),
                violations = state.violation_count(),
                answers = state.answers().len(),
                "session restored from snapshot"
            );
            state
        };
        let debouncer = ViolationDebouncer::new(config.cooldown_ms());
        Ok(Self {
            config,
            clock,
            state,
            detector: ViolationDetector::new(),
            debouncer,
            store,
            backend,
            last_notice: None,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ExamConfig {
        &self.config
    }

    #[must_use]
    pub fn backend(&self) -> Arc<dyn ExamBackend> {
        Arc::clone(&self.backend)
    }

    /// Replace the clock, e.g. to pin time in tests.
    pub fn set_clock(&mut self, clock: Clock) {
        self.clock = clock;
    }

    /// Snapshot of everything the page host renders.
    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            countdown: format_hms(self.state.remaining_seconds()),
            answers: self.state.answers().clone(),
            violation_count: self.state.violation_count(),
            status: self.state.status(),
            notice: self.last_notice.clone(),
        }
    }

    //
    // ─── COUNTDOWN ─────────────────────────────────────────────────────────────
    //

    /// One second of countdown: decrement, persist, finalize on expiry.
    ///
    /// Safe against a timer that keeps firing after finalization; the state
    /// guard makes those firings no-ops. Zero is still a live second, the
    /// decrement to `-1` is what finalizes.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the new value cannot be persisted.
    pub async fn tick(&mut self) -> Result<TickOutcome, SessionError> {
        let Some(remaining) = self.state.tick_down() else {
            return Ok(TickOutcome {
                countdown: format_hms(self.state.remaining_seconds()),
                submission: None,
            });
        };
        self.store.save_remaining(remaining).await?;
        let submission = if remaining < 0 {
            self.finalize(SubmitCause::TimeExpired).await?
        } else {
            None
        };
        Ok(TickOutcome {
            countdown: format_hms(remaining),
            submission,
        })
    }

    //
    // ─── ANSWER CAPTURE ────────────────────────────────────────────────────────
    //

    /// Record a selected answer (last write wins), persist the answer map,
    /// and push it to the server in the background.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` after finalization, or
    /// `SessionError::Storage` if the map cannot be persisted. The network
    /// push cannot fail the call.
    pub async fn select_answer(
        &mut self,
        question: QuestionId,
        value: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.state.record_answer(question, value.into())?;
        self.store.save_answers(self.state.answers()).await?;
        self.spawn_state_push();
        Ok(())
    }

    //
    // ─── HEARTBEAT ─────────────────────────────────────────────────────────────
    //

    /// Periodic durability push, independent of user activity. Detached and
    /// silent: a failed push is superseded by the next tick.
    pub fn heartbeat(&self) {
        if !self.state.is_active() {
            return;
        }
        self.spawn_state_push();
    }

    fn state_push(&self) -> StatePush {
        StatePush {
            answers: self.state.answers().clone(),
            remaining: self.state.remaining_seconds(),
        }
    }

    fn spawn_state_push(&self) {
        let backend = Arc::clone(&self.backend);
        let push = self.state_push();
        tokio::spawn(async move {
            if let Err(err) = backend.push_state(&push).await {
                debug!(error = %err, "state push dropped");
            }
        });
    }

    //
    // ─── VIOLATIONS ────────────────────────────────────────────────────────────
    //

    /// Run one raw signal through detector and debouncer.
    ///
    /// An accepted violation is counted and persisted here; the caller is
    /// responsible for delivering the report (see
    /// [`SessionController::apply_verdict`] and
    /// [`SessionController::report_violation_now`]). Page-exit signals also
    /// fire the one-way beacon regardless of debouncing, so a violation is
    /// recorded server-side even if the page dies mid-request.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the new count cannot be persisted.
    pub async fn handle_signal(&mut self, signal: RawSignal) -> Result<SignalOutcome, SessionError> {
        if signal.is_page_exit() {
            self.spawn_exit_beacon(signal);
        }
        let Some(reason) = self.detector.classify(signal) else {
            return Ok(SignalOutcome::Ignored);
        };
        if !self.state.is_active() {
            return Ok(SignalOutcome::Ignored);
        }
        if !self.debouncer.accept(self.clock.now()) {
            debug!(%reason, "violation inside cooldown window, coalesced");
            return Ok(SignalOutcome::Debounced);
        }
        let count = self.state.record_violation()?;
        self.store.save_violations(count).await?;
        info!(%reason, count, "violation accepted");
        Ok(SignalOutcome::Report(reason))
    }

    /// Reconcile a violation report's response against local state.
    ///
    /// The authoritative count is `verdict.violations` when present, the
    /// local counter otherwise (and always on delivery failure). The local
    /// counter is never overwritten. A verdict arriving after finalization
    /// is discarded: a late "blocked" must not re-trigger the finalizer.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` only from the finalization path.
    pub async fn apply_verdict(
        &mut self,
        reason: ViolationReason,
        response: Result<ViolationVerdict, BackendError>,
    ) -> Result<VerdictOutcome, SessionError> {
        if !self.state.is_active() {
            debug!(%reason, "verdict after finalization discarded");
            return Ok(VerdictOutcome::Ignored);
        }
        let local = self.state.violation_count();
        let (count, blocked_by_server) = match response {
            Ok(verdict) => (verdict.violations.unwrap_or(local), verdict.is_blocked()),
            Err(err) => {
                warn!(error = %err, "violation report failed, falling back to local count");
                (local, false)
            }
        };
        let notice = ViolationNotice {
            reason,
            count,
            max: self.config.max_violations(),
        };
        self.last_notice = Some(notice.clone());
        if count > self.config.max_violations() || blocked_by_server {
            if let Some(receipt) = self.finalize(SubmitCause::ViolationBlock).await? {
                return Ok(VerdictOutcome::Submitted(receipt));
            }
        }
        Ok(VerdictOutcome::Notice(notice))
    }

    /// Deliver the report inline and apply the verdict in one step, for
    /// drivers that do not detach the request.
    ///
    /// # Errors
    ///
    /// Same as [`SessionController::apply_verdict`].
    pub async fn report_violation_now(
        &mut self,
        reason: ViolationReason,
    ) -> Result<VerdictOutcome, SessionError> {
        let response = self.backend.report_violation(reason).await;
        self.apply_verdict(reason, response).await
    }

    fn spawn_exit_beacon(&self, signal: RawSignal) {
        let backend = Arc::clone(&self.backend);
        let event = signal.event_name();
        tokio::spawn(async move {
            backend.send_exit_beacon(event).await;
        });
    }

    //
    // ─── FINALIZATION ──────────────────────────────────────────────────────────
    //

    /// Explicit user submission.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the persisted keys cannot be
    /// cleared.
    pub async fn submit(&mut self) -> Result<Option<SubmissionReceipt>, SessionError> {
        self.finalize(SubmitCause::UserSubmit).await
    }

    /// The one terminal transition: package answers, clear persisted state,
    /// submit. Idempotent — every call after the first returns `None`.
    async fn finalize(
        &mut self,
        cause: SubmitCause,
    ) -> Result<Option<SubmissionReceipt>, SessionError> {
        let Some(answers) = self.state.finalize() else {
            return Ok(None);
        };
        let answers_json = serde_json::to_string(&answers)?;
        self.store.clear().await?;
        let form = SubmissionForm {
            answers_json: answers_json.clone(),
        };
        if let Err(err) = self.backend.submit_exam(&form).await {
            warn!(error = %err, "final submission push failed, server keeps the heartbeat copy");
        }
        info!(cause = cause.as_str(), "exam finalized");
        Ok(Some(SubmissionReceipt {
            cause,
            answers_json,
        }))
    }
}
