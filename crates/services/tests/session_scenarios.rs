use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;

use exam_core::model::{PersistedSnapshot, QuestionId, RawSignal, ViolationReason};
use exam_core::time::{fixed_clock, fixed_now};
use exam_core::{Clock, ExamConfig};
use services::{
    BackendError, ExamBackend, SessionController, SignalOutcome, StatePush, SubmissionForm,
    SubmitCause, VerdictOutcome, VerdictStatus, ViolationVerdict,
};
use storage::repository::{InMemoryStore, SnapshotStore};

//
// ─── MOCK BACKEND ──────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone)]
enum Script {
    /// Every request fails as if the server were unreachable.
    Unreachable,
    /// Violation reports succeed with this verdict.
    Verdict(ViolationVerdict),
}

#[derive(Clone)]
struct MockBackend {
    script: Arc<Mutex<Script>>,
    pushes: Arc<Mutex<Vec<StatePush>>>,
    reports: Arc<Mutex<Vec<ViolationReason>>>,
    beacons: Arc<Mutex<Vec<String>>>,
    submissions: Arc<Mutex<Vec<SubmissionForm>>>,
}

impl MockBackend {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Arc::new(Mutex::new(script)),
            pushes: Arc::new(Mutex::new(Vec::new())),
            reports: Arc::new(Mutex::new(Vec::new())),
            beacons: Arc::new(Mutex::new(Vec::new())),
            submissions: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn unreachable() -> Arc<Self> {
        Self::new(Script::Unreachable)
    }

    fn with_verdict(verdict: ViolationVerdict) -> Arc<Self> {
        Self::new(Script::Verdict(verdict))
    }

    fn error() -> BackendError {
        BackendError::HttpStatus(reqwest::StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn pushes(&self) -> Vec<StatePush> {
        self.pushes.lock().unwrap().clone()
    }

    fn reports(&self) -> Vec<ViolationReason> {
        self.reports.lock().unwrap().clone()
    }

    fn beacons(&self) -> Vec<String> {
        self.beacons.lock().unwrap().clone()
    }

    fn submissions(&self) -> Vec<SubmissionForm> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExamBackend for MockBackend {
    async fn push_state(&self, push: &StatePush) -> Result<(), BackendError> {
        if matches!(*self.script.lock().unwrap(), Script::Unreachable) {
            return Err(Self::error());
        }
        self.pushes.lock().unwrap().push(push.clone());
        Ok(())
    }

    async fn report_violation(
        &self,
        reason: ViolationReason,
    ) -> Result<ViolationVerdict, BackendError> {
        self.reports.lock().unwrap().push(reason);
        match self.script.lock().unwrap().clone() {
            Script::Unreachable => Err(Self::error()),
            Script::Verdict(verdict) => Ok(verdict),
        }
    }

    async fn send_exit_beacon(&self, event_name: &str) {
        self.beacons.lock().unwrap().push(event_name.to_string());
    }

    async fn submit_exam(&self, form: &SubmissionForm) -> Result<(), BackendError> {
        self.submissions.lock().unwrap().push(form.clone());
        if matches!(*self.script.lock().unwrap(), Script::Unreachable) {
            return Err(Self::error());
        }
        Ok(())
    }
}

//
// ─── HELPERS ───────────────────────────────────────────────────────────────────
//

/// Let detached push/beacon tasks run on the current-thread test runtime.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

async fn controller_with(
    config: ExamConfig,
    store: Arc<InMemoryStore>,
    backend: Arc<MockBackend>,
) -> SessionController {
    SessionController::resume_or_start(config, fixed_clock(), store, backend)
        .await
        .expect("controller starts")
}

//
// ─── TIMER AND SUBMISSION ──────────────────────────────────────────────────────
//

#[tokio::test]
async fn one_minute_exam_expires_and_submits_exactly_once() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::with_verdict(ViolationVerdict::default());
    let config = ExamConfig::with_duration_min(1).unwrap();
    let mut controller = controller_with(config, Arc::clone(&store), Arc::clone(&backend)).await;

    controller
        .select_answer(QuestionId::new("Q1"), "B")
        .await
        .unwrap();

    // 60 ticks take the countdown to exactly 0: still live.
    for _ in 0..60 {
        let outcome = controller.tick().await.unwrap();
        assert!(outcome.submission.is_none());
    }
    assert_eq!(controller.view().countdown, "00:00:00");

    // The decrement to -1 finalizes.
    let outcome = controller.tick().await.unwrap();
    let receipt = outcome.submission.expect("expiry finalizes");
    assert_eq!(receipt.cause, SubmitCause::TimeExpired);
    assert_eq!(receipt.answers_json, r#"{"Q1":"B"}"#);

    // Persisted keys cleared, exactly one submission delivered.
    assert!(store.load().await.unwrap().is_empty());
    assert_eq!(backend.submissions().len(), 1);

    // The timer keeps firing; nothing further is observable.
    for _ in 0..3 {
        let outcome = controller.tick().await.unwrap();
        assert!(outcome.submission.is_none());
    }
    assert_eq!(backend.submissions().len(), 1);
    assert!(store.load().await.unwrap().is_empty());
}

#[tokio::test]
async fn explicit_submit_is_idempotent() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::with_verdict(ViolationVerdict::default());
    let mut controller =
        controller_with(ExamConfig::default(), Arc::clone(&store), Arc::clone(&backend)).await;

    controller
        .select_answer(QuestionId::new("q2"), "D")
        .await
        .unwrap();

    let receipt = controller.submit().await.unwrap().expect("first submit");
    assert_eq!(receipt.cause, SubmitCause::UserSubmit);
    assert!(controller.submit().await.unwrap().is_none());
    assert!(controller.submit().await.unwrap().is_none());

    assert_eq!(backend.submissions().len(), 1);
    assert!(store.load().await.unwrap().is_empty());
}

#[tokio::test]
async fn submission_still_finalizes_when_server_is_down() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::unreachable();
    let mut controller =
        controller_with(ExamConfig::default(), Arc::clone(&store), Arc::clone(&backend)).await;

    let receipt = controller.submit().await.unwrap().expect("submit");
    assert_eq!(receipt.answers_json, "{}");
    assert!(store.load().await.unwrap().is_empty());
}

//
// ─── VIOLATION PATH ────────────────────────────────────────────────────────────
//

#[tokio::test]
async fn six_spaced_blurs_offline_block_on_local_fallback() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::unreachable();
    let mut controller =
        controller_with(ExamConfig::default(), Arc::clone(&store), Arc::clone(&backend)).await;

    let mut now = fixed_now();
    for i in 1..=6_u32 {
        now += Duration::seconds(2);
        controller.set_clock(Clock::fixed(now));

        let outcome = controller.handle_signal(RawSignal::WindowBlur).await.unwrap();
        let SignalOutcome::Report(reason) = outcome else {
            panic!("blur {i} should be accepted, got {outcome:?}");
        };
        let verdict = controller.report_violation_now(reason).await.unwrap();
        if i <= 5 {
            // Count equal to the maximum does not block; only exceeding does.
            let VerdictOutcome::Notice(notice) = verdict else {
                panic!("violation {i} should not block, got {verdict:?}");
            };
            assert_eq!(notice.count, i);
            assert_eq!(
                notice.to_string(),
                format!("Warning: Window blur. Violations: {i} / 5")
            );
        } else {
            let VerdictOutcome::Submitted(receipt) = verdict else {
                panic!("violation 6 should block, got {verdict:?}");
            };
            assert_eq!(receipt.cause, SubmitCause::ViolationBlock);
        }
    }

    assert_eq!(backend.reports().len(), 6);
    assert!(store.load().await.unwrap().is_empty());
}

#[tokio::test]
async fn compound_blur_and_visibility_count_as_one_incident() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::with_verdict(ViolationVerdict::default());
    let mut controller =
        controller_with(ExamConfig::default(), Arc::clone(&store), backend).await;

    let start = fixed_now();
    controller.set_clock(Clock::fixed(start));
    let first = controller.handle_signal(RawSignal::WindowBlur).await.unwrap();
    assert!(matches!(first, SignalOutcome::Report(_)));

    // visibilitychange fires 50 ms after the blur it belongs to.
    controller.set_clock(Clock::fixed(start + Duration::milliseconds(50)));
    let second = controller
        .handle_signal(RawSignal::VisibilityHidden)
        .await
        .unwrap();
    assert_eq!(second, SignalOutcome::Debounced);

    assert_eq!(controller.view().violation_count, 1);
    assert_eq!(store.load().await.unwrap().violation_count, Some(1));
}

#[tokio::test]
async fn authoritative_count_supersedes_local_for_blocking() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::with_verdict(ViolationVerdict {
        violations: Some(7),
        status: Some(VerdictStatus::Ok),
    });
    let mut controller =
        controller_with(ExamConfig::default(), Arc::clone(&store), Arc::clone(&backend)).await;

    let outcome = controller
        .handle_signal(RawSignal::VisibilityHidden)
        .await
        .unwrap();
    let SignalOutcome::Report(reason) = outcome else {
        panic!("first signal should be accepted");
    };
    let verdict = controller.report_violation_now(reason).await.unwrap();
    let VerdictOutcome::Submitted(receipt) = verdict else {
        panic!("server count 7 must block, got {verdict:?}");
    };
    assert_eq!(receipt.cause, SubmitCause::ViolationBlock);
}

#[tokio::test]
async fn server_blocked_status_blocks_regardless_of_count() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::with_verdict(ViolationVerdict {
        violations: Some(1),
        status: Some(VerdictStatus::Blocked),
    });
    let mut controller = controller_with(ExamConfig::default(), store, backend).await;

    let SignalOutcome::Report(reason) =
        controller.handle_signal(RawSignal::WindowBlur).await.unwrap()
    else {
        panic!("signal should be accepted");
    };
    let verdict = controller.report_violation_now(reason).await.unwrap();
    assert!(matches!(verdict, VerdictOutcome::Submitted(_)));
}

#[tokio::test]
async fn missing_verdict_fields_fall_back_to_local_count() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::with_verdict(ViolationVerdict::default());
    let mut controller = controller_with(ExamConfig::default(), store, backend).await;

    let SignalOutcome::Report(reason) =
        controller.handle_signal(RawSignal::WindowBlur).await.unwrap()
    else {
        panic!("signal should be accepted");
    };
    let verdict = controller.report_violation_now(reason).await.unwrap();
    let VerdictOutcome::Notice(notice) = verdict else {
        panic!("one violation must not block, got {verdict:?}");
    };
    assert_eq!(notice.count, 1);
    assert_eq!(controller.view().violation_count, 1);
}

#[tokio::test]
async fn late_blocked_verdict_after_submission_is_discarded() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::with_verdict(ViolationVerdict::default());
    let mut controller =
        controller_with(ExamConfig::default(), store, Arc::clone(&backend)).await;

    let SignalOutcome::Report(reason) =
        controller.handle_signal(RawSignal::WindowBlur).await.unwrap()
    else {
        panic!("signal should be accepted");
    };

    // The user submits while the report is still in flight.
    controller.submit().await.unwrap().expect("submit");

    let late = ViolationVerdict {
        violations: Some(99),
        status: Some(VerdictStatus::Blocked),
    };
    let outcome = controller.apply_verdict(reason, Ok(late)).await.unwrap();
    assert_eq!(outcome, VerdictOutcome::Ignored);
    assert_eq!(backend.submissions().len(), 1);
}

#[tokio::test]
async fn signals_after_finalization_are_ignored() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::with_verdict(ViolationVerdict::default());
    let mut controller =
        controller_with(ExamConfig::default(), Arc::clone(&store), backend).await;

    controller.submit().await.unwrap().expect("submit");

    let outcome = controller.handle_signal(RawSignal::WindowBlur).await.unwrap();
    assert_eq!(outcome, SignalOutcome::Ignored);
    assert_eq!(controller.view().violation_count, 0);
}

#[tokio::test]
async fn exit_signals_fire_the_beacon_even_when_debounced() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::with_verdict(ViolationVerdict::default());
    let mut controller =
        controller_with(ExamConfig::default(), store, Arc::clone(&backend)).await;

    let start = fixed_now();
    controller.set_clock(Clock::fixed(start));
    controller.handle_signal(RawSignal::PageHide).await.unwrap();

    // A second teardown signal inside the cooldown: debounced as a
    // violation, but the beacon is unconditional.
    controller.set_clock(Clock::fixed(start + Duration::milliseconds(10)));
    let outcome = controller
        .handle_signal(RawSignal::BeforeUnload)
        .await
        .unwrap();
    assert_eq!(outcome, SignalOutcome::Debounced);

    settle().await;
    assert_eq!(backend.beacons(), vec!["pagehide", "beforeunload"]);
    assert_eq!(controller.view().violation_count, 1);
}

//
// ─── ANSWERS, HEARTBEAT, RELOAD ────────────────────────────────────────────────
//

#[tokio::test]
async fn answer_selection_persists_and_pushes() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::with_verdict(ViolationVerdict::default());
    let mut controller =
        controller_with(ExamConfig::default(), Arc::clone(&store), Arc::clone(&backend)).await;

    controller
        .select_answer(QuestionId::new("q1"), "A")
        .await
        .unwrap();
    controller
        .select_answer(QuestionId::new("q1"), "C")
        .await
        .unwrap();
    settle().await;

    // Last write wins, both in memory and in the store.
    let snapshot = store.load().await.unwrap();
    let answers = snapshot.answers.expect("answers persisted");
    assert_eq!(answers.get(&QuestionId::new("q1")), Some(&"C".to_string()));
    assert_eq!(answers.len(), 1);

    // Both changes pushed, each carrying the full current map.
    let pushes = backend.pushes();
    assert_eq!(pushes.len(), 2);
    assert_eq!(
        pushes[1].answers.get(&QuestionId::new("q1")),
        Some(&"C".to_string())
    );
    assert_eq!(pushes[1].remaining, 5400);
}

#[tokio::test]
async fn failed_answer_push_is_swallowed() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::unreachable();
    let mut controller =
        controller_with(ExamConfig::default(), Arc::clone(&store), backend).await;

    controller
        .select_answer(QuestionId::new("q9"), "B")
        .await
        .unwrap();
    settle().await;

    // Local persistence is unaffected by the network failure.
    assert!(store.load().await.unwrap().answers.is_some());
}

#[tokio::test]
async fn heartbeat_pushes_current_state() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::with_verdict(ViolationVerdict::default());
    let mut controller =
        controller_with(ExamConfig::default(), store, Arc::clone(&backend)).await;

    controller
        .select_answer(QuestionId::new("q3"), "D")
        .await
        .unwrap();
    controller.tick().await.unwrap();
    settle().await;
    let before = backend.pushes().len();

    controller.heartbeat();
    settle().await;

    let pushes = backend.pushes();
    assert_eq!(pushes.len(), before + 1);
    let last = pushes.last().unwrap();
    assert_eq!(last.remaining, 5399);
    assert_eq!(last.answers.get(&QuestionId::new("q3")), Some(&"D".to_string()));
}

#[tokio::test]
async fn heartbeat_stops_after_finalization() {
    let store = Arc::new(InMemoryStore::new());
    let backend = MockBackend::with_verdict(ViolationVerdict::default());
    let mut controller =
        controller_with(ExamConfig::default(), store, Arc::clone(&backend)).await;

    controller.submit().await.unwrap().expect("submit");
    controller.heartbeat();
    settle().await;

    assert!(backend.pushes().is_empty());
}

#[tokio::test]
async fn reload_restores_answers_timer_and_violations() {
    let mut answers = BTreeMap::new();
    answers.insert(QuestionId::new("q1"), "B".to_string());
    answers.insert(QuestionId::new("q4"), "A".to_string());
    let store = Arc::new(InMemoryStore::seeded(PersistedSnapshot {
        remaining_seconds: Some(1234),
        answers: Some(answers.clone()),
        violation_count: Some(2),
    }));
    let backend = MockBackend::with_verdict(ViolationVerdict::default());
    let controller =
        controller_with(ExamConfig::default(), store, backend).await;

    let view = controller.view();
    assert_eq!(view.countdown, "00:20:34");
    assert_eq!(view.answers, answers);
    assert_eq!(view.violation_count, 2);
}

#[tokio::test]
async fn restored_violation_count_keeps_counting_toward_the_limit() {
    let store = Arc::new(InMemoryStore::seeded(PersistedSnapshot {
        violation_count: Some(5),
        ..PersistedSnapshot::default()
    }));
    let backend = MockBackend::unreachable();
    let mut controller =
        controller_with(ExamConfig::default(), store, backend).await;

    // Clearing local state by reloading must not reset the counter: the
    // sixth violation still blocks.
    let SignalOutcome::Report(reason) =
        controller.handle_signal(RawSignal::WindowBlur).await.unwrap()
    else {
        panic!("signal after reload should be accepted");
    };
    let verdict = controller.report_violation_now(reason).await.unwrap();
    assert!(matches!(verdict, VerdictOutcome::Submitted(_)));
}
