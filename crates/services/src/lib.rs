#![forbid(unsafe_code)]

pub mod backend;
pub mod error;
pub mod session;

pub use exam_core::Clock;

pub use backend::{
    BackendError, ExamBackend, HttpBackend, StatePush, SubmissionForm, VerdictStatus,
    ViolationVerdict,
};
pub use error::SessionError;
pub use session::{
    FULLSCREEN_ADVISORY, SessionController, SessionInput, SessionRuntime, SessionView,
    SignalOutcome, SubmissionReceipt, SubmitCause, TickOutcome, VerdictOutcome, ViolationNotice,
};
