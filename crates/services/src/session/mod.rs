mod controller;
mod runtime;
mod view;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use controller::SessionController;
pub use runtime::{SessionInput, SessionRuntime};
pub use view::{
    FULLSCREEN_ADVISORY, SessionView, SignalOutcome, SubmissionReceipt, SubmitCause, TickOutcome,
    VerdictOutcome, ViolationNotice,
};
