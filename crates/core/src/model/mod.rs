mod ids;
mod session;
mod snapshot;
mod violation;

pub use ids::QuestionId;
pub use session::{SessionState, SessionStateError, SessionStatus};
pub use snapshot::PersistedSnapshot;
pub use violation::{InputEvent, InputRuling, RawSignal, ViolationDetector, ViolationReason};
