use chrono::{DateTime, Duration, Utc};

/// Coalesces near-simultaneous violation signals into single incidents.
///
/// Compound browser events (blur firing alongside visibilitychange, a
/// fullscreen exit alongside a tab switch) must count as one violation, so
/// the cooldown window is global across all reason types, keyed only on the
/// last *accepted* timestamp. The window is unset at session start: the
/// first signal after a reload always passes.
#[derive(Debug, Clone)]
pub struct ViolationDebouncer {
    cooldown: Duration,
    last_accepted_at: Option<DateTime<Utc>>,
}

impl ViolationDebouncer {
    /// Create a debouncer with the given cooldown window.
    ///
    /// # Panics
    ///
    /// Panics if `cooldown_ms` does not fit a `chrono::Duration`, which is
    /// unreachable for any realistic configuration value.
    #[must_use]
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            cooldown: Duration::milliseconds(
                i64::try_from(cooldown_ms).expect("cooldown_ms fits i64"),
            ),
            last_accepted_at: None,
        }
    }

    #[must_use]
    pub fn last_accepted_at(&self) -> Option<DateTime<Utc>> {
        self.last_accepted_at
    }

    /// Decide whether a signal observed at `at` opens a new incident.
    ///
    /// Accepting moves the window; a rejected signal leaves it untouched, so
    /// a burst of signals inside one window collapses to exactly one
    /// accepted violation rather than sliding the window forward.
    pub fn accept(&mut self, at: DateTime<Utc>) -> bool {
        if let Some(last) = self.last_accepted_at
            && at - last < self.cooldown
        {
            return false;
        }
        self.last_accepted_at = Some(at);
        true
    }
}
