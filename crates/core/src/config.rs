use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamConfigError {
    #[error("exam duration must be > 0 minutes")]
    InvalidDuration,

    #[error("violation cooldown must be > 0 ms")]
    InvalidCooldown,

    #[error("heartbeat interval must be > 0 seconds")]
    InvalidHeartbeatInterval,
}

/// Tunable knobs for one proctored exam session.
///
/// Defaults mirror the deployed configuration: 90 minute exam, block after
/// the violation count exceeds 5, 1500 ms violation cooldown, 10 s heartbeat
/// cadence, 1 s countdown tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamConfig {
    duration_min: u32,
    max_violations: u32,
    cooldown_ms: u64,
    heartbeat_interval_secs: u64,
    tick_interval_secs: u64,
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self {
            duration_min: 90,
            max_violations: 5,
            cooldown_ms: 1500,
            heartbeat_interval_secs: 10,
            tick_interval_secs: 1,
        }
    }
}

impl ExamConfig {
    /// Creates a config with a custom exam duration, keeping other defaults.
    ///
    /// # Errors
    ///
    /// Returns `ExamConfigError::InvalidDuration` for a zero-minute exam.
    pub fn with_duration_min(duration_min: u32) -> Result<Self, ExamConfigError> {
        if duration_min == 0 {
            return Err(ExamConfigError::InvalidDuration);
        }
        Ok(Self {
            duration_min,
            ..Self::default()
        })
    }

    /// Override the maximum allowed violations (exceeding, not reaching, blocks).
    #[must_use]
    pub fn with_max_violations(mut self, max_violations: u32) -> Self {
        self.max_violations = max_violations;
        self
    }

    /// Override the debounce cooldown in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns `ExamConfigError::InvalidCooldown` for a zero cooldown.
    pub fn with_cooldown_ms(mut self, cooldown_ms: u64) -> Result<Self, ExamConfigError> {
        if cooldown_ms == 0 {
            return Err(ExamConfigError::InvalidCooldown);
        }
        self.cooldown_ms = cooldown_ms;
        Ok(self)
    }

    /// Override the heartbeat cadence in seconds.
    ///
    /// # Errors
    ///
    /// Returns `ExamConfigError::InvalidHeartbeatInterval` for a zero interval.
    pub fn with_heartbeat_interval_secs(
        mut self,
        heartbeat_interval_secs: u64,
    ) -> Result<Self, ExamConfigError> {
        if heartbeat_interval_secs == 0 {
            return Err(ExamConfigError::InvalidHeartbeatInterval);
        }
        self.heartbeat_interval_secs = heartbeat_interval_secs;
        Ok(self)
    }

    #[must_use]
    pub fn duration_min(&self) -> u32 {
        self.duration_min
    }

    /// Full exam duration in seconds, the starting value of the countdown.
    #[must_use]
    pub fn total_seconds(&self) -> i64 {
        i64::from(self.duration_min) * 60
    }

    #[must_use]
    pub fn max_violations(&self) -> u32 {
        self.max_violations
    }

    #[must_use]
    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    #[must_use]
    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval_secs
    }

    #[must_use]
    pub fn tick_interval_secs(&self) -> u64 {
        self.tick_interval_secs
    }
}
