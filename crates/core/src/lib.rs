#![forbid(unsafe_code)]

pub mod config;
pub mod debounce;
pub mod model;
pub mod time;

pub use config::{ExamConfig, ExamConfigError};
pub use debounce::ViolationDebouncer;
pub use time::Clock;
