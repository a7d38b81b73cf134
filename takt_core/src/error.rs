//! Unified error handling for the takt core.
//!
//! Every startup failure surfaced by the executor and the safety system is a
//! variant of [`TaktError`]. Startup errors abort [`Executor::run`] before any
//! thread is created; runtime anomalies (overruns, lock failures) are reported
//! through counters and the logger instead and never use this type.
//!
//! [`Executor::run`]: crate::scheduling::Executor::run

use thiserror::Error;

/// Main error type for takt core operations
#[derive(Debug, Error)]
pub enum TaktError {
    /// `run()` was called before a main task or base period was configured
    #[error("executor base period not set")]
    PeriodUnset,

    /// A second main task (or a base period after a main task) was configured
    #[error("only one main task can be defined per executor")]
    MainTaskAlreadySet,

    /// A task period is not within 1% of an integer multiple of its parent
    #[error(
        "task '{task}' period {configured}s deviates {deviation:.2}% from nearest harmonic {actual}s"
    )]
    PeriodDeviation {
        task: String,
        configured: f64,
        actual: f64,
        /// Relative deviation in percent
        deviation: f64,
    },

    /// A realtime task reached thread creation without an assigned nice value
    #[error("realtime task '{0}' has no priority assigned")]
    PriorityUnset(String),

    /// A periodic descriptor carries neither a runnable nor any children
    #[error("task '{0}' has nothing to execute")]
    EmptyTaskList(String),

    /// Lookup of an unregistered HAL channel or output feature
    #[error("HAL binding '{0}' is not registered")]
    HalBindingMissing(String),

    /// An external caller tried to enqueue a private safety event
    #[error("safety event '{0}' is private to the safety system")]
    PrivateEventViolation(String),

    /// Safety properties failed validation (missing entry level, duplicate
    /// level id, dangling transition target)
    #[error("invalid safety properties: {0}")]
    SafetyProperties(String),

    /// I/O related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parsing or validation errors
    #[error("configuration error: {0}")]
    Config(String),
}

impl TaktError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(msg: S) -> Self {
        TaktError::Config(msg.into())
    }
}

/// Convenience type alias for Results using TaktError
pub type TaktResult<T> = std::result::Result<T, TaktError>;

/// Short alias — `Result<T>` is equivalent to `TaktResult<T>`
pub type Result<T> = TaktResult<T>;

impl From<serde_yaml::Error> for TaktError {
    fn from(err: serde_yaml::Error) -> Self {
        TaktError::Config(format!("YAML error: {}", err))
    }
}
