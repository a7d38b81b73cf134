//! Channel-tagged logging for the takt core.
//!
//! Every core component logs through a [`Logger`] carrying a single-letter
//! channel tag (`'E'` executor, `'S'` safety system, `'H'` HAL). The scheduler
//! additionally installs a thread-local task context before driving a task
//! list, so the `tlog!()` macro can attribute messages from inside blocks and
//! runnables to the thread that executed them.
//!
//! # Example
//!
//! ```ignore
//! use takt_core::tlog;
//!
//! fn run(&mut self) {
//!     tlog!(info, "controller converged after {} ticks", self.ticks);
//! }
//! ```
//!
//! The sink is stderr with ANSI severity colors; there is no file transport in
//! the core. The global level filter defaults to `Info`.

use std::cell::RefCell;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};

/// Log severity, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Trace = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
}

impl LogLevel {
    fn tag(&self) -> &'static str {
        match self {
            LogLevel::Trace => "\x1b[90m[TRACE]\x1b[0m",
            LogLevel::Info => "\x1b[34m[INFO]\x1b[0m",
            LogLevel::Warning => "\x1b[33m[WARN]\x1b[0m",
            LogLevel::Error => "\x1b[31m[ERROR]\x1b[0m",
        }
    }

    /// Parse a level name as written in `takt.yaml` (case-insensitive).
    pub fn parse(s: &str) -> Option<LogLevel> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

static LEVEL_FILTER: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Set the process-wide minimum severity that reaches the sink.
pub fn set_log_level(level: LogLevel) {
    LEVEL_FILTER.store(level as u8, Ordering::Relaxed);
}

fn enabled(level: LogLevel) -> bool {
    level as u8 >= LEVEL_FILTER.load(Ordering::Relaxed)
}

thread_local! {
    static CURRENT_TASK: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Set the current task context for this thread.
/// Called by the executor and each async thread before driving a task list.
pub fn set_task_context(name: &str) {
    CURRENT_TASK.with(|ctx| *ctx.borrow_mut() = Some(name.to_string()));
}

/// Clear the current task context for this thread.
pub fn clear_task_context() {
    CURRENT_TASK.with(|ctx| *ctx.borrow_mut() = None);
}

/// Get the current task name if set, otherwise "unknown".
pub fn current_task_name() -> String {
    CURRENT_TASK.with(|ctx| {
        ctx.borrow()
            .as_ref()
            .cloned()
            .unwrap_or_else(|| "unknown".to_string())
    })
}

fn emit(level: LogLevel, origin: &str, message: &str) {
    if !enabled(level) {
        return;
    }
    let now = chrono::Local::now();
    let line = format!(
        "{} {} \x1b[33m[{}]\x1b[0m {}\n",
        now.format("%H:%M:%S%.3f"),
        level.tag(),
        origin,
        message
    );
    let mut err = io::stderr();
    let _ = err.write_all(line.as_bytes());
    let _ = err.flush();
}

/// Internal function used by the `tlog!()` macro.
/// Logs a message attributed to the current thread's task context.
pub fn log_with_context(level: LogLevel, message: String) {
    emit(level, &current_task_name(), &message);
}

/// A severity logger tagged with a single-letter channel.
#[derive(Debug, Clone, Copy)]
pub struct Logger {
    channel: char,
}

impl Logger {
    /// Get the logger for a channel letter.
    pub fn get(channel: char) -> Logger {
        Logger { channel }
    }

    pub fn trace(&self, msg: impl AsRef<str>) {
        self.log(LogLevel::Trace, msg.as_ref());
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.log(LogLevel::Info, msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.log(LogLevel::Warning, msg.as_ref());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        self.log(LogLevel::Error, msg.as_ref());
    }

    fn log(&self, level: LogLevel, msg: &str) {
        let mut origin = [0u8; 4];
        emit(level, self.channel.encode_utf8(&mut origin), msg);
    }
}

/// Log with the current thread's task context.
///
/// ```ignore
/// tlog!(info, "loop settled after {} cycles", n);
/// tlog!(error, "sensor '{}' out of range", name);
/// ```
#[macro_export]
macro_rules! tlog {
    (trace, $($arg:tt)*) => {
        $crate::core::tlog::log_with_context($crate::core::tlog::LogLevel::Trace, format!($($arg)*))
    };
    (info, $($arg:tt)*) => {
        $crate::core::tlog::log_with_context($crate::core::tlog::LogLevel::Info, format!($($arg)*))
    };
    (warn, $($arg:tt)*) => {
        $crate::core::tlog::log_with_context($crate::core::tlog::LogLevel::Warning, format!($($arg)*))
    };
    (error, $($arg:tt)*) => {
        $crate::core::tlog::log_with_context($crate::core::tlog::LogLevel::Error, format!($($arg)*))
    };
}
