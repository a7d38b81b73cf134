//! # Takt Core
//!
//! The realtime execution core of the takt robotics framework: a
//! deterministic scheduler driving a network of periodic control blocks,
//! synchronized with a safety state machine and optional external clock
//! sources.
//!
//! - **Scheduling**: a main task at a base period plus harmonic sub-tasks,
//!   each on its own SCHED_FIFO thread with derived priorities and locked
//!   memory
//! - **Control**: named blocks with typed signal ports, composed into
//!   [`TimeDomain`]s and run in insertion order
//! - **Safety**: a hierarchical state machine sampling critical inputs and
//!   driving critical outputs once per tick
//! - **HAL**: a named-channel registry connecting the core to hardware
//!   backends
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use takt_core::{Executor, Periodic};
//!
//! let executor = Executor::instance();
//! executor.set_period(0.001).unwrap();
//! executor.add(Periodic::from_fn("telemetry", 0.1, false, || {
//!     // runs every 100 ms on its own thread
//! }));
//! executor.run().unwrap();
//! ```

pub mod config;
pub mod control;
pub mod core;
pub mod error;
pub mod hal;
pub mod safety;
pub mod scheduling;

// Re-export commonly used types for easy access
pub use config::CoreConfig;
pub use control::{Block, Input, Output, Signal, TimeDomain};
pub use core::{now_nsec, runnable_ref, LogLevel, Logger, Runnable, RunnableRef};
pub use error::{Result, TaktError, TaktResult};
pub use hal::{Hal, HalInput, HalOutput};
pub use safety::{
    EventVisibility, SafetyEvent, SafetyLevel, SafetyProperties, SafetySystem,
};
pub use scheduling::{
    Counter, CycleSource, EventSource, Executor, HarmonicTaskList, Lambda, Periodic,
    SyncSourceKind, TimeSource, BASE_PRIORITY,
};

// tlog macro is available at crate root via #[macro_export]
