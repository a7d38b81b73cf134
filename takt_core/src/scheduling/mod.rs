//! Realtime task scheduling: counters, periodic descriptors, harmonic
//! decomposition, worker threads and the executor.

pub mod counter;
pub mod executor;
pub mod harmonic;
pub mod periodic;

mod async_task;

pub use counter::{Counter, Monitor, TimeStats};
pub use executor::{
    CycleSource, EventSource, Executor, SyncSourceKind, TimeSource, BASE_PRIORITY,
};
pub use harmonic::HarmonicTaskList;
pub use periodic::{Lambda, Periodic};
