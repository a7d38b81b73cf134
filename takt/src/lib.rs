//! # Takt
//!
//! Facade crate for the takt robotics runtime. Re-exports the execution core
//! so applications depend on a single crate:
//!
//! ```rust,no_run
//! use takt::{Executor, Periodic};
//!
//! let executor = Executor::instance();
//! executor.set_period(0.001).unwrap();
//! executor.run().unwrap();
//! ```

pub use takt_core::*;

// Re-export the core crate itself for paths inside macro expansions
pub use takt_core;
