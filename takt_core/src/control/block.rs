//! The atomic unit of dataflow.
//!
//! A block computes once per period of its enclosing time domain: it reads its
//! inputs, runs, and writes its outputs. Concrete block libraries (filters,
//! integrators, peripheral I/O) live outside the core; the core only defines
//! the contract the scheduler drives.

use crate::core::Runnable;

/// A named runnable with typed ports.
///
/// Blocks never observe their own output within the same tick; visibility
/// between blocks is defined solely by their insertion order in the owning
/// [`TimeDomain`](crate::control::TimeDomain).
pub trait Block: Runnable {
    fn name(&self) -> &str;
}
