//! Dataflow engine: typed signal ports, blocks and time domains.

pub mod block;
pub mod signal;
pub mod timedomain;

pub use block::Block;
pub use signal::{Input, Output, Signal};
pub use timedomain::TimeDomain;
