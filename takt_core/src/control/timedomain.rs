//! Ordered container of blocks sharing one period.

use crate::control::Block;
use crate::core::Runnable;
use parking_lot::Mutex;
use std::sync::Arc;

/// An ordered sequence of blocks executed as one schedulable unit.
///
/// The order blocks were added is the order they run each tick. Callers are
/// responsible for making that order a valid topological order of the port
/// connections; back-edges are legal and read the previous tick's value.
pub struct TimeDomain {
    name: String,
    period: f64,
    realtime: bool,
    blocks: Vec<Arc<Mutex<dyn Block>>>,
}

impl TimeDomain {
    pub fn new(name: &str, period: f64, realtime: bool) -> Self {
        TimeDomain {
            name: name.to_string(),
            period,
            realtime,
            blocks: Vec::new(),
        }
    }

    /// Append a block to the run order.
    pub fn add_block(&mut self, block: Arc<Mutex<dyn Block>>) {
        self.blocks.push(block);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn realtime(&self) -> bool {
        self.realtime
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

impl Runnable for TimeDomain {
    fn run(&mut self) {
        for block in &self.blocks {
            block.lock().run();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        name: String,
        order: Arc<Mutex<Vec<String>>>,
        runs: Arc<AtomicUsize>,
    }

    impl Runnable for Probe {
        fn run(&mut self) {
            self.order.lock().push(self.name.clone());
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Block for Probe {
        fn name(&self) -> &str {
            &self.name
        }
    }

    #[test]
    fn test_blocks_run_in_insertion_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let runs = Arc::new(AtomicUsize::new(0));

        let mut td = TimeDomain::new("control", 0.001, true);
        for name in ["sense", "filter", "act"] {
            td.add_block(Arc::new(Mutex::new(Probe {
                name: name.to_string(),
                order: order.clone(),
                runs: runs.clone(),
            })));
        }

        td.run();
        td.run();

        assert_eq!(runs.load(Ordering::SeqCst), 6);
        let seen = order.lock();
        assert_eq!(
            *seen,
            vec!["sense", "filter", "act", "sense", "filter", "act"]
        );
    }

    #[test]
    fn test_empty_domain_runs() {
        let mut td = TimeDomain::new("empty", 0.01, false);
        td.run();
        assert_eq!(td.block_count(), 0);
        assert!(!td.realtime());
        assert_eq!(td.period(), 0.01);
    }
}
