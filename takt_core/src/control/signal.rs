//! Typed signal ports connecting control blocks.
//!
//! An [`Output`] owns the current value of a signal together with the
//! timestamp of its last write. An [`Input`] is a read-through reference to
//! some output: connecting does not copy anything, reading returns whatever
//! the producing block wrote last. On cross-thread edges this means a reader
//! may observe a value up to one producer period old, which the control
//! semantics tolerate; the lock gives the write/read pair release/acquire
//! ordering.

use crate::core::now_nsec;
use parking_lot::RwLock;
use std::sync::Arc;

/// A signal sample: value plus the monotonic timestamp of the write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signal<T> {
    pub value: T,
    /// Nanoseconds since process start, see [`now_nsec`]
    pub timestamp: u64,
}

impl<T> Signal<T> {
    pub fn new(value: T) -> Self {
        Signal {
            value,
            timestamp: now_nsec(),
        }
    }
}

pub(crate) type SignalCell<T> = Arc<RwLock<Signal<T>>>;

/// The producing end of a signal edge. Owned by the block that computes the
/// value; cheap to clone.
#[derive(Debug, Clone)]
pub struct Output<T: Clone> {
    signal: SignalCell<T>,
}

impl<T: Clone> Output<T> {
    pub fn new(initial: T) -> Self {
        Output {
            signal: Arc::new(RwLock::new(Signal {
                value: initial,
                timestamp: 0,
            })),
        }
    }

    /// Publish a new value, stamping it with the current monotonic time.
    pub fn set(&self, value: T) {
        let mut guard = self.signal.write();
        guard.value = value;
        guard.timestamp = now_nsec();
    }

    /// Current sample.
    pub fn get(&self) -> Signal<T> {
        self.signal.read().clone()
    }

    pub(crate) fn cell(&self) -> SignalCell<T> {
        self.signal.clone()
    }
}

impl<T: Clone + Default> Default for Output<T> {
    fn default() -> Self {
        Output::new(T::default())
    }
}

/// The consuming end of a signal edge. Unconnected until [`Input::connect`]
/// is called; reading an unconnected input yields `None`.
#[derive(Debug, Clone, Default)]
pub struct Input<T: Clone> {
    source: Option<SignalCell<T>>,
}

impl<T: Clone> Input<T> {
    pub fn new() -> Self {
        Input { source: None }
    }

    /// Connect this input to an output. Reconnecting replaces the edge.
    pub fn connect(&mut self, output: &Output<T>) {
        self.source = Some(output.cell());
    }

    pub fn is_connected(&self) -> bool {
        self.source.is_some()
    }

    /// Read the connected output's current sample.
    pub fn get(&self) -> Option<Signal<T>> {
        self.source.as_ref().map(|cell| cell.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_set_get() {
        let out = Output::new(0.0f64);
        out.set(2.5);
        let sig = out.get();
        assert_eq!(sig.value, 2.5);
        assert!(sig.timestamp > 0);
    }

    #[test]
    fn test_input_reads_through() {
        let out = Output::new(1u32);
        let mut input = Input::new();
        assert!(!input.is_connected());
        assert!(input.get().is_none());

        input.connect(&out);
        assert_eq!(input.get().unwrap().value, 1);

        out.set(7);
        // No copy happened at connect time: the input sees the new value
        assert_eq!(input.get().unwrap().value, 7);
    }

    #[test]
    fn test_timestamp_advances_on_write() {
        let out = Output::new(false);
        out.set(true);
        let first = out.get().timestamp;
        out.set(false);
        assert!(out.get().timestamp >= first);
    }

    #[test]
    fn test_cross_thread_visibility() {
        let out = Output::new(0i64);
        let mut input = Input::new();
        input.connect(&out);

        let writer = {
            let out = out.clone();
            std::thread::spawn(move || {
                for i in 1..=100 {
                    out.set(i);
                }
            })
        };
        writer.join().unwrap();
        assert_eq!(input.get().unwrap().value, 100);
    }
}
