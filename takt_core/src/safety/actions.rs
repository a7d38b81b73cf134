//! Input and output actions attached to safety levels.
//!
//! Input actions are evaluated in registration order on every tick while
//! their level is current; the first one that fires enqueues its event and
//! ends evaluation for that tick. Output actions drive the critical outputs
//! of the current level after event processing.

use crate::hal::{HalInput, HalOutput};
use crate::safety::SafetyEvent;

/// One entry in a level's input-action list.
pub trait InputAction: Send {
    /// Latch the current channel value; called while the input snapshot is
    /// taken at the start of the tick.
    fn sample(&mut self);
    /// Evaluate the latched value; `Some(event)` fires the event.
    fn fire(&self) -> Option<SafetyEvent>;
    fn input_name(&self) -> &str;
}

/// One entry in a level's output-action list.
pub trait OutputAction: Send {
    fn apply(&self);
    fn output_name(&self) -> &str;
}

struct Ignore<T: Clone + Send + Sync> {
    input: HalInput<T>,
}

impl<T: Clone + Send + Sync> InputAction for Ignore<T> {
    fn sample(&mut self) {}

    fn fire(&self) -> Option<SafetyEvent> {
        None
    }

    fn input_name(&self) -> &str {
        self.input.name()
    }
}

struct Check<T: PartialEq + Clone + Send + Sync> {
    input: HalInput<T>,
    expected: T,
    event: SafetyEvent,
    latched: T,
}

impl<T: PartialEq + Clone + Send + Sync> InputAction for Check<T> {
    fn sample(&mut self) {
        self.latched = self.input.get().value;
    }

    fn fire(&self) -> Option<SafetyEvent> {
        if self.latched != self.expected {
            Some(self.event)
        } else {
            None
        }
    }

    fn input_name(&self) -> &str {
        self.input.name()
    }
}

struct RangeCheck<T: PartialOrd + Clone + Send + Sync> {
    input: HalInput<T>,
    low: T,
    high: T,
    event: SafetyEvent,
    latched: T,
}

impl<T: PartialOrd + Clone + Send + Sync> InputAction for RangeCheck<T> {
    fn sample(&mut self) {
        self.latched = self.input.get().value;
    }

    fn fire(&self) -> Option<SafetyEvent> {
        if self.latched < self.low || self.latched > self.high {
            Some(self.event)
        } else {
            None
        }
    }

    fn input_name(&self) -> &str {
        self.input.name()
    }
}

/// The input plays no role in this level.
pub fn ignore<T: Clone + Send + Sync + 'static>(input: HalInput<T>) -> Box<dyn InputAction> {
    Box::new(Ignore { input })
}

/// Fire `event` whenever the input deviates from `expected`.
pub fn check<T: PartialEq + Clone + Send + Sync + 'static>(
    input: HalInput<T>,
    expected: T,
    event: SafetyEvent,
) -> Box<dyn InputAction> {
    let latched = input.get().value;
    Box::new(Check {
        input,
        expected,
        event,
        latched,
    })
}

/// Fire `event` whenever the input leaves the closed interval `[low, high]`.
pub fn range_check<T: PartialOrd + Clone + Send + Sync + 'static>(
    input: HalInput<T>,
    low: T,
    high: T,
    event: SafetyEvent,
) -> Box<dyn InputAction> {
    let latched = input.get().value;
    Box::new(RangeCheck {
        input,
        low,
        high,
        event,
        latched,
    })
}

struct SetOutput<T: Clone + Send + Sync> {
    output: HalOutput<T>,
    value: T,
}

impl<T: Clone + Send + Sync> OutputAction for SetOutput<T> {
    fn apply(&self) {
        self.output.set(self.value.clone());
    }

    fn output_name(&self) -> &str {
        self.output.name()
    }
}

struct LeaveOutput<T: Clone + Send + Sync> {
    output: HalOutput<T>,
}

impl<T: Clone + Send + Sync> OutputAction for LeaveOutput<T> {
    fn apply(&self) {}

    fn output_name(&self) -> &str {
        self.output.name()
    }
}

/// Drive the output to a fixed value while the level is current.
pub fn set<T: Clone + Send + Sync + 'static>(output: HalOutput<T>, value: T) -> Box<dyn OutputAction> {
    Box::new(SetOutput { output, value })
}

/// Keep whatever the output currently carries.
pub fn leave<T: Clone + Send + Sync + 'static>(output: HalOutput<T>) -> Box<dyn OutputAction> {
    Box::new(LeaveOutput { output })
}
