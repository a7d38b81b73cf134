//! Hierarchical safety state machine.
//!
//! A [`SafetySystem`] owns an ordered list of [`SafetyLevel`]s, samples
//! critical inputs each tick, evaluates the current level's input actions,
//! processes queued [`SafetyEvent`]s and drives critical outputs. It is
//! scheduled as the executor's main task, so it always sees the freshest
//! base-period data before it evaluates transitions.

pub mod actions;
pub mod level;
pub mod system;

pub use actions::{check, ignore, leave, range_check, set, InputAction, OutputAction};
pub use level::{EventVisibility, SafetyLevel};
pub use system::{
    CriticalInput, CriticalOutput, InputSample, LevelObserver, SafetyContext, SafetyProperties,
    SafetySystem,
};

use std::sync::atomic::{AtomicU32, Ordering};

/// Identifier naming a transition trigger. Events carry no payload; equality
/// is by identity, the name is diagnostic.
#[derive(Debug, Clone, Copy, Eq)]
pub struct SafetyEvent {
    id: u32,
    name: &'static str,
}

impl SafetyEvent {
    pub fn new(name: &'static str) -> Self {
        static NEXT_ID: AtomicU32 = AtomicU32::new(0);
        SafetyEvent {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for SafetyEvent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl std::hash::Hash for SafetyEvent {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
