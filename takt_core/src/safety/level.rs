//! Safety levels: the states of the safety state machine.

use crate::safety::actions::{InputAction, OutputAction};
use crate::safety::system::SafetyContext;
use crate::safety::SafetyEvent;
use std::collections::HashMap;

/// Whether a transition may be triggered by any caller or only from within
/// the safety system's own actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventVisibility {
    Public,
    Private,
}

/// Callback invoked on every tick while its level is current.
pub type LevelAction = Box<dyn FnMut(&mut SafetyContext) + Send>;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Transition {
    pub target: u32,
    pub visibility: EventVisibility,
}

/// One state of the safety state machine.
///
/// Levels are ordered by registration in [`SafetyProperties`]; that order
/// defines "and above" for [`SafetyProperties::add_event_to_level_and_above`].
///
/// [`SafetyProperties`]: crate::safety::SafetyProperties
/// [`SafetyProperties::add_event_to_level_and_above`]: crate::safety::SafetyProperties::add_event_to_level_and_above
pub struct SafetyLevel {
    id: u32,
    description: String,
    pub(crate) input_actions: Vec<Box<dyn InputAction>>,
    pub(crate) output_actions: Vec<Box<dyn OutputAction>>,
    pub(crate) level_action: Option<LevelAction>,
    pub(crate) transitions: HashMap<SafetyEvent, Transition>,
}

impl SafetyLevel {
    pub fn new(id: u32, description: &str) -> Self {
        SafetyLevel {
            id,
            description: description.to_string(),
            input_actions: Vec::new(),
            output_actions: Vec::new(),
            level_action: None,
            transitions: HashMap::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Declare that `event` moves the machine from this level to `target`.
    /// Re-declaring an event replaces the previous transition.
    pub fn add_event(&mut self, event: SafetyEvent, target: u32, visibility: EventVisibility) {
        self.transitions
            .insert(event, Transition { target, visibility });
    }

    /// Input checks evaluated each tick, in order; the first hit wins.
    pub fn set_input_actions(&mut self, actions: Vec<Box<dyn InputAction>>) {
        self.input_actions = actions;
    }

    /// Output drives applied each tick after event processing.
    pub fn set_output_actions(&mut self, actions: Vec<Box<dyn OutputAction>>) {
        self.output_actions = actions;
    }

    /// Callback run every tick while this level is current. It may enqueue
    /// private events through the passed context; they are processed on the
    /// next tick.
    pub fn set_level_action(&mut self, action: impl FnMut(&mut SafetyContext) + Send + 'static) {
        self.level_action = Some(Box::new(action));
    }

    pub(crate) fn transition_for(&self, event: SafetyEvent) -> Option<Transition> {
        self.transitions.get(&event).copied()
    }

    pub(crate) fn declares_private(&self, event: SafetyEvent) -> bool {
        matches!(
            self.transitions.get(&event),
            Some(Transition {
                visibility: EventVisibility::Private,
                ..
            })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_event_replaces_transition() {
        let stop = SafetyEvent::new("stop");
        let mut level = SafetyLevel::new(10, "running");

        level.add_event(stop, 20, EventVisibility::Public);
        level.add_event(stop, 30, EventVisibility::Private);

        let transition = level.transition_for(stop).unwrap();
        assert_eq!(transition.target, 30);
        assert!(level.declares_private(stop));
    }

    #[test]
    fn test_unknown_event_has_no_transition() {
        let level = SafetyLevel::new(0, "off");
        assert!(level.transition_for(SafetyEvent::new("phantom")).is_none());
        assert!(!level.declares_private(SafetyEvent::new("phantom")));
    }
}
