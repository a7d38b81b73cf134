//! The safety system: sampling, event processing and output driving.

use crate::core::tlog::Logger;
use crate::core::Runnable;
use crate::error::{Result, TaktError};
use crate::hal::{HalInput, HalOutput};
use crate::safety::level::{EventVisibility, SafetyLevel};
use crate::safety::SafetyEvent;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A critical input channel the safety system samples every tick.
pub enum CriticalInput {
    Logic(HalInput<bool>),
    Real(HalInput<f64>),
}

impl CriticalInput {
    pub fn name(&self) -> &str {
        match self {
            CriticalInput::Logic(input) => input.name(),
            CriticalInput::Real(input) => input.name(),
        }
    }

    fn sample(&self) -> InputSample {
        match self {
            CriticalInput::Logic(input) => InputSample::Logic(input.get().value),
            CriticalInput::Real(input) => InputSample::Real(input.get().value),
        }
    }
}

/// A critical output channel the safety system is authorized to drive.
pub enum CriticalOutput {
    Logic(HalOutput<bool>),
    Real(HalOutput<f64>),
}

impl CriticalOutput {
    pub fn name(&self) -> &str {
        match self {
            CriticalOutput::Logic(output) => output.name(),
            CriticalOutput::Real(output) => output.name(),
        }
    }
}

/// One sampled critical input value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputSample {
    Logic(bool),
    Real(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventOrigin {
    /// Enqueued by an outside caller through `trigger_event`
    External,
    /// Enqueued by an input action or level action of this system
    Internal,
}

/// Handle passed to level actions, permitting private event triggering.
/// Events enqueued here are processed on the next tick.
pub struct SafetyContext<'a> {
    pending: &'a mut VecDeque<(SafetyEvent, EventOrigin)>,
}

impl SafetyContext<'_> {
    pub fn trigger_event(&mut self, event: SafetyEvent) {
        self.pending.push_back((event, EventOrigin::Internal));
    }
}

/// Declarative description of a safety state machine: its levels, entry
/// level and the critical I/O it owns.
#[derive(Default)]
pub struct SafetyProperties {
    levels: Vec<SafetyLevel>,
    pub entry_level: Option<u32>,
    pub critical_inputs: Vec<CriticalInput>,
    pub critical_outputs: Vec<CriticalOutput>,
}

impl SafetyProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a level. Registration order defines the level ordering used
    /// by [`add_event_to_level_and_above`].
    ///
    /// [`add_event_to_level_and_above`]: SafetyProperties::add_event_to_level_and_above
    pub fn add_level(&mut self, level: SafetyLevel) {
        self.levels.push(level);
    }

    pub fn level_mut(&mut self, id: u32) -> Option<&mut SafetyLevel> {
        self.levels.iter_mut().find(|level| level.id() == id)
    }

    /// Register the same transition on `from` and every level registered at
    /// or after it.
    pub fn add_event_to_level_and_above(
        &mut self,
        from: u32,
        event: SafetyEvent,
        target: u32,
        visibility: EventVisibility,
    ) -> Result<()> {
        let position = self
            .levels
            .iter()
            .position(|level| level.id() == from)
            .ok_or_else(|| {
                TaktError::SafetyProperties(format!("unknown level {} for event registration", from))
            })?;
        for level in &mut self.levels[position..] {
            level.add_event(event, target, visibility);
        }
        Ok(())
    }
}

/// Read-only observer of the current safety level, valid from any thread.
/// Reads are atomic: an observer sees either the pre- or post-tick level,
/// never an intermediate state.
#[derive(Clone)]
pub struct LevelObserver(Arc<AtomicU32>);

impl LevelObserver {
    pub fn current(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Periodic state machine over a set of [`SafetyLevel`]s.
///
/// Exactly one level is current at any instant; transitions happen only
/// between ticks, driven by queued events.
pub struct SafetySystem {
    levels: Vec<SafetyLevel>,
    level_index: HashMap<u32, usize>,
    current: usize,
    current_id: Arc<AtomicU32>,
    queue: VecDeque<(SafetyEvent, EventOrigin)>,
    critical_inputs: Vec<CriticalInput>,
    critical_outputs: Vec<CriticalOutput>,
    snapshot: Vec<InputSample>,
    period: f64,
    log: Logger,
}

impl SafetySystem {
    /// Validate the properties and enter the entry level.
    pub fn new(properties: SafetyProperties, period: f64) -> Result<Self> {
        let SafetyProperties {
            levels,
            entry_level,
            critical_inputs,
            critical_outputs,
        } = properties;

        if levels.is_empty() {
            return Err(TaktError::SafetyProperties("no levels defined".to_string()));
        }

        let mut level_index = HashMap::new();
        for (position, level) in levels.iter().enumerate() {
            if level_index.insert(level.id(), position).is_some() {
                return Err(TaktError::SafetyProperties(format!(
                    "duplicate level id {}",
                    level.id()
                )));
            }
        }

        for level in &levels {
            for transition in level.transitions.values() {
                if !level_index.contains_key(&transition.target) {
                    return Err(TaktError::SafetyProperties(format!(
                        "level {} declares a transition to unknown level {}",
                        level.id(),
                        transition.target
                    )));
                }
            }
        }

        let entry = entry_level
            .ok_or_else(|| TaktError::SafetyProperties("no entry level defined".to_string()))?;
        let current = *level_index.get(&entry).ok_or_else(|| {
            TaktError::SafetyProperties(format!("entry level {} is not registered", entry))
        })?;

        Ok(SafetySystem {
            levels,
            level_index,
            current,
            current_id: Arc::new(AtomicU32::new(entry)),
            queue: VecDeque::new(),
            critical_inputs,
            critical_outputs,
            snapshot: Vec::new(),
            period,
            log: Logger::get('S'),
        })
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    /// Id of the current level.
    pub fn current_level(&self) -> u32 {
        self.current_id.load(Ordering::SeqCst)
    }

    /// Detached observer usable without locking the system.
    pub fn level_observer(&self) -> LevelObserver {
        LevelObserver(self.current_id.clone())
    }

    /// Critical input values sampled on the last tick, in registration order.
    pub fn last_snapshot(&self) -> &[InputSample] {
        &self.snapshot
    }

    pub fn critical_outputs(&self) -> &[CriticalOutput] {
        &self.critical_outputs
    }

    /// Enqueue a public event from outside the safety system. Fails when the
    /// current level declares the event private.
    pub fn trigger_event(&mut self, event: SafetyEvent) -> Result<()> {
        if self.levels[self.current].declares_private(event) {
            return Err(TaktError::PrivateEventViolation(event.name().to_string()));
        }
        self.queue.push_back((event, EventOrigin::External));
        Ok(())
    }

    /// One tick of the state machine: sample, evaluate, drain, act, drive.
    fn tick(&mut self) -> Result<()> {
        // 1. Sample critical inputs into the snapshot, then latch the current
        //    level's input actions against the same instant.
        self.snapshot.clear();
        for input in &self.critical_inputs {
            self.snapshot.push(input.sample());
        }
        for action in self.levels[self.current].input_actions.iter_mut() {
            action.sample();
        }

        // 2. First firing input action enqueues its event and ends evaluation.
        let mut fired = None;
        for action in &self.levels[self.current].input_actions {
            if let Some(event) = action.fire() {
                fired = Some(event);
                break;
            }
        }
        if let Some(event) = fired {
            self.queue.push_back((event, EventOrigin::Internal));
        }

        // 3. Drain the queue in FIFO order.
        while let Some((event, origin)) = self.queue.pop_front() {
            match self.levels[self.current].transition_for(event) {
                Some(transition) => {
                    if transition.visibility == EventVisibility::Private
                        && origin == EventOrigin::External
                    {
                        return Err(TaktError::PrivateEventViolation(event.name().to_string()));
                    }
                    match self.level_index.get(&transition.target) {
                        Some(&target_index) => {
                            self.log.trace(format!(
                                "level change {} -> {} on event '{}'",
                                self.levels[self.current].id(),
                                transition.target,
                                event.name()
                            ));
                            self.current = target_index;
                            self.current_id.store(transition.target, Ordering::SeqCst);
                        }
                        None => self.log.error(format!(
                            "transition target level {} disappeared",
                            transition.target
                        )),
                    }
                }
                None => self.log.warn(format!(
                    "dropping event '{}' without transition in level {}",
                    event.name(),
                    self.levels[self.current].id()
                )),
            }
        }

        // 4. Level action of the (possibly new) current level. Private events
        //    it triggers stay queued for the next tick.
        let mut action = self.levels[self.current].level_action.take();
        if let Some(f) = action.as_mut() {
            let mut context = SafetyContext {
                pending: &mut self.queue,
            };
            f(&mut context);
        }
        self.levels[self.current].level_action = action;

        // 5. Drive critical outputs per the current level's action table.
        for output_action in &self.levels[self.current].output_actions {
            output_action.apply();
        }

        Ok(())
    }
}

impl Runnable for SafetySystem {
    fn run(&mut self) {
        if let Err(e) = self.tick() {
            self.log.error(format!("safety tick failed: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::Hal;
    use crate::safety::actions;

    const OFF: u32 = 0;
    const ON: u32 = 10;
    const EMERGENCY: u32 = 20;

    fn three_level_properties(
        power_up: SafetyEvent,
        do_emergency: SafetyEvent,
        estop_channel: &str,
    ) -> SafetyProperties {
        let hal = Hal::instance();
        let estop = hal.add_logic_input(estop_channel);
        // Normally-closed chain: false means released
        estop.write(false);

        let mut properties = SafetyProperties::new();
        properties.add_level(SafetyLevel::new(OFF, "software off"));
        properties.add_level(SafetyLevel::new(ON, "system on"));
        properties.add_level(SafetyLevel::new(EMERGENCY, "emergency stop"));

        let level = properties.level_mut(OFF).unwrap();
        level.add_event(power_up, ON, EventVisibility::Public);

        let level = properties.level_mut(ON).unwrap();
        level.add_event(do_emergency, EMERGENCY, EventVisibility::Public);
        level.set_input_actions(vec![actions::check(
            hal.logic_input(estop_channel).unwrap(),
            false,
            do_emergency,
        )]);

        properties.critical_inputs = vec![CriticalInput::Logic(
            hal.logic_input(estop_channel).unwrap(),
        )];
        properties.entry_level = Some(OFF);
        properties
    }

    #[test]
    fn test_entry_level_is_current() {
        let power_up = SafetyEvent::new("powerUp");
        let do_emergency = SafetyEvent::new("doEmergency");
        let system = SafetySystem::new(
            three_level_properties(power_up, do_emergency, "safety-sys.entry.estop"),
            0.001,
        )
        .unwrap();

        assert_eq!(system.current_level(), OFF);
        assert_eq!(system.period(), 0.001);
    }

    #[test]
    fn test_public_event_transitions_between_ticks() {
        let power_up = SafetyEvent::new("powerUp");
        let do_emergency = SafetyEvent::new("doEmergency");
        let mut system = SafetySystem::new(
            three_level_properties(power_up, do_emergency, "safety-sys.public.estop"),
            0.001,
        )
        .unwrap();

        system.trigger_event(power_up).unwrap();
        // The transition happens inside the tick, not at enqueue time
        assert_eq!(system.current_level(), OFF);
        system.run();
        assert_eq!(system.current_level(), ON);
    }

    #[test]
    fn test_input_check_fires_next_tick() {
        let power_up = SafetyEvent::new("powerUp");
        let do_emergency = SafetyEvent::new("doEmergency");
        let channel = "safety-sys.estop-fires.estop";
        let mut system =
            SafetySystem::new(three_level_properties(power_up, do_emergency, channel), 0.001)
                .unwrap();

        system.trigger_event(power_up).unwrap();
        system.run();
        assert_eq!(system.current_level(), ON);

        for _ in 0..49 {
            system.run();
        }
        assert_eq!(system.current_level(), ON);

        // Chain opens at tick 50; level changes on tick 51
        Hal::instance()
            .logic_input(channel)
            .unwrap()
            .write(true);
        system.run();
        assert_eq!(system.current_level(), EMERGENCY);
        assert_eq!(system.last_snapshot(), &[InputSample::Logic(true)]);
    }

    #[test]
    fn test_event_without_transition_is_dropped() {
        let power_up = SafetyEvent::new("powerUp");
        let do_emergency = SafetyEvent::new("doEmergency");
        let stray = SafetyEvent::new("stray");
        let mut system = SafetySystem::new(
            three_level_properties(power_up, do_emergency, "safety-sys.drop.estop"),
            0.001,
        )
        .unwrap();

        system.trigger_event(stray).unwrap();
        system.run();
        assert_eq!(system.current_level(), OFF);
    }

    #[test]
    fn test_private_event_rejected_externally() {
        let start_done = SafetyEvent::new("startDone");

        let mut properties = SafetyProperties::new();
        properties.add_level(SafetyLevel::new(0, "starting"));
        properties.add_level(SafetyLevel::new(1, "running"));
        properties
            .level_mut(0)
            .unwrap()
            .add_event(start_done, 1, EventVisibility::Private);
        properties.entry_level = Some(0);

        let mut system = SafetySystem::new(properties, 0.001).unwrap();
        let err = system.trigger_event(start_done).unwrap_err();
        assert!(matches!(err, TaktError::PrivateEventViolation(_)));
        assert_eq!(system.current_level(), 0);
    }

    #[test]
    fn test_level_action_private_event_lands_next_tick() {
        let start_done = SafetyEvent::new("autoAdvance");

        let mut properties = SafetyProperties::new();
        properties.add_level(SafetyLevel::new(0, "starting"));
        properties.add_level(SafetyLevel::new(1, "running"));
        let level = properties.level_mut(0).unwrap();
        level.add_event(start_done, 1, EventVisibility::Private);
        level.set_level_action(move |context| context.trigger_event(start_done));
        properties.entry_level = Some(0);

        let mut system = SafetySystem::new(properties, 0.001).unwrap();

        // Tick 1 runs the level action; its event is processed on tick 2
        system.run();
        assert_eq!(system.current_level(), 0);
        system.run();
        assert_eq!(system.current_level(), 1);
    }

    #[test]
    fn test_add_event_to_level_and_above() {
        let emergency = SafetyEvent::new("globalEmergency");

        let mut properties = SafetyProperties::new();
        properties.add_level(SafetyLevel::new(0, "off"));
        properties.add_level(SafetyLevel::new(10, "on"));
        properties.add_level(SafetyLevel::new(30, "moving"));
        properties.add_level(SafetyLevel::new(90, "emergency"));
        properties
            .add_event_to_level_and_above(10, emergency, 90, EventVisibility::Public)
            .unwrap();
        properties.entry_level = Some(30);

        let mut system = SafetySystem::new(properties, 0.01).unwrap();
        system.trigger_event(emergency).unwrap();
        system.run();
        assert_eq!(system.current_level(), 90);
    }

    #[test]
    fn test_event_below_registration_point_is_not_added() {
        let emergency = SafetyEvent::new("scopedEmergency");

        let mut properties = SafetyProperties::new();
        properties.add_level(SafetyLevel::new(0, "off"));
        properties.add_level(SafetyLevel::new(10, "on"));
        properties.add_level(SafetyLevel::new(90, "emergency"));
        properties
            .add_event_to_level_and_above(10, emergency, 90, EventVisibility::Public)
            .unwrap();
        properties.entry_level = Some(0);

        let mut system = SafetySystem::new(properties, 0.01).unwrap();
        // Level 0 was registered before level 10 and must not know the event
        system.trigger_event(emergency).unwrap();
        system.run();
        assert_eq!(system.current_level(), 0);
    }

    #[test]
    fn test_outputs_driven_per_level() {
        let hal = Hal::instance();
        let enable = hal.add_logic_output("safety-sys.outputs.enable");
        enable.set(true);
        let go = SafetyEvent::new("go");

        let mut properties = SafetyProperties::new();
        properties.add_level(SafetyLevel::new(0, "off"));
        properties.add_level(SafetyLevel::new(1, "on"));
        let off = properties.level_mut(0).unwrap();
        off.add_event(go, 1, EventVisibility::Public);
        off.set_output_actions(vec![actions::set(
            hal.logic_output("safety-sys.outputs.enable").unwrap(),
            false,
        )]);
        properties
            .level_mut(1)
            .unwrap()
            .set_output_actions(vec![actions::set(
                hal.logic_output("safety-sys.outputs.enable").unwrap(),
                true,
            )]);
        properties.critical_outputs = vec![CriticalOutput::Logic(
            hal.logic_output("safety-sys.outputs.enable").unwrap(),
        )];
        properties.entry_level = Some(0);

        let mut system = SafetySystem::new(properties, 0.001).unwrap();
        system.run();
        assert!(!enable.get().value);

        system.trigger_event(go).unwrap();
        system.run();
        assert!(enable.get().value);
        assert_eq!(system.critical_outputs().len(), 1);
    }

    #[test]
    fn test_level_observer_reads_without_lock() {
        let power_up = SafetyEvent::new("powerUp");
        let do_emergency = SafetyEvent::new("doEmergency");
        let mut system = SafetySystem::new(
            three_level_properties(power_up, do_emergency, "safety-sys.observer.estop"),
            0.001,
        )
        .unwrap();

        let observer = system.level_observer();
        assert_eq!(observer.current(), OFF);

        system.trigger_event(power_up).unwrap();
        system.run();
        assert_eq!(observer.current(), ON);
    }

    #[test]
    fn test_validation_rejects_bad_properties() {
        // No levels
        assert!(matches!(
            SafetySystem::new(SafetyProperties::new(), 0.001),
            Err(TaktError::SafetyProperties(_))
        ));

        // Duplicate ids
        let mut properties = SafetyProperties::new();
        properties.add_level(SafetyLevel::new(5, "a"));
        properties.add_level(SafetyLevel::new(5, "b"));
        properties.entry_level = Some(5);
        assert!(matches!(
            SafetySystem::new(properties, 0.001),
            Err(TaktError::SafetyProperties(_))
        ));

        // Missing entry level
        let mut properties = SafetyProperties::new();
        properties.add_level(SafetyLevel::new(5, "a"));
        assert!(matches!(
            SafetySystem::new(properties, 0.001),
            Err(TaktError::SafetyProperties(_))
        ));

        // Dangling transition target
        let mut properties = SafetyProperties::new();
        let ghost = SafetyEvent::new("ghost");
        properties.add_level(SafetyLevel::new(5, "a"));
        properties
            .level_mut(5)
            .unwrap()
            .add_event(ghost, 99, EventVisibility::Public);
        properties.entry_level = Some(5);
        assert!(matches!(
            SafetySystem::new(properties, 0.001),
            Err(TaktError::SafetyProperties(_))
        ));
    }
}
