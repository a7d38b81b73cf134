//! A minimal conveyor application: one control time domain, a safety system
//! with three levels, and a simulated emergency-stop chain.
//!
//! Run with: cargo run --example conveyor

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use takt_core::safety::{actions, CriticalInput, SafetyProperties};
use takt_core::{
    Block, EventVisibility, Executor, Hal, Input, Output, Runnable, SafetyEvent, SafetyLevel,
    SafetySystem, TimeDomain,
};

const OFF: u32 = 0;
const RUNNING: u32 = 10;
const EMERGENCY: u32 = 90;

/// First-order low-pass on the measured belt speed.
struct SpeedFilter {
    alpha: f64,
    state: f64,
    pub input: Input<f64>,
    pub output: Output<f64>,
}

impl Runnable for SpeedFilter {
    fn run(&mut self) {
        if let Some(sample) = self.input.get() {
            self.state += self.alpha * (sample.value - self.state);
            self.output.set(self.state);
        }
    }
}

impl Block for SpeedFilter {
    fn name(&self) -> &str {
        "speed filter"
    }
}

fn main() -> takt_core::Result<()> {
    let hal = Hal::instance();
    // A real application registers these from a hardware backend
    let estop = hal.add_logic_input("conveyor.estop");
    let speed_raw = hal.add_real_input("conveyor.speed");
    hal.add_logic_output("conveyor.enable");
    estop.write(false);

    // Control graph at 1 kHz
    let source = Output::new(0.0);
    let mut filter = SpeedFilter {
        alpha: 0.1,
        state: 0.0,
        input: Input::new(),
        output: Output::new(0.0),
    };
    filter.input.connect(&source);

    let mut timedomain = TimeDomain::new("belt control", 0.001, true);
    timedomain.add_block(Arc::new(Mutex::new(filter)));
    let timedomain = Arc::new(Mutex::new(timedomain));

    // Safety state machine at the same period
    let power_up = SafetyEvent::new("powerUp");
    let do_emergency = SafetyEvent::new("doEmergency");

    let mut properties = SafetyProperties::new();
    properties.add_level(SafetyLevel::new(OFF, "belt off"));
    properties.add_level(SafetyLevel::new(RUNNING, "belt running"));
    properties.add_level(SafetyLevel::new(EMERGENCY, "emergency stop"));

    let off = properties.level_mut(OFF).expect("level registered above");
    off.add_event(power_up, RUNNING, EventVisibility::Public);
    off.set_output_actions(vec![actions::set(hal.logic_output("conveyor.enable")?, false)]);

    let running = properties.level_mut(RUNNING).expect("level registered above");
    running.set_input_actions(vec![actions::check(
        hal.logic_input("conveyor.estop")?,
        false,
        do_emergency,
    )]);
    running.set_output_actions(vec![actions::set(hal.logic_output("conveyor.enable")?, true)]);

    properties.add_event_to_level_and_above(RUNNING, do_emergency, EMERGENCY, EventVisibility::Public)?;
    properties.critical_inputs = vec![CriticalInput::Logic(hal.logic_input("conveyor.estop")?)];
    properties.entry_level = Some(OFF);

    let safety_system = Arc::new(Mutex::new(SafetySystem::new(properties, 0.001)?));
    let observer = safety_system.lock().level_observer();

    let executor = Executor::instance();
    executor.add_time_domain(&timedomain);
    executor.set_safety_system(&safety_system)?;

    // Simulate the plant from a background thread
    {
        let safety_system = safety_system.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            safety_system.lock().trigger_event(power_up).ok();

            for i in 0..200 {
                speed_raw.write(0.35 * (i as f64 / 200.0));
                source.set(speed_raw.get().value);
                std::thread::sleep(Duration::from_millis(10));
            }

            // Pull the emergency stop, then shut down
            estop.write(true);
            std::thread::sleep(Duration::from_millis(100));
            Executor::instance().stop();
        });
    }

    executor.run()?;

    println!("final safety level: {}", observer.current());
    Ok(())
}
