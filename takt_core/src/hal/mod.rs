//! Named-channel hardware abstraction registry.
//!
//! Hardware backends publish logic (bool) and real (f64) channels under
//! string keys; the safety system and peripheral blocks look them up by name.
//! The registry itself performs no I/O: a backend writes input channels from
//! its device loop and reads output channels into the device, both through
//! the same handles handed out here. Unknown keys fail with
//! [`TaktError::HalBindingMissing`] at construction time, never mid-loop.

use crate::control::signal::{Signal, SignalCell};
use crate::core::now_nsec;
use crate::error::{Result, TaktError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

type FeatureFn = Box<dyn Fn(&[f64]) + Send + Sync>;

/// Consumer handle to a named input channel. Backends write it with
/// [`HalInput::write`]; the safety system and blocks read it with
/// [`HalInput::get`].
#[derive(Clone, Debug)]
pub struct HalInput<T: Clone> {
    name: Arc<str>,
    signal: SignalCell<T>,
}

impl<T: Clone> HalInput<T> {
    fn new(name: &str, initial: T) -> Self {
        HalInput {
            name: Arc::from(name),
            signal: Arc::new(RwLock::new(Signal {
                value: initial,
                timestamp: 0,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current sample.
    pub fn get(&self) -> Signal<T> {
        self.signal.read().clone()
    }

    /// Backend-side write, stamping the sample with the monotonic clock.
    pub fn write(&self, value: T) {
        let mut guard = self.signal.write();
        guard.value = value;
        guard.timestamp = now_nsec();
    }
}

/// Handle to a named output channel. The safety system and blocks drive it
/// with [`HalOutput::set`]; the backend reads it with [`HalOutput::get`].
#[derive(Clone)]
pub struct HalOutput<T: Clone> {
    name: Arc<str>,
    signal: SignalCell<T>,
    features: Arc<Mutex<HashMap<String, FeatureFn>>>,
}

impl<T: Clone> HalOutput<T> {
    fn new(name: &str, initial: T) -> Self {
        HalOutput {
            name: Arc::from(name),
            signal: Arc::new(RwLock::new(Signal {
                value: initial,
                timestamp: 0,
            })),
            features: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drive the output.
    pub fn set(&self, value: T) {
        let mut guard = self.signal.write();
        guard.value = value;
        guard.timestamp = now_nsec();
    }

    /// Last driven sample.
    pub fn get(&self) -> Signal<T> {
        self.signal.read().clone()
    }

    /// Backend-side registration of a device-specific feature, e.g. a PWM
    /// frequency setter.
    pub fn register_feature(&self, feature: &str, f: impl Fn(&[f64]) + Send + Sync + 'static) {
        self.features
            .lock()
            .insert(feature.to_string(), Box::new(f));
    }

    /// Invoke a device-specific feature by name.
    pub fn call_feature(&self, feature: &str, args: &[f64]) -> Result<()> {
        let features = self.features.lock();
        match features.get(feature) {
            Some(f) => {
                f(args);
                Ok(())
            }
            None => Err(TaktError::HalBindingMissing(format!(
                "{}::{}",
                self.name, feature
            ))),
        }
    }
}

/// Process-wide channel registry.
pub struct Hal {
    logic_inputs: RwLock<HashMap<String, HalInput<bool>>>,
    real_inputs: RwLock<HashMap<String, HalInput<f64>>>,
    logic_outputs: RwLock<HashMap<String, HalOutput<bool>>>,
    real_outputs: RwLock<HashMap<String, HalOutput<f64>>>,
}

impl Hal {
    fn new() -> Self {
        Hal {
            logic_inputs: RwLock::new(HashMap::new()),
            real_inputs: RwLock::new(HashMap::new()),
            logic_outputs: RwLock::new(HashMap::new()),
            real_outputs: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide HAL singleton.
    pub fn instance() -> &'static Hal {
        static HAL: OnceLock<Hal> = OnceLock::new();
        HAL.get_or_init(Hal::new)
    }

    // Backend-side registration. Registering an existing key returns the
    // existing channel, so re-initializing a backend is harmless.

    pub fn add_logic_input(&self, name: &str) -> HalInput<bool> {
        self.logic_inputs
            .write()
            .entry(name.to_string())
            .or_insert_with(|| HalInput::new(name, false))
            .clone()
    }

    pub fn add_real_input(&self, name: &str) -> HalInput<f64> {
        self.real_inputs
            .write()
            .entry(name.to_string())
            .or_insert_with(|| HalInput::new(name, 0.0))
            .clone()
    }

    pub fn add_logic_output(&self, name: &str) -> HalOutput<bool> {
        self.logic_outputs
            .write()
            .entry(name.to_string())
            .or_insert_with(|| HalOutput::new(name, false))
            .clone()
    }

    pub fn add_real_output(&self, name: &str) -> HalOutput<f64> {
        self.real_outputs
            .write()
            .entry(name.to_string())
            .or_insert_with(|| HalOutput::new(name, 0.0))
            .clone()
    }

    // Consumer-side lookup.

    pub fn logic_input(&self, name: &str) -> Result<HalInput<bool>> {
        self.logic_inputs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TaktError::HalBindingMissing(name.to_string()))
    }

    pub fn real_input(&self, name: &str) -> Result<HalInput<f64>> {
        self.real_inputs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TaktError::HalBindingMissing(name.to_string()))
    }

    pub fn logic_output(&self, name: &str) -> Result<HalOutput<bool>> {
        self.logic_outputs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TaktError::HalBindingMissing(name.to_string()))
    }

    pub fn real_output(&self, name: &str) -> Result<HalOutput<f64>> {
        self.real_outputs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TaktError::HalBindingMissing(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_missing_binding_fails() {
        let hal = Hal::instance();
        let err = hal.logic_input("no-such-channel").unwrap_err();
        assert!(matches!(err, TaktError::HalBindingMissing(_)));
    }

    #[test]
    fn test_input_roundtrip() {
        let hal = Hal::instance();
        let backend = hal.add_logic_input("hal-test.estop");
        let consumer = hal.logic_input("hal-test.estop").unwrap();

        assert!(!consumer.get().value);
        backend.write(true);
        assert!(consumer.get().value);
        assert!(consumer.get().timestamp > 0);
    }

    #[test]
    fn test_output_drive() {
        let hal = Hal::instance();
        let consumer = hal.add_real_output("hal-test.motor");
        consumer.set(0.75);

        let backend = hal.real_output("hal-test.motor").unwrap();
        assert_eq!(backend.get().value, 0.75);
    }

    #[test]
    fn test_reregistration_keeps_channel() {
        let hal = Hal::instance();
        let first = hal.add_real_input("hal-test.position");
        first.write(1.5);
        let second = hal.add_real_input("hal-test.position");
        assert_eq!(second.get().value, 1.5);
    }

    #[test]
    fn test_output_feature() {
        let hal = Hal::instance();
        let out = hal.add_real_output("hal-test.pwm");

        let calls = Arc::new(AtomicUsize::new(0));
        let probe = calls.clone();
        out.register_feature("setPwmFrequency", move |args| {
            assert_eq!(args, [20_000.0]);
            probe.fetch_add(1, Ordering::SeqCst);
        });

        out.call_feature("setPwmFrequency", &[20_000.0]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let err = out.call_feature("noSuchFeature", &[]).unwrap_err();
        assert!(matches!(err, TaktError::HalBindingMissing(_)));
    }
}
