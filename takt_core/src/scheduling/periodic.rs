//! Periodic task descriptors.
//!
//! A [`Periodic`] names a schedulable unit: its period, whether it needs a
//! realtime thread, the runnable it drives and any finer-grained children in
//! `before`/`after`. The descriptors form a rooted forest the executor
//! decomposes into harmonic task lists at startup; they are built by the
//! application before `run()` and only the priority assignment writes to them
//! afterwards.

use crate::core::{runnable_ref, Runnable, RunnableRef};
use crate::scheduling::counter::Monitor;

/// Adapter turning a closure into a [`Runnable`].
pub struct Lambda<F: FnMut() + Send>(F);

impl<F: FnMut() + Send> Lambda<F> {
    pub fn new(f: F) -> Self {
        Lambda(f)
    }
}

impl<F: FnMut() + Send> Runnable for Lambda<F> {
    fn run(&mut self) {
        (self.0)()
    }
}

impl Lambda<fn()> {
    /// A runnable that does nothing; backs the default main task when only a
    /// base period is configured.
    pub fn empty() -> Lambda<fn()> {
        fn noop() {}
        Lambda(noop as fn())
    }
}

/// Descriptor of a schedulable unit.
#[derive(Clone)]
pub struct Periodic {
    name: String,
    period: f64,
    realtime: bool,
    nice: i32,
    runnable: Option<RunnableRef>,
    /// Children executed before this task's runnable each cycle. Their
    /// periods must be integer multiples of this task's period.
    pub before: Vec<Periodic>,
    /// Children executed after this task's runnable each cycle.
    pub after: Vec<Periodic>,
    /// Invoked every tock with the task's timing counter.
    pub monitors: Vec<Monitor>,
}

impl Periodic {
    pub fn new(name: &str, period: f64, realtime: bool, runnable: RunnableRef) -> Self {
        Periodic {
            name: name.to_string(),
            period,
            realtime,
            nice: 0,
            runnable: Some(runnable),
            before: Vec::new(),
            after: Vec::new(),
            monitors: Vec::new(),
        }
    }

    /// Convenience constructor wrapping a closure.
    pub fn from_fn(
        name: &str,
        period: f64,
        realtime: bool,
        f: impl FnMut() + Send + 'static,
    ) -> Self {
        Periodic::new(name, period, realtime, runnable_ref(Lambda::new(f)))
    }

    /// A descriptor that only groups children and runs nothing itself.
    pub fn group(name: &str, period: f64, realtime: bool) -> Self {
        Periodic {
            name: name.to_string(),
            period,
            realtime,
            nice: 0,
            runnable: None,
            before: Vec::new(),
            after: Vec::new(),
            monitors: Vec::new(),
        }
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

    /// Priority rank among realtime tasks, written by the executor's priority
    /// assignment; 0 means unassigned.
    pub fn nice(&self) -> i32 {
        self.nice
    }

    pub fn set_nice(&mut self, nice: i32) {
        self.nice = nice;
    }

    pub fn runnable(&self) -> Option<&RunnableRef> {
        self.runnable.as_ref()
    }

    pub fn add_monitor(&mut self, monitor: Monitor) {
        self.monitors.push(monitor);
    }
}
