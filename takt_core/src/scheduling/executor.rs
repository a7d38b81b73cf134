//! The process-wide executor: assembles the harmonic task tree, pins
//! priorities and memory, and drives the main periodic loop.
//!
//! Applications register [`Periodic`] tasks and [`TimeDomain`]s, set one main
//! task (typically the [`SafetySystem`]), then call [`Executor::run`], which
//! blocks until [`Executor::stop`] or a termination signal. The executor is
//! reachable as a process singleton through [`Executor::instance`]; owned
//! instances exist for tests and embedding.
//!
//! # Example
//!
//! ```ignore
//! use takt_core::scheduling::{Executor, Periodic};
//!
//! let executor = Executor::instance();
//! executor.set_period(0.001)?;
//! executor.add(Periodic::from_fn("telemetry", 0.1, false, || { /* ... */ }));
//! executor.run()?;
//! ```

use crate::config::CoreConfig;
use crate::core::tlog::{self, Logger};
use crate::core::{rt, runnable_ref, sleep_until, Runnable, RunnableRef};
use crate::error::{Result, TaktError};
use crate::safety::SafetySystem;
use crate::scheduling::async_task::AsyncTask;
use crate::scheduling::counter::Counter;
use crate::scheduling::harmonic::{plan_forest, HarmonicTaskList};
use crate::scheduling::periodic::{Lambda, Periodic};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Highest OS priority used by the scheduler; a realtime task runs at
/// `BASE_PRIORITY - nice`. Low enough that the full nice range stays valid
/// under SCHED_FIFO.
pub const BASE_PRIORITY: i32 = 49;

/// Stack bytes pre-faulted by default before the main loop starts.
const DEFAULT_PREFAULT_STACK: usize = 8 * 1024;

/// Poll interval for the external-clock and event-queue loop modes.
const SYNC_POLL: Duration = Duration::from_micros(10);

/// Set by the SIGTERM handler; observed by every loop mode.
static TERM_RECEIVED: AtomicBool = AtomicBool::new(false);

/// SIGTERM handler.
///
/// # Safety
/// Runs in signal context and must only call async-signal-safe functions;
/// a relaxed atomic store qualifies.
#[cfg(unix)]
extern "C" fn sigterm_handler(_signum: libc::c_int) {
    TERM_RECEIVED.store(true, Ordering::SeqCst);
}

/// Blocking cycle source, e.g. a fieldbus master whose `sync()` returns when
/// a new bus cycle is available.
pub trait CycleSource: Send + Sync {
    fn sync(&self);
    /// Interrupt a blocked `sync()` during shutdown.
    fn stop(&self) {}
}

/// External clock delivering a monotonically non-decreasing nanosecond count.
pub trait TimeSource: Send + Sync {
    fn now_nsec(&self) -> u64;
}

/// External event queue paired with its own clock, e.g. a simulation
/// publishing time and stepping messages.
pub trait EventSource: TimeSource {
    fn is_empty(&self) -> bool;
    fn call_available(&self);
}

/// Which external synchronization source is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSourceKind {
    None,
    Fieldbus,
    Clock,
    Events,
}

#[derive(Clone, Default)]
enum SyncMode {
    #[default]
    Steady,
    Fieldbus(Arc<dyn CycleSource>),
    Clock(Arc<dyn TimeSource>),
    Events(Arc<dyn EventSource>),
}

impl SyncMode {
    fn kind(&self) -> SyncSourceKind {
        match self {
            SyncMode::Steady => SyncSourceKind::None,
            SyncMode::Fieldbus(_) => SyncSourceKind::Fieldbus,
            SyncMode::Clock(_) => SyncSourceKind::Clock,
            SyncMode::Events(_) => SyncSourceKind::Events,
        }
    }
}

#[derive(Default)]
struct ExecutorState {
    period: f64,
    main_task: Option<Periodic>,
    tasks: Vec<Periodic>,
    sync: SyncMode,
    prefault_stack: Option<usize>,
}

/// The hierarchical periodic scheduler.
pub struct Executor {
    state: Mutex<ExecutorState>,
    running: Arc<AtomicBool>,
    fieldbus: Arc<Mutex<Option<Arc<dyn CycleSource>>>>,
    log: Logger,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    /// An owned executor. Applications normally use [`Executor::instance`];
    /// owned instances serve tests and embedded setups.
    pub fn new() -> Self {
        Executor {
            state: Mutex::new(ExecutorState::default()),
            running: Arc::new(AtomicBool::new(true)),
            fieldbus: Arc::new(Mutex::new(None)),
            log: Logger::get('E'),
        }
    }

    /// The process-wide executor singleton.
    pub fn instance() -> &'static Executor {
        static EXECUTOR: OnceLock<Executor> = OnceLock::new();
        EXECUTOR.get_or_init(Executor::new)
    }

    /// Apply runtime configuration: log level and stack prefault size.
    pub fn configure(&self, config: &CoreConfig) {
        config.apply();
        self.state.lock().prefault_stack = Some(config.prefault_stack_bytes());
    }

    /// Register a top-level periodic task.
    pub fn add(&self, task: Periodic) {
        self.state.lock().tasks.push(task);
    }

    /// Register a time domain as a periodic task carrying its name, period
    /// and realtime flag.
    pub fn add_time_domain(&self, timedomain: &Arc<Mutex<crate::control::TimeDomain>>) {
        let (name, period, realtime) = {
            let td = timedomain.lock();
            (td.name().to_string(), td.period(), td.realtime())
        };
        let runnable: RunnableRef = timedomain.clone();
        self.add(Periodic::new(&name, period, realtime, runnable));
    }

    /// Define the main task; its period becomes the executor's base period.
    /// At most one main task can exist.
    pub fn set_main_task(&self, task: Periodic) -> Result<()> {
        let mut state = self.state.lock();
        if state.main_task.is_some() {
            return Err(TaktError::MainTaskAlreadySet);
        }
        state.period = task.period();
        state.main_task = Some(task);
        Ok(())
    }

    /// Schedule a safety system as the main task.
    pub fn set_safety_system(&self, safety_system: &Arc<Mutex<SafetySystem>>) -> Result<()> {
        let period = safety_system.lock().period();
        let runnable: RunnableRef = safety_system.clone();
        self.set_main_task(Periodic::new("safety system", period, true, runnable))
    }

    /// Set the base period directly; only valid while no main task is
    /// defined. Installs a no-op main task at that period.
    pub fn set_period(&self, period: f64) -> Result<()> {
        {
            let state = self.state.lock();
            if state.main_task.is_some() {
                return Err(TaktError::MainTaskAlreadySet);
            }
        }
        self.set_main_task(Periodic::new(
            "default main task",
            period,
            true,
            runnable_ref(Lambda::empty()),
        ))
    }

    pub fn base_period(&self) -> f64 {
        self.state.lock().period
    }

    /// Synchronize the main loop with a fieldbus master cycle.
    pub fn sync_with_fieldbus(&self, source: Arc<dyn CycleSource>) {
        let mut state = self.state.lock();
        if !matches!(state.sync, SyncMode::Steady) {
            self.log
                .error("a sync source is already configured, keeping the first one");
            return;
        }
        *self.fieldbus.lock() = Some(source.clone());
        state.sync = SyncMode::Fieldbus(source);
    }

    /// Synchronize the main loop with an external nanosecond clock.
    pub fn sync_with_time_source(&self, source: Arc<dyn TimeSource>) {
        let mut state = self.state.lock();
        if !matches!(state.sync, SyncMode::Steady) {
            self.log
                .error("a sync source is already configured, keeping the first one");
            return;
        }
        state.sync = SyncMode::Clock(source);
    }

    /// Synchronize the main loop with an external event queue.
    pub fn sync_with_event_source(&self, source: Arc<dyn EventSource>) {
        let mut state = self.state.lock();
        if !matches!(state.sync, SyncMode::Steady) {
            self.log
                .error("a sync source is already configured, keeping the first one");
            return;
        }
        state.sync = SyncMode::Events(source);
    }

    /// Which external sync source drives the loop.
    pub fn sync_source_kind(&self) -> SyncSourceKind {
        self.state.lock().sync.kind()
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request the main loop and all sub-period threads to exit. Idempotent;
    /// callable from any thread. A blocked fieldbus `sync()` is interrupted.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.log.trace("stop requested");
        }
        if let Some(guard) = self.fieldbus.try_lock() {
            if let Some(source) = guard.as_ref() {
                source.stop();
            }
        }
    }

    /// Clear all registration and re-arm the running flag, so a fresh task
    /// tree can be built. Intended for tests and embedded restarts.
    pub fn reset(&self) {
        *self.state.lock() = ExecutorState::default();
        *self.fieldbus.lock() = None;
        TERM_RECEIVED.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
    }

    /// Build the task tree and block in the periodic loop until [`stop`]
    /// or a termination signal.
    ///
    /// [`stop`]: Executor::stop
    pub fn run(&self) -> Result<()> {
        self.run_internal(None)
    }

    /// Like [`run`], additionally stopping after `duration`.
    ///
    /// [`run`]: Executor::run
    pub fn run_for(&self, duration: Duration) -> Result<()> {
        self.run_internal(Some(duration))
    }

    fn run_internal(&self, duration: Option<Duration>) -> Result<()> {
        let (period, main_task, plan, sync, prefault) = {
            let mut state = self.state.lock();
            if state.period == 0.0 {
                return Err(TaktError::PeriodUnset);
            }

            self.log.trace(format!(
                "starting executor with base period {} sec and priority {}",
                state.period, BASE_PRIORITY
            ));

            self.log.trace("assigning priorities");
            assign_priorities(&mut state.tasks);

            let plan = plan_forest(&state.tasks, state.period, &self.log)?;
            (
                state.period,
                state.main_task.clone(),
                plan,
                state.sync.clone(),
                state.prefault_stack.unwrap_or(DEFAULT_PREFAULT_STACK),
            )
        };

        // Spawn sub-period threads; the ready count replaces a fixed startup
        // sleep as the startup barrier.
        let ready = Arc::new(AtomicUsize::new(0));
        let expected = plan.threads.len();
        let mut threads: Vec<AsyncTask> = Vec::with_capacity(expected);
        for thread_plan in plan.threads {
            match AsyncTask::start(thread_plan, self.running.clone(), ready.clone(), self.log) {
                Ok(task) => threads.push(task),
                Err(e) => {
                    self.log.error(format!("could not spawn task thread: {}", e));
                    for task in &threads {
                        task.stop();
                    }
                    for task in &mut threads {
                        task.join();
                    }
                    return Err(TaktError::Io(e));
                }
            }
        }

        let barrier_deadline = Instant::now() + Duration::from_secs(5);
        while ready.load(Ordering::SeqCst) < expected && Instant::now() < barrier_deadline {
            std::thread::sleep(Duration::from_millis(1));
        }

        if let Err(e) = rt::set_realtime_priority(BASE_PRIORITY) {
            self.log
                .error(format!("could not set realtime priority: {}", e));
        }
        rt::prefault_stack(prefault);
        if let Err(e) = rt::lock_all_memory() {
            self.log.error(format!("could not lock memory in RAM: {}", e));
        }

        self.install_signal_handlers();

        let mut counter = Counter::new();
        counter.set_period(period);
        let mut main_runnable = None;
        if let Some(task) = &main_task {
            self.log
                .trace(format!("setting '{}' as main task", task.name()));
            counter.monitors = task.monitors.clone();
            main_runnable = task.runnable().cloned();
            tlog::set_task_context(task.name());
        } else {
            tlog::set_task_context("executor");
        }

        let mut inline_list = plan.inline_list;
        let deadline = duration.map(|d| Instant::now() + d);

        match sync {
            SyncMode::Steady => {
                self.log.trace("starting periodic execution");
                self.steady_loop(period, deadline, &mut counter, &mut inline_list, &main_runnable);
            }
            SyncMode::Fieldbus(source) => {
                self.log.trace("starting execution synced to fieldbus");
                self.fieldbus_loop(source, deadline, &mut counter, &mut inline_list, &main_runnable);
            }
            SyncMode::Clock(source) => {
                self.log.trace("starting execution synced to external clock");
                self.clock_loop(
                    source,
                    period,
                    deadline,
                    &mut counter,
                    &mut inline_list,
                    &main_runnable,
                );
            }
            SyncMode::Events(source) => {
                self.log.trace("starting execution synced to event source");
                self.event_loop(source, deadline, &mut counter, &mut inline_list, &main_runnable);
            }
        }

        tlog::clear_task_context();

        self.log.trace("stopping all threads");
        for task in &threads {
            task.stop();
        }
        self.log.trace("joining all threads");
        for task in &mut threads {
            task.join();
        }
        self.log.trace("exiting executor");
        Ok(())
    }

    fn keep_running(&self, deadline: Option<Instant>) -> bool {
        if !self.running.load(Ordering::SeqCst) || TERM_RECEIVED.load(Ordering::SeqCst) {
            return false;
        }
        match deadline {
            Some(d) => Instant::now() < d,
            None => true,
        }
    }

    fn steady_loop(
        &self,
        period: f64,
        deadline: Option<Instant>,
        counter: &mut Counter,
        list: &mut HarmonicTaskList,
        main: &Option<RunnableRef>,
    ) {
        let period = Duration::from_secs_f64(period);
        let mut next_cycle = Instant::now() + period;
        while self.keep_running(deadline) {
            sleep_until(next_cycle);
            cycle(counter, list, main);
            next_cycle += period;
        }
    }

    fn fieldbus_loop(
        &self,
        source: Arc<dyn CycleSource>,
        deadline: Option<Instant>,
        counter: &mut Counter,
        list: &mut HarmonicTaskList,
        main: &Option<RunnableRef>,
    ) {
        while self.keep_running(deadline) {
            source.sync();
            cycle(counter, list, main);
        }
    }

    fn clock_loop(
        &self,
        source: Arc<dyn TimeSource>,
        period: f64,
        deadline: Option<Instant>,
        counter: &mut Counter,
        list: &mut HarmonicTaskList,
        main: &Option<RunnableRef>,
    ) {
        let period_nsec = (period * 1.0e9) as u64;
        let mut next_cycle = source.now_nsec() + period_nsec;
        while self.keep_running(deadline) {
            while source.now_nsec() < next_cycle && self.keep_running(deadline) {
                std::thread::sleep(SYNC_POLL);
            }
            cycle(counter, list, main);
            next_cycle += period_nsec;
        }
    }

    fn event_loop(
        &self,
        source: Arc<dyn EventSource>,
        deadline: Option<Instant>,
        counter: &mut Counter,
        list: &mut HarmonicTaskList,
        main: &Option<RunnableRef>,
    ) {
        let mut last_stamp = source.now_nsec();
        'ticks: while self.keep_running(deadline) {
            // Wait for a fresh timestamp, then for a queued event
            loop {
                if !self.keep_running(deadline) {
                    break 'ticks;
                }
                let stamp = source.now_nsec();
                if stamp != last_stamp {
                    last_stamp = stamp;
                    break;
                }
                std::thread::sleep(SYNC_POLL);
            }
            while source.is_empty() {
                if !self.keep_running(deadline) {
                    break 'ticks;
                }
                std::thread::sleep(SYNC_POLL);
            }
            source.call_available();
            cycle(counter, list, main);
        }
    }

    /// SIGINT via the ctrlc handler thread, SIGTERM via a raw flag. Handler
    /// installation can fail when an embedding application owns the signals;
    /// that is logged and ignored.
    fn install_signal_handlers(&self) {
        let running = self.running.clone();
        let fieldbus = self.fieldbus.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
            if let Some(guard) = fieldbus.try_lock() {
                if let Some(source) = guard.as_ref() {
                    source.stop();
                }
            }
        }) {
            self.log.warn(format!("could not set SIGINT handler: {}", e));
        }

        #[cfg(unix)]
        // SAFETY: SIGTERM is a valid signal; sigterm_handler is a valid
        // function pointer performing only an atomic store.
        unsafe {
            libc::signal(
                libc::SIGTERM,
                sigterm_handler as *const () as libc::sighandler_t,
            );
        }
    }
}

/// One iteration of the inline loop, shared by all sync modes.
fn cycle(counter: &mut Counter, list: &mut HarmonicTaskList, main: &Option<RunnableRef>) {
    counter.tick();
    list.run();
    if let Some(main_task) = main {
        main_task.lock().run();
    }
    counter.tock();
}

/// Collect every task in the forest, sort stably (realtime first, then
/// ascending period) and hand out 1-based nice ranks to the realtime ones.
fn assign_priorities(tasks: &mut [Periodic]) {
    let mut keys: Vec<(bool, f64)> = Vec::new();
    traverse(tasks, &mut |task| keys.push((task.realtime(), task.period())));

    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by(|&a, &b| {
        let (rt_a, period_a) = keys[a];
        let (rt_b, period_b) = keys[b];
        if rt_a == rt_b {
            period_a
                .partial_cmp(&period_b)
                .unwrap_or(std::cmp::Ordering::Equal)
        } else if rt_a {
            std::cmp::Ordering::Less
        } else {
            std::cmp::Ordering::Greater
        }
    });

    let mut nices = vec![0i32; keys.len()];
    let mut next = 1;
    for &index in &order {
        if keys[index].0 {
            nices[index] = next;
            next += 1;
        }
    }

    let mut position = 0;
    traverse_mut(tasks, &mut |task| {
        if nices[position] != 0 {
            task.set_nice(nices[position]);
        }
        position += 1;
    });
}

fn traverse<F: FnMut(&Periodic)>(tasks: &[Periodic], f: &mut F) {
    for task in tasks {
        f(task);
        traverse(&task.before, f);
        traverse(&task.after, f);
    }
}

fn traverse_mut<F: FnMut(&mut Periodic)>(tasks: &mut [Periodic], f: &mut F) {
    for task in tasks.iter_mut() {
        f(task);
        traverse_mut(&mut task.before, f);
        traverse_mut(&mut task.after, f);
    }
}
