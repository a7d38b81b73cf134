//! Harmonic decomposition of the periodic task forest.
//!
//! At startup the executor turns the registered [`Periodic`] forest into an
//! [`ExecutionPlan`]: one flat [`HarmonicTaskList`] per thread, plus the
//! inline list of tasks sharing the base period. Planning is a pure
//! validation pass — it clones runnable handles but creates no thread, so a
//! failing forest aborts `run()` with nothing to unwind.
//!
//! For every task the integer ratio `k = round(period / parent_period)` is
//! computed; the task actually runs at `k * parent_period`. A configured
//! period more than 1% away from that harmonic is rejected. `k == 1` splices
//! the task into its parent's list; `k > 1` makes it a thread of its own.

use crate::core::{Runnable, RunnableRef};
use crate::core::tlog::Logger;
use crate::error::{Result, TaktError};
use crate::scheduling::counter::Monitor;
use crate::scheduling::periodic::Periodic;

/// Maximum relative deviation between a configured period and its nearest
/// harmonic multiple.
const MAX_PERIOD_DEVIATION: f64 = 0.01;

/// Ordered list of runnables executed together at one harmonic tick.
#[derive(Default)]
pub struct HarmonicTaskList {
    pub tasks: Vec<RunnableRef>,
}

impl HarmonicTaskList {
    pub fn new() -> Self {
        HarmonicTaskList { tasks: Vec::new() }
    }

    pub fn add(&mut self, runnable: RunnableRef) {
        self.tasks.push(runnable);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Runnable for HarmonicTaskList {
    fn run(&mut self) {
        for task in &self.tasks {
            task.lock().run();
        }
    }
}

/// One thread the executor will create: a task list driven at its own period.
pub(crate) struct ThreadPlan {
    pub name: String,
    /// Actual period after snapping to the harmonic grid
    pub period: f64,
    /// Ratio to the parent period
    pub k: u32,
    pub realtime: bool,
    pub nice: i32,
    pub list: HarmonicTaskList,
    pub monitors: Vec<Monitor>,
}

/// Result of decomposing the registered forest.
pub(crate) struct ExecutionPlan {
    /// Tasks sharing the executor's base period, run inline by the main loop
    pub inline_list: HarmonicTaskList,
    /// Threads in creation order
    pub threads: Vec<ThreadPlan>,
}

impl std::fmt::Debug for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPlan")
            .field("inline_list_len", &self.inline_list.len())
            .field("thread_count", &self.threads.len())
            .finish()
    }
}

/// Decompose the registered top-level tasks against the base period.
pub(crate) fn plan_forest(
    tasks: &[Periodic],
    base_period: f64,
    log: &Logger,
) -> Result<ExecutionPlan> {
    let mut plan = ExecutionPlan {
        inline_list: HarmonicTaskList::new(),
        threads: Vec::new(),
    };

    for task in tasks {
        if let Some(list) = plan_task(task, base_period, "executor", &mut plan.threads, log)? {
            plan.inline_list.tasks.extend(list.tasks);
        }
    }

    Ok(plan)
}

/// Plan one task against its parent period. Returns the flattened list when
/// the task runs inline with its parent (`k == 1`), `None` when it became a
/// thread of its own.
fn plan_task(
    task: &Periodic,
    parent_period: f64,
    parent_name: &str,
    threads: &mut Vec<ThreadPlan>,
    log: &Logger,
) -> Result<Option<HarmonicTaskList>> {
    if task.runnable().is_none() && task.before.is_empty() && task.after.is_empty() {
        return Err(TaktError::EmptyTaskList(task.name().to_string()));
    }

    let k = (task.period() / parent_period).round() as i64;
    let actual = k as f64 * parent_period;
    let deviation = if task.period() > 0.0 {
        ((task.period() - actual) / task.period()).abs()
    } else {
        1.0
    };

    if deviation > MAX_PERIOD_DEVIATION {
        return Err(TaktError::PeriodDeviation {
            task: task.name().to_string(),
            configured: task.period(),
            actual,
            deviation: deviation * 100.0,
        });
    }

    let mut list = HarmonicTaskList::new();
    for child in &task.before {
        if let Some(sub) = plan_task(child, actual, task.name(), threads, log)? {
            list.tasks.extend(sub.tasks);
        }
    }
    if let Some(runnable) = task.runnable() {
        list.add(runnable.clone());
    }
    for child in &task.after {
        if let Some(sub) = plan_task(child, actual, task.name(), threads, log)? {
            list.tasks.extend(sub.tasks);
        }
    }

    if k == 1 {
        log.trace(format!(
            "task '{}' runs inline with '{}' at {} sec",
            task.name(),
            parent_name,
            actual
        ));
        return Ok(Some(list));
    }

    if task.realtime() && task.nice() <= 0 {
        return Err(TaktError::PriorityUnset(task.name().to_string()));
    }

    // A pure group whose children all became threads leaves nothing to drive
    if !list.is_empty() {
        log.trace(format!(
            "creating harmonic task '{}' with period {} sec (k = {}) based on '{}'",
            task.name(),
            actual,
            k,
            parent_name
        ));
        threads.push(ThreadPlan {
            name: task.name().to_string(),
            period: actual,
            k: k as u32,
            realtime: task.realtime(),
            nice: task.nice(),
            list,
            monitors: task.monitors.clone(),
        });
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn probe_task(name: &str, period: f64, count: &Arc<AtomicU32>) -> Periodic {
        let probe = count.clone();
        Periodic::from_fn(name, period, false, move || {
            probe.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn log() -> Logger {
        Logger::get('T')
    }

    #[test]
    fn test_task_list_runs_in_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut list = HarmonicTaskList::new();
        for name in ["a", "b", "c"] {
            let probe = order.clone();
            list.add(crate::core::runnable_ref(
                crate::scheduling::periodic::Lambda::new(move || probe.lock().push(name)),
            ));
        }

        list.run();
        assert_eq!(*order.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_base_period_task_is_inline() {
        let count = Arc::new(AtomicU32::new(0));
        let tasks = vec![probe_task("control", 0.001, &count)];

        let plan = plan_forest(&tasks, 0.001, &log()).unwrap();
        assert_eq!(plan.threads.len(), 0);
        assert_eq!(plan.inline_list.len(), 1);
    }

    #[test]
    fn test_harmonic_task_becomes_thread() {
        let count = Arc::new(AtomicU32::new(0));
        let tasks = vec![probe_task("slow", 0.005, &count)];

        let plan = plan_forest(&tasks, 0.001, &log()).unwrap();
        assert_eq!(plan.inline_list.len(), 0);
        assert_eq!(plan.threads.len(), 1);
        assert_eq!(plan.threads[0].k, 5);
        assert!((plan.threads[0].period - 0.005).abs() < 1e-12);
    }

    #[test]
    fn test_deviation_within_one_percent_accepted() {
        let count = Arc::new(AtomicU32::new(0));
        // 0.9% off the base period snaps to k = 1
        let tasks = vec![probe_task("near", 0.001009, &count)];

        let plan = plan_forest(&tasks, 0.001, &log()).unwrap();
        assert_eq!(plan.inline_list.len(), 1);
        assert!(plan.threads.is_empty());
    }

    #[test]
    fn test_deviation_above_one_percent_rejected() {
        let count = Arc::new(AtomicU32::new(0));
        let tasks = vec![probe_task("off-grid", 0.00102, &count)];

        let err = plan_forest(&tasks, 0.001, &log()).unwrap_err();
        match err {
            TaktError::PeriodDeviation { task, .. } => assert_eq!(task, "off-grid"),
            other => panic!("expected PeriodDeviation, got {:?}", other),
        }
    }

    #[test]
    fn test_non_harmonic_period_rejected() {
        let count = Arc::new(AtomicU32::new(0));
        let tasks = vec![probe_task("odd", 0.0013, &count)];

        assert!(matches!(
            plan_forest(&tasks, 0.001, &log()),
            Err(TaktError::PeriodDeviation { .. })
        ));
    }

    #[test]
    fn test_sub_base_period_rejected() {
        let count = Arc::new(AtomicU32::new(0));
        // Faster than the base period rounds to k = 0
        let tasks = vec![probe_task("too-fast", 0.0003, &count)];

        assert!(matches!(
            plan_forest(&tasks, 0.001, &log()),
            Err(TaktError::PeriodDeviation { .. })
        ));
    }

    #[test]
    fn test_nested_children_flatten_in_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let tracked = |name: &'static str| {
            let probe = order.clone();
            Periodic::from_fn(name, 0.002, false, move || probe.lock().push(name))
        };

        let mut root = tracked("main");
        root.before.push(tracked("pre"));
        root.after.push(tracked("post"));

        let plan = plan_forest(&[root], 0.001, &log()).unwrap();
        assert_eq!(plan.threads.len(), 1);

        let mut list = plan.threads.into_iter().next().unwrap().list;
        list.run();
        assert_eq!(*order.lock(), vec!["pre", "main", "post"]);
    }

    #[test]
    fn test_nested_harmonic_child_gets_own_thread() {
        let count = Arc::new(AtomicU32::new(0));
        let mut root = probe_task("root", 0.002, &count);
        // 4x the root period: becomes its own thread at 0.008s
        root.before.push(probe_task("slow-child", 0.008, &count));

        let plan = plan_forest(&[root], 0.001, &log()).unwrap();
        assert_eq!(plan.threads.len(), 2);

        let child = plan
            .threads
            .iter()
            .find(|t| t.name == "slow-child")
            .unwrap();
        assert_eq!(child.k, 4);
        assert!((child.period - 0.008).abs() < 1e-12);

        let root_plan = plan.threads.iter().find(|t| t.name == "root").unwrap();
        assert_eq!(root_plan.k, 2);
        assert_eq!(root_plan.list.len(), 1);
    }

    #[test]
    fn test_empty_task_rejected() {
        let tasks = vec![Periodic::group("hollow", 0.001, false)];
        assert!(matches!(
            plan_forest(&tasks, 0.001, &log()),
            Err(TaktError::EmptyTaskList(_))
        ));
    }

    #[test]
    fn test_realtime_thread_without_nice_rejected() {
        let count = Arc::new(AtomicU32::new(0));
        let probe = count.clone();
        let tasks = vec![Periodic::from_fn("rt", 0.004, true, move || {
            probe.fetch_add(1, Ordering::SeqCst);
        })];

        assert!(matches!(
            plan_forest(&tasks, 0.001, &log()),
            Err(TaktError::PriorityUnset(_))
        ));
    }

    #[test]
    fn test_planning_twice_is_deterministic() {
        let count = Arc::new(AtomicU32::new(0));
        let mut root = probe_task("root", 0.002, &count);
        root.before.push(probe_task("fast", 0.002, &count));
        root.after.push(probe_task("slow", 0.016, &count));
        let tasks = vec![root, probe_task("inline", 0.001, &count)];

        let first = plan_forest(&tasks, 0.001, &log()).unwrap();
        let second = plan_forest(&tasks, 0.001, &log()).unwrap();

        assert_eq!(first.threads.len(), second.threads.len());
        assert_eq!(first.inline_list.len(), second.inline_list.len());
        for (a, b) in first.threads.iter().zip(second.threads.iter()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.k, b.k);
            assert_eq!(a.list.len(), b.list.len());
        }
    }
}
