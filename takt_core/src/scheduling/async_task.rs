//! Realtime worker threads for harmonic sub-period tasks.
//!
//! Each thread owns one flattened [`HarmonicTaskList`] and free-runs it at
//! its planned period on an absolute-time grid. Cancellation is cooperative:
//! the stop flag and the executor's running flag are both observed at the top
//! of every iteration, so a stop request during a mid-cycle sleep ends the
//! thread within one period.

use crate::core::tlog::{self, Logger};
use crate::core::{rt, sleep_until, Runnable};
use crate::scheduling::counter::Counter;
use crate::scheduling::executor::BASE_PRIORITY;
use crate::scheduling::harmonic::ThreadPlan;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Handle to one running sub-period thread.
pub(crate) struct AsyncTask {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AsyncTask {
    /// Spawn the thread for a planned task. The thread applies its realtime
    /// priority, bumps `ready` once set up, then enters its periodic loop.
    pub fn start(
        plan: ThreadPlan,
        running: Arc<AtomicBool>,
        ready: Arc<AtomicUsize>,
        log: Logger,
    ) -> std::io::Result<AsyncTask> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let name = plan.name.clone();

        let handle = std::thread::Builder::new()
            .name(plan.name.clone())
            .spawn(move || {
                let ThreadPlan {
                    name,
                    period,
                    realtime,
                    nice,
                    mut list,
                    monitors,
                    ..
                } = plan;

                if realtime {
                    if let Err(e) = rt::set_realtime_priority(BASE_PRIORITY - nice) {
                        log.error(format!(
                            "could not set realtime priority for task '{}': {}",
                            name, e
                        ));
                    }
                }

                let mut counter = Counter::new();
                counter.set_period(period);
                counter.monitors = monitors;

                tlog::set_task_context(&name);
                ready.fetch_add(1, Ordering::SeqCst);

                let period = Duration::from_secs_f64(period);
                let mut next_wake = Instant::now() + period;

                while !thread_stop.load(Ordering::Acquire) && running.load(Ordering::Acquire) {
                    sleep_until(next_wake);
                    counter.tick();
                    list.run();
                    counter.tock();
                    next_wake += period;
                }

                tlog::clear_task_context();
            })?;

        Ok(AsyncTask {
            name,
            stop,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request the thread to exit at the top of its next iteration.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Block until the thread has returned.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::runnable_ref;
    use crate::scheduling::harmonic::HarmonicTaskList;
    use crate::scheduling::periodic::Lambda;
    use std::sync::atomic::AtomicU32;

    fn plan_with_counter(period: f64, count: &Arc<AtomicU32>) -> ThreadPlan {
        let probe = count.clone();
        let mut list = HarmonicTaskList::new();
        list.add(runnable_ref(Lambda::new(move || {
            probe.fetch_add(1, Ordering::SeqCst);
        })));
        ThreadPlan {
            name: "worker".to_string(),
            period,
            k: 2,
            realtime: false,
            nice: 0,
            list,
            monitors: Vec::new(),
        }
    }

    #[test]
    fn test_thread_runs_at_period_and_stops() {
        let count = Arc::new(AtomicU32::new(0));
        let running = Arc::new(AtomicBool::new(true));
        let ready = Arc::new(AtomicUsize::new(0));

        let mut task = AsyncTask::start(
            plan_with_counter(0.005, &count),
            running.clone(),
            ready.clone(),
            Logger::get('T'),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(60));
        task.stop();
        task.join();

        assert_eq!(ready.load(Ordering::SeqCst), 1);
        let runs = count.load(Ordering::SeqCst);
        // ~12 cycles expected in 60ms at 5ms; wide margin for loaded hosts
        assert!(runs >= 4, "expected at least 4 runs, got {}", runs);
        assert_eq!(task.name(), "worker");
    }

    #[test]
    fn test_running_flag_stops_thread() {
        let count = Arc::new(AtomicU32::new(0));
        let running = Arc::new(AtomicBool::new(true));
        let ready = Arc::new(AtomicUsize::new(0));

        let mut task = AsyncTask::start(
            plan_with_counter(0.002, &count),
            running.clone(),
            ready,
            Logger::get('T'),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(10));
        running.store(false, Ordering::SeqCst);

        let stop_requested = Instant::now();
        task.join();
        // Exits within one period plus scheduling slack
        assert!(stop_requested.elapsed() < Duration::from_millis(100));
    }
}
