//! Core building blocks shared by the scheduler, the control graph and the
//! safety system: the [`Runnable`] trait, the monotonic clock helper and the
//! logging and realtime OS submodules.

pub mod rt;
pub mod tlog;

pub use rt::{lock_all_memory, max_rt_priority, prefault_stack, set_realtime_priority, RtError};
pub use tlog::{set_log_level, LogLevel, Logger};

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Instant;

/// A unit of work invoked once per scheduled period.
///
/// Everything the executor drives — time domains, safety systems, plain
/// closures — is a `Runnable`. `run()` must return; a non-terminating runnable
/// hangs shutdown.
pub trait Runnable: Send {
    fn run(&mut self);
}

/// Shared handle to a runnable. Task descriptors and flattened task lists hold
/// clones of the same `Arc`, so registering a time domain and running it do
/// not fight over ownership.
pub type RunnableRef = Arc<Mutex<dyn Runnable>>;

/// Wrap a concrete runnable into a shared [`RunnableRef`].
pub fn runnable_ref<R: Runnable + 'static>(runnable: R) -> RunnableRef {
    Arc::new(Mutex::new(runnable))
}

/// Nanoseconds since process start, from the monotonic clock.
///
/// Used as the timestamp on every signal and HAL channel write. Monotonic and
/// non-decreasing across threads.
pub fn now_nsec() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}

/// Sleep until an absolute deadline on the monotonic clock.
///
/// Returns immediately when the deadline already passed, so a loop that fell
/// behind catches up instead of drifting further.
pub fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        std::thread::sleep(deadline - now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_nsec_monotonic() {
        let a = now_nsec();
        let b = now_nsec();
        assert!(b >= a);
    }

    #[test]
    fn test_sleep_until_past_deadline_returns() {
        // A deadline in the past must not block
        let start = Instant::now();
        sleep_until(start - std::time::Duration::from_millis(5));
        assert!(start.elapsed() < std::time::Duration::from_millis(50));
    }

    #[test]
    fn test_runnable_ref_shares_state() {
        use std::sync::atomic::{AtomicU32, Ordering};

        struct Bump(Arc<AtomicU32>);
        impl Runnable for Bump {
            fn run(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let count = Arc::new(AtomicU32::new(0));
        let r = runnable_ref(Bump(count.clone()));
        let clone = r.clone();
        clone.lock().run();
        r.lock().run();
        // Both handles drive the same runnable
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
