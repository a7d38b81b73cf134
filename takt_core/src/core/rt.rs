//! OS-level realtime primitives: SCHED_FIFO priorities, memory locking and
//! stack prefaulting.
//!
//! All calls degrade gracefully on hosts without realtime permission: the
//! executor logs the failure and keeps running in best-effort mode, so
//! non-privileged test runs still execute.

use std::hint::black_box;
use std::io;

/// Result type for realtime operations
pub type RtResult<T> = Result<T, RtError>;

/// Errors from realtime operations
#[derive(Debug)]
pub enum RtError {
    /// Failed to lock memory
    MemoryLock(String),
    /// Failed to set realtime scheduling
    Scheduling(String),
    /// Feature not supported on this platform
    NotSupported(String),
    /// Permission denied
    PermissionDenied(String),
}

impl std::fmt::Display for RtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RtError::MemoryLock(msg) => write!(f, "memory lock error: {}", msg),
            RtError::Scheduling(msg) => write!(f, "scheduling error: {}", msg),
            RtError::NotSupported(msg) => write!(f, "not supported: {}", msg),
            RtError::PermissionDenied(msg) => write!(f, "permission denied: {}", msg),
        }
    }
}

impl std::error::Error for RtError {}

/// Set SCHED_FIFO scheduling with the given priority for the current thread.
/// Requires CAP_SYS_NICE or root on Linux.
#[cfg(target_os = "linux")]
pub fn set_realtime_priority(priority: i32) -> RtResult<()> {
    // SAFETY: pid 0 = current thread; sched_param is initialized with a valid priority.
    unsafe {
        let param = libc::sched_param {
            sched_priority: priority,
        };

        if libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) == 0 {
            Ok(())
        } else {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EPERM) {
                Err(RtError::PermissionDenied(
                    "SCHED_FIFO requires CAP_SYS_NICE or root".to_string(),
                ))
            } else {
                Err(RtError::Scheduling(format!(
                    "sched_setscheduler failed: {}",
                    err
                )))
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_realtime_priority(_priority: i32) -> RtResult<()> {
    Err(RtError::NotSupported(
        "SCHED_FIFO only supported on Linux".to_string(),
    ))
}

/// The highest SCHED_FIFO priority the host scheduler accepts (0 when
/// realtime scheduling is unavailable).
#[cfg(target_os = "linux")]
pub fn max_rt_priority() -> i32 {
    // SAFETY: queries a system limit, always safe to call.
    unsafe { libc::sched_get_priority_max(libc::SCHED_FIFO).max(0) }
}

#[cfg(not(target_os = "linux"))]
pub fn max_rt_priority() -> i32 {
    0
}

/// Lock all current and future memory pages into RAM (prevents swapping).
/// Requires CAP_IPC_LOCK or root on Linux.
#[cfg(target_os = "linux")]
pub fn lock_all_memory() -> RtResult<()> {
    // SAFETY: MCL_CURRENT | MCL_FUTURE are valid POSIX flag constants for mlockall.
    unsafe {
        if libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) == 0 {
            Ok(())
        } else {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EPERM) {
                Err(RtError::PermissionDenied(
                    "mlockall requires CAP_IPC_LOCK or root".to_string(),
                ))
            } else {
                Err(RtError::MemoryLock(format!("mlockall failed: {}", err)))
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn lock_all_memory() -> RtResult<()> {
    Err(RtError::NotSupported(
        "memory locking only supported on Linux".to_string(),
    ))
}

/// Prefault stack memory by touching every page up to `size` bytes.
///
/// Touching the pages before entering the periodic loop forces them into
/// physical memory, so the loop never takes a minor page fault on stack
/// growth once `mlockall` has pinned them.
#[inline(never)]
pub fn prefault_stack(size: usize) {
    const PAGE_SIZE: usize = 4096;
    let num_pages = size.div_ceil(PAGE_SIZE);
    prefault_recursive(num_pages, 0);
}

/// Touches one stack page per recursion level.
#[inline(never)]
fn prefault_recursive(remaining_pages: usize, depth: usize) {
    if remaining_pages == 0 {
        return;
    }

    // Bounds the prefaulted region to ~16MB
    const MAX_DEPTH: usize = 4096;
    if depth >= MAX_DEPTH {
        return;
    }

    let mut buffer = [0u8; 4096];
    for i in (0..4096).step_by(64) {
        buffer[i] = black_box(i as u8);
    }
    black_box(&buffer);

    prefault_recursive(remaining_pages - 1, depth + 1);
}
