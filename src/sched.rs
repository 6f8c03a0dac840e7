//! Best-effort thread scheduling setup.
//!
//! The writer runs under `SCHED_FIFO` below the fieldbus stack's priority;
//! the archiver drops itself back to the default policy so compression never
//! competes with logging. Raising priority usually needs privileges, so
//! failures are logged and otherwise ignored.

/// Real-time priority of the log writer thread. The fieldbus stack runs
/// higher, the archiver at the default policy.
pub(crate) const LOG_THREAD_PRIORITY: i32 = 12;

#[cfg(unix)]
pub(crate) fn promote_to_fifo(priority: i32) {
    // SAFETY: pthread_self is always valid and sched_param is fully
    // initialized before the call.
    let rc = unsafe {
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = priority;
        libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param)
    };
    if rc != 0 {
        warn!(
            message = "Could not switch thread to real-time scheduling.",
            errno = %rc,
            priority = %priority,
        );
    }
}

#[cfg(unix)]
pub(crate) fn demote_to_normal() {
    debug!("Setting SCHED_OTHER.");
    // SAFETY: as above; SCHED_OTHER requires priority 0.
    let rc = unsafe {
        let param: libc::sched_param = std::mem::zeroed();
        libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_OTHER, &param)
    };
    if rc != 0 {
        warn!(message = "Could not reset thread scheduling policy.", errno = %rc);
    }
}

#[cfg(not(unix))]
pub(crate) fn promote_to_fifo(_priority: i32) {}

#[cfg(not(unix))]
pub(crate) fn demote_to_normal() {}
