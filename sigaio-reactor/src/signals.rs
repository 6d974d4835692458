//! Process-wide signal accounting.
//!
//! The sigaction handler must be async-signal-safe, so delivery is recorded
//! in static atomics and everything else happens on the loop thread.
use std::io;
use std::mem;
use std::os::raw::c_int;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Highest signal number accounted for. Linux reserves 1..=64.
pub(crate) const MAX_SIGNO: c_int = 64;

#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicU64 = AtomicU64::new(0);
static DELIVERIES: [AtomicU64; (MAX_SIGNO + 1) as usize] = [ZERO; (MAX_SIGNO + 1) as usize];

extern "C" fn note_delivery(signo: c_int) {
    if (1..=MAX_SIGNO).contains(&signo) {
        DELIVERIES[signo as usize].fetch_add(1, Ordering::Relaxed);
    }
}

/// Number of times `signo` has been delivered to the process.
pub(crate) fn delivered(signo: c_int) -> u64 {
    DELIVERIES[signo as usize].load(Ordering::Relaxed)
}

/// Install the counting disposition for `signo`.
///
/// Idempotent. The disposition stays installed for the process lifetime so
/// a late delivery can never hit the default action.
pub(crate) fn install(signo: c_int) -> io::Result<()> {
    // Safety: the handler only touches static atomics, which is
    // async-signal-safe.
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = note_delivery as extern "C" fn(c_int) as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(signo, &action, ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Sleep until any signal arrives or `timeout` elapses.
pub(crate) fn wait(timeout: Duration) -> io::Result<()> {
    let ts = libc::timespec {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_nsec: timeout.subsec_nanos() as libc::c_long,
    };
    // Safety: no fd set is passed; ppoll is used purely as an
    // interruptible sleep with the current signal mask.
    let rc = unsafe { libc::ppoll(ptr::null_mut(), 0, &ts, ptr::null()) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
    Ok(())
}
