//! Thin wrapper over the POSIX AIO facility.
//!
//! Everything the bridge knows about the kernel's asynchronous I/O lives
//! here: submitting a control block, polling its status, reclaiming its
//! result, and the cancellation calls used at teardown.
use std::io;
use std::os::raw::c_int;
use std::ptr;

use crate::operation::SyncMode;

/// The signal POSIX AIO raises when a bridge operation completes.
///
/// Reactor implementations must watch this signal; see [`crate::Bridge`].
pub const COMPLETION_SIGNAL: c_int = libc::SIGIO;

/// Outcome of polling a control block with `aio_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpStatus {
    /// The operation has not completed yet.
    InProgress,
    /// The operation finished with the given status: 0 for success,
    /// `ECANCELED` for cancellation, any other errno for failure.
    Finished(c_int),
}

fn check(rc: c_int) -> io::Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

pub(crate) fn read(acb: &mut libc::aiocb) -> io::Result<()> {
    // Safety: `acb` lives in a registered record box and stays valid until
    // the operation is reclaimed.
    check(unsafe { libc::aio_read(acb) })
}

pub(crate) fn write(acb: &mut libc::aiocb) -> io::Result<()> {
    // Safety: as for `read`.
    check(unsafe { libc::aio_write(acb) })
}

pub(crate) fn fsync(mode: SyncMode, acb: &mut libc::aiocb) -> io::Result<()> {
    // Safety: as for `read`.
    check(unsafe { libc::aio_fsync(mode.as_raw(), acb) })
}

/// Poll the current status of a submitted control block.
pub(crate) fn status(acb: &libc::aiocb) -> OpStatus {
    // Safety: `acb` belongs to a registered, unreclaimed operation.
    match unsafe { libc::aio_error(acb) } {
        libc::EINPROGRESS => OpStatus::InProgress,
        code if code >= 0 => OpStatus::Finished(code),
        _ => OpStatus::Finished(
            io::Error::last_os_error()
                .raw_os_error()
                .unwrap_or(libc::EINVAL),
        ),
    }
}

/// Reclaim the final return value of a finished operation.
///
/// Must be called exactly once per control block, after [`status`] has
/// reported [`OpStatus::Finished`].
pub(crate) fn reclaim(acb: &mut libc::aiocb) -> isize {
    // Safety: per the contract above.
    unsafe { libc::aio_return(acb) }
}

/// Request cancellation of one in-flight operation.
///
/// The result is advisory; callers re-poll [`status`] afterwards.
pub(crate) fn cancel(acb: &mut libc::aiocb) {
    let fd = acb.aio_fildes;
    // Safety: `acb` belongs to a registered, unreclaimed operation.
    unsafe { libc::aio_cancel(fd, acb) };
}

/// Block until at least one of the listed control blocks completes.
pub(crate) fn suspend(list: &[*const libc::aiocb]) -> io::Result<()> {
    // Safety: every pointer in `list` refers to a live, submitted control
    // block owned by the caller.
    check(unsafe { libc::aio_suspend(list.as_ptr(), list.len() as c_int, ptr::null()) })
}
