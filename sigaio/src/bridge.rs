//! The bridge instance, submission path, and completion reaper.
use std::cell::{Cell, RefCell};
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;

use log::{debug, trace, warn};
use sigaio_reactor::Reactor;
use smallvec::SmallVec;

use crate::aio::{self, OpStatus};
use crate::buf::{StableBuf, StableBufMut};
use crate::error::SubmitError;
use crate::operation::{Operation, ReadOp, SyncMode, SyncOp, WriteOp};
use crate::registry::Registry;

const LOG: &str = "sigaio::bridge";

/// Tracks in-flight POSIX AIO operations for one reactor.
///
/// Create one with [`Bridge::new`], submit requests through the [`Handle`]
/// returned by [`Bridge::handle`], and run the reactor's dispatch loop to
/// observe completions. Dropping the bridge abandons still-pending
/// operations: their callbacks are never invoked. See the crate docs for
/// the one-bridge-per-signal constraint.
pub struct Bridge<R: Reactor> {
    shared: Rc<Shared>,
    /// Persistent completion-signal subscription, released on drop.
    _watch: R::Watch,
}

/// Cloneable submission surface for a [`Bridge`].
///
/// Handles are also what completion callbacks receive, so a callback may
/// submit follow-up operations. A handle that outlives its bridge refuses
/// new submissions.
#[derive(Clone)]
pub struct Handle {
    shared: Rc<Shared>,
}

struct Shared {
    registry: RefCell<Registry>,
    status: Cell<Status>,
}

/// The lifecycle state of the bridge.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Status {
    /// Accepting new requests.
    Running,
    /// Torn down; surviving handles refuse new requests.
    Shutdown,
}

impl<R: Reactor> std::fmt::Debug for Bridge<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge").finish()
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle").finish()
    }
}

impl<R: Reactor> Bridge<R> {
    /// Create a bridge bound to `reactor`.
    ///
    /// Registers a persistent watch for [`crate::COMPLETION_SIGNAL`] which
    /// keeps firing across completions until the bridge is dropped. If the
    /// subscription fails, nothing is registered and the error is
    /// returned.
    pub fn new(reactor: &R) -> io::Result<Self> {
        let shared = Rc::new(Shared {
            registry: RefCell::new(Registry::new()),
            status: Cell::new(Status::Running),
        });
        let reaper = Rc::clone(&shared);
        let watch = reactor.watch_signal(
            aio::COMPLETION_SIGNAL,
            Box::new(move || {
                let handle = Handle {
                    shared: Rc::clone(&reaper),
                };
                reaper.reap(&handle);
            }),
        )?;
        debug!(target: LOG, "bridge.created signo={}", aio::COMPLETION_SIGNAL);
        Ok(Self {
            shared,
            _watch: watch,
        })
    }

    /// Returns a [`Handle`] for submitting requests.
    pub fn handle(&self) -> Handle {
        Handle {
            shared: Rc::clone(&self.shared),
        }
    }

    /// Number of operations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.shared.registry.borrow().len()
    }
}

impl<R: Reactor> Drop for Bridge<R> {
    fn drop(&mut self) {
        self.shared.status.set(Status::Shutdown);
        self.shared.abandon();
    }
}

impl Handle {
    /// Submit an asynchronous read of up to `buf`'s capacity from `fd` at
    /// byte `offset`.
    ///
    /// On acceptance the bridge owns `buf` until the completion callback
    /// hands it back with its initialized length set to the transferred
    /// count. Acceptance is not completion: the callback fires only once
    /// the reactor dispatches a completion notification. On error the
    /// buffer and callback are dropped.
    pub fn submit_read<B, F>(&self, fd: RawFd, offset: u64, buf: B, complete: F) -> io::Result<()>
    where
        B: StableBufMut,
        F: FnOnce(&Handle, io::Result<usize>, B) + 'static,
    {
        self.check_running()?;
        validate_fd(fd)?;
        validate_offset(offset)?;
        if buf.bytes_remaining() == 0 {
            return Err(SubmitError::invalid("zero-capacity read buffer").into());
        }
        self.enqueue(ReadOp::new(fd, offset, buf, complete), aio::read)
    }

    /// Submit an asynchronous write of `buf` to `fd` at byte `offset`.
    ///
    /// The same acceptance and ownership contract as
    /// [`Handle::submit_read`] applies; the buffer is handed back to the
    /// callback unchanged.
    pub fn submit_write<B, F>(&self, fd: RawFd, offset: u64, buf: B, complete: F) -> io::Result<()>
    where
        B: StableBuf,
        F: FnOnce(&Handle, io::Result<usize>, B) + 'static,
    {
        self.check_running()?;
        validate_fd(fd)?;
        validate_offset(offset)?;
        if buf.bytes_init() == 0 {
            return Err(SubmitError::invalid("empty write buffer").into());
        }
        self.enqueue(WriteOp::new(fd, offset, buf, complete), aio::write)
    }

    /// Submit an asynchronous sync of `fd`.
    ///
    /// The callback's transferred count is always zero.
    pub fn submit_sync<F>(&self, fd: RawFd, mode: SyncMode, complete: F) -> io::Result<()>
    where
        F: FnOnce(&Handle, io::Result<usize>) + 'static,
    {
        self.check_running()?;
        validate_fd(fd)?;
        self.enqueue(SyncOp::new(fd, complete), move |acb| aio::fsync(mode, acb))
    }

    /// Number of operations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.shared.registry.borrow().len()
    }

    fn check_running(&self) -> Result<(), SubmitError> {
        if self.shared.status.get() == Status::Running {
            Ok(())
        } else {
            Err(SubmitError::shutting_down())
        }
    }

    /// Register the record, then hand its control block to the facility.
    ///
    /// The registry borrow is held across the submission call; nothing
    /// re-enters the bridge from inside an `aio_*` submission.
    fn enqueue(
        &self,
        op: Box<dyn Operation>,
        submit: impl FnOnce(&mut libc::aiocb) -> io::Result<()>,
    ) -> io::Result<()> {
        let mut registry = self.shared.registry.borrow_mut();
        let record = registry.insert(op);
        match submit(record.control_block()) {
            Ok(()) => {
                trace!(target: LOG, "submit.accepted in_flight={}", registry.len());
                Ok(())
            }
            Err(err) => {
                registry.discard_last();
                trace!(target: LOG, "submit.rejected {}", err);
                Err(SubmitError::rejected(err).into())
            }
        }
    }
}

impl Shared {
    /// Rescan the registry and resolve every finished operation.
    ///
    /// The completion signal carries no operation identity, so each
    /// notification re-polls all in-flight control blocks. A record is
    /// removed and reclaimed before its callback runs; a callback may
    /// therefore submit new operations, which the same pass observes as
    /// in-progress. A notification with nothing finished reaps nothing.
    fn reap(&self, handle: &Handle) {
        let mut index = 0;
        let mut reaped = 0usize;
        loop {
            // Take the next finished record out of the registry, releasing
            // the borrow before calling out.
            let finished = {
                let mut registry = self.registry.borrow_mut();
                loop {
                    let Some(record) = registry.get_mut(index) else {
                        break None;
                    };
                    match aio::status(record.control_block()) {
                        OpStatus::InProgress => index += 1,
                        OpStatus::Finished(code) => match registry.remove(index) {
                            Some(mut record) => {
                                let count = aio::reclaim(record.control_block());
                                break Some((record, code, count));
                            }
                            None => break None,
                        },
                    }
                }
            };
            let Some((record, code, count)) = finished else {
                break;
            };
            let result = if code == 0 {
                Ok(count.max(0) as usize)
            } else {
                Err(io::Error::from_raw_os_error(code))
            };
            trace!(target: LOG, "reap.finished status={} transferred={}", code, count);
            record.complete(handle, result);
            reaped += 1;
        }
        if reaped > 0 {
            debug!(target: LOG, "reap.resolved {}", reaped);
        } else {
            trace!(target: LOG, "reap.idle");
        }
    }

    /// Discard every still-registered record without invoking callbacks.
    ///
    /// The kernel may still be writing through record buffers, so each
    /// record is cancelled and then waited on until its control block
    /// leaves `EINPROGRESS` before it is freed. Records that cannot be
    /// proven quiescent are leaked rather than freed while the kernel may
    /// still hold their buffers.
    fn abandon(&self) {
        let mut records = self.registry.borrow_mut().take_all();
        if records.is_empty() {
            return;
        }
        warn!(target: LOG, "shutdown.abandoning {}", records.len());
        for record in records.iter_mut() {
            aio::cancel(record.control_block());
        }
        loop {
            let pending: SmallVec<[*const libc::aiocb; 8]> = records
                .iter_mut()
                .filter_map(|record| {
                    let acb = record.control_block();
                    (aio::status(acb) == OpStatus::InProgress)
                        .then_some(acb as *const libc::aiocb)
                })
                .collect();
            if pending.is_empty() {
                break;
            }
            if let Err(err) = aio::suspend(&pending) {
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                warn!(target: LOG, "shutdown.suspend.failed {}", err);
                for record in records.drain(..) {
                    std::mem::forget(record);
                }
                return;
            }
        }
        for record in records.iter_mut() {
            aio::reclaim(record.control_block());
        }
    }
}

fn validate_fd(fd: RawFd) -> Result<(), SubmitError> {
    if fd < 0 {
        return Err(SubmitError::invalid("negative file descriptor"));
    }
    Ok(())
}

fn validate_offset(offset: u64) -> Result<(), SubmitError> {
    if offset > i64::MAX as u64 {
        return Err(SubmitError::invalid("offset exceeds off_t range"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::os::raw::c_int;

    use super::*;

    /// Reactor that accepts subscriptions and never dispatches.
    struct InertReactor;

    impl Reactor for InertReactor {
        type Watch = ();

        fn watch_signal(&self, _: c_int, _: Box<dyn FnMut()>) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn rejects_negative_descriptor() {
        let bridge = Bridge::new(&InertReactor).unwrap();
        let handle = bridge.handle();
        let err = handle
            .submit_read(-1, 0, Vec::with_capacity(16), |_: &Handle, _, _: Vec<u8>| {})
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(bridge.in_flight(), 0);
    }

    #[test]
    fn rejects_zero_capacity_read_buffer() {
        let bridge = Bridge::new(&InertReactor).unwrap();
        let err = bridge
            .handle()
            .submit_read(0, 0, Vec::new(), |_: &Handle, _, _: Vec<u8>| {})
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(bridge.in_flight(), 0);
    }

    #[test]
    fn rejects_empty_write_buffer() {
        let bridge = Bridge::new(&InertReactor).unwrap();
        let err = bridge
            .handle()
            .submit_write(0, 0, Vec::new(), |_: &Handle, _, _: Vec<u8>| {})
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(bridge.in_flight(), 0);
    }

    #[test]
    fn rejects_offset_beyond_file_offset_range() {
        let bridge = Bridge::new(&InertReactor).unwrap();
        let err = bridge
            .handle()
            .submit_read(0, u64::MAX, Vec::with_capacity(16), |_: &Handle, _, _: Vec<u8>| {})
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(bridge.in_flight(), 0);
    }

    #[test]
    fn failed_subscription_creates_nothing() {
        struct FailingReactor;

        impl Reactor for FailingReactor {
            type Watch = ();

            fn watch_signal(&self, _: c_int, _: Box<dyn FnMut()>) -> io::Result<()> {
                Err(io::Error::from_raw_os_error(libc::ENOSYS))
            }
        }

        let err = Bridge::new(&FailingReactor).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOSYS));
    }

    #[test]
    fn surviving_handle_refuses_submissions() {
        let bridge = Bridge::new(&InertReactor).unwrap();
        let handle = bridge.handle();
        drop(bridge);
        let err = handle
            .submit_sync(0, SyncMode::Data, |_: &Handle, _| {})
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert_eq!(handle.in_flight(), 0);
    }
}
