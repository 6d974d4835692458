//! Pending-operation records.
//!
//! Each submitted request is represented by one heap-allocated record
//! embedding the `libc::aiocb` handed to the kernel, the caller's
//! completion closure, and (for reads and writes) the owned data buffer.
//! The box gives the control block the stable address POSIX AIO requires;
//! the [`StableBuf`]/[`StableBufMut`] contract gives the data pointer a
//! stable address independent of moves of the owning value.
use std::io;
use std::mem;
use std::os::raw::c_int;
use std::os::unix::io::RawFd;

use crate::aio;
use crate::bridge::Handle;
use crate::buf::{StableBuf, StableBufMut};

/// Which variant of `aio_fsync` a sync request uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Synchronize file data only, as if by `fdatasync`.
    Data,
    /// Synchronize file data and metadata, as if by `fsync`.
    Full,
}

impl SyncMode {
    pub(crate) fn as_raw(self) -> c_int {
        match self {
            SyncMode::Data => libc::O_DSYNC,
            SyncMode::Full => libc::O_SYNC,
        }
    }
}

/// A registered in-flight operation.
///
/// Implementations own everything the kernel may touch until the record is
/// reclaimed: the control block and the data buffer.
pub(crate) trait Operation {
    /// The embedded control block, written in place by the kernel.
    fn control_block(&mut self) -> &mut libc::aiocb;

    /// Consume the record, invoking its completion callback.
    ///
    /// Called at most once, after the control block has been reclaimed
    /// with `aio_return`. Dropping a record instead of completing it
    /// discards the callback uninvoked.
    fn complete(self: Box<Self>, bridge: &Handle, result: io::Result<usize>);
}

/// Control block configured for the fixed completion signal.
fn control_block_for(
    fd: RawFd,
    offset: u64,
    buf: *mut libc::c_void,
    len: usize,
) -> libc::aiocb {
    // Safety: aiocb is plain data with private padding fields; zeroing is
    // the documented way to initialize one.
    let mut acb: libc::aiocb = unsafe { mem::zeroed() };
    acb.aio_fildes = fd;
    acb.aio_buf = buf;
    acb.aio_nbytes = len;
    acb.aio_offset = offset as libc::off_t;
    acb.aio_sigevent.sigev_notify = libc::SIGEV_SIGNAL;
    acb.aio_sigevent.sigev_signo = aio::COMPLETION_SIGNAL;
    acb
}

pub(crate) struct ReadOp<B, F> {
    acb: libc::aiocb,
    buf: B,
    complete: F,
}

impl<B, F> ReadOp<B, F>
where
    B: StableBufMut,
    F: FnOnce(&Handle, io::Result<usize>, B) + 'static,
{
    pub(crate) fn new(fd: RawFd, offset: u64, mut buf: B, complete: F) -> Box<Self> {
        let ptr = buf.stable_ptr_mut().cast();
        let len = buf.bytes_remaining();
        Box::new(Self {
            acb: control_block_for(fd, offset, ptr, len),
            buf,
            complete,
        })
    }
}

impl<B, F> Operation for ReadOp<B, F>
where
    B: StableBufMut,
    F: FnOnce(&Handle, io::Result<usize>, B) + 'static,
{
    fn control_block(&mut self) -> &mut libc::aiocb {
        &mut self.acb
    }

    fn complete(self: Box<Self>, bridge: &Handle, result: io::Result<usize>) {
        let me = *self;
        let mut buf = me.buf;
        if let Ok(n) = &result {
            // Safety: the kernel reports `n` bytes written into the
            // buffer, and `n` cannot exceed the submitted capacity.
            unsafe { buf.set_init(*n) };
        }
        (me.complete)(bridge, result, buf);
    }
}

pub(crate) struct WriteOp<B, F> {
    acb: libc::aiocb,
    buf: B,
    complete: F,
}

impl<B, F> WriteOp<B, F>
where
    B: StableBuf,
    F: FnOnce(&Handle, io::Result<usize>, B) + 'static,
{
    pub(crate) fn new(fd: RawFd, offset: u64, buf: B, complete: F) -> Box<Self> {
        // The kernel only reads through the pointer for writes; aiocb has a
        // single buffer field for both directions.
        let ptr = buf.stable_ptr() as *mut libc::c_void;
        let len = buf.bytes_init();
        Box::new(Self {
            acb: control_block_for(fd, offset, ptr, len),
            buf,
            complete,
        })
    }
}

impl<B, F> Operation for WriteOp<B, F>
where
    B: StableBuf,
    F: FnOnce(&Handle, io::Result<usize>, B) + 'static,
{
    fn control_block(&mut self) -> &mut libc::aiocb {
        &mut self.acb
    }

    fn complete(self: Box<Self>, bridge: &Handle, result: io::Result<usize>) {
        let me = *self;
        (me.complete)(bridge, result, me.buf);
    }
}

pub(crate) struct SyncOp<F> {
    acb: libc::aiocb,
    complete: F,
}

impl<F> SyncOp<F>
where
    F: FnOnce(&Handle, io::Result<usize>) + 'static,
{
    pub(crate) fn new(fd: RawFd, complete: F) -> Box<Self> {
        Box::new(Self {
            acb: control_block_for(fd, 0, std::ptr::null_mut(), 0),
            complete,
        })
    }
}

impl<F> Operation for SyncOp<F>
where
    F: FnOnce(&Handle, io::Result<usize>) + 'static,
{
    fn control_block(&mut self) -> &mut libc::aiocb {
        &mut self.acb
    }

    fn complete(self: Box<Self>, bridge: &Handle, result: io::Result<usize>) {
        let me = *self;
        (me.complete)(bridge, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_record_populates_control_block() {
        let buf = Vec::with_capacity(64);
        let mut op = ReadOp::new(7, 128, buf, |_: &Handle, _, _: Vec<u8>| {});
        let acb = op.control_block();
        assert_eq!(acb.aio_fildes, 7);
        assert_eq!(acb.aio_nbytes, 64);
        assert_eq!(acb.aio_offset, 128);
        assert_eq!(acb.aio_sigevent.sigev_notify, libc::SIGEV_SIGNAL);
        assert_eq!(acb.aio_sigevent.sigev_signo, aio::COMPLETION_SIGNAL);
        assert!(!acb.aio_buf.is_null());
    }

    #[test]
    fn write_record_uses_initialized_length() {
        let buf = vec![0u8; 32];
        let mut op = WriteOp::new(3, 0, buf, |_: &Handle, _, _: Vec<u8>| {});
        let acb = op.control_block();
        assert_eq!(acb.aio_nbytes, 32);
    }

    #[test]
    fn sync_record_carries_no_buffer() {
        let mut op = SyncOp::new(5, |_: &Handle, _| {});
        let acb = op.control_block();
        assert!(acb.aio_buf.is_null());
        assert_eq!(acb.aio_nbytes, 0);
        assert_eq!(acb.aio_sigevent.sigev_signo, aio::COMPLETION_SIGNAL);
    }

    #[test]
    fn sync_mode_maps_to_open_flags() {
        assert_eq!(SyncMode::Data.as_raw(), libc::O_DSYNC);
        assert_eq!(SyncMode::Full.as_raw(), libc::O_SYNC);
    }
}
