//! Traits for I/O buffers.
//!
//! POSIX AIO holds a raw pointer into the data buffer for the lifetime of
//! an operation, while the buffer value itself moves into the pending
//! record. [`StableBuf`] and [`StableBufMut`] restrict operations to
//! buffer types whose data pointer survives such moves, which lets the
//! completion callback receive the buffer back once the kernel is done
//! with it.
use bytes::{Bytes, BytesMut};

/// [`StableBuf`] is a trait for types which expose a stable pointer into
/// initialized memory. Write operations read their data through it.
///
/// ### Safety
/// Implementors must ensure that the pointer returned by `stable_ptr` is
/// valid, points to at least `bytes_init` initialized bytes, and remains
/// valid when the owning value is moved — the data must not live inline in
/// the value.
pub unsafe trait StableBuf: Unpin + 'static {
    /// Returns a pointer to the stable memory location.
    fn stable_ptr(&self) -> *const u8;

    /// Returns the number of initialized bytes.
    fn bytes_init(&self) -> usize;

    /// Returns a slice of the initialized bytes.
    fn as_slice(&self) -> &[u8] {
        // Safety: `bytes_init` returns the number of initialized bytes.
        unsafe { std::slice::from_raw_parts(self.stable_ptr(), self.bytes_init()) }
    }
}

/// [`StableBufMut`] is a trait for types which expose a stable mutable
/// pointer into memory. Read operations fill their destination through it.
///
/// ### Safety
/// Implementors must ensure that the pointer returned by `stable_ptr_mut`
/// is valid for writes of `bytes_remaining` bytes and remains valid when
/// the owning value is moved.
pub unsafe trait StableBufMut: Unpin + 'static {
    /// Returns a mutable pointer to the stable memory location.
    fn stable_ptr_mut(&mut self) -> *mut u8;

    /// Returns the writable capacity of the buffer.
    fn bytes_remaining(&self) -> usize;

    /// Set the number of initialized bytes.
    ///
    /// ### Safety
    /// Callers should ensure that all bytes from 0..init_len are initialized.
    unsafe fn set_init(&mut self, init_len: usize);
}

unsafe impl StableBuf for Vec<u8> {
    fn stable_ptr(&self) -> *const u8 {
        self.as_ptr()
    }

    fn bytes_init(&self) -> usize {
        self.len()
    }
}

unsafe impl StableBufMut for Vec<u8> {
    fn stable_ptr_mut(&mut self) -> *mut u8 {
        self.as_mut_ptr()
    }

    fn bytes_remaining(&self) -> usize {
        self.capacity()
    }

    unsafe fn set_init(&mut self, init_len: usize) {
        self.set_len(init_len);
    }
}

unsafe impl StableBuf for Box<[u8]> {
    fn stable_ptr(&self) -> *const u8 {
        self.as_ptr()
    }

    fn bytes_init(&self) -> usize {
        self.len()
    }
}

unsafe impl StableBufMut for Box<[u8]> {
    fn stable_ptr_mut(&mut self) -> *mut u8 {
        self.as_mut_ptr()
    }

    fn bytes_remaining(&self) -> usize {
        self.len()
    }

    unsafe fn set_init(&mut self, _: usize) {}
}

unsafe impl StableBuf for &'static [u8] {
    fn stable_ptr(&self) -> *const u8 {
        self.as_ptr()
    }

    fn bytes_init(&self) -> usize {
        self.len()
    }
}

unsafe impl StableBuf for &'static str {
    fn stable_ptr(&self) -> *const u8 {
        self.as_ptr()
    }

    fn bytes_init(&self) -> usize {
        str::len(self)
    }
}

unsafe impl StableBuf for Bytes {
    fn stable_ptr(&self) -> *const u8 {
        self.as_ptr()
    }

    fn bytes_init(&self) -> usize {
        self.len()
    }
}

unsafe impl StableBuf for BytesMut {
    fn stable_ptr(&self) -> *const u8 {
        self.as_ptr()
    }

    fn bytes_init(&self) -> usize {
        self.len()
    }
}

unsafe impl StableBufMut for BytesMut {
    fn stable_ptr_mut(&mut self) -> *mut u8 {
        self.as_mut_ptr()
    }

    fn bytes_remaining(&self) -> usize {
        self.capacity()
    }

    unsafe fn set_init(&mut self, init_len: usize) {
        if self.len() < init_len {
            self.set_len(init_len)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{StableBuf, StableBufMut};
    use bytes::BytesMut;

    #[test]
    fn vec_reports_capacity_for_reads_and_len_for_writes() {
        let buf = Vec::with_capacity(8);
        assert_eq!(StableBufMut::bytes_remaining(&buf), 8);
        assert_eq!(StableBuf::bytes_init(&buf), 0);
    }

    #[test]
    fn vec_set_init_exposes_kernel_written_bytes() {
        let mut buf = Vec::with_capacity(8);
        // Simulate the kernel filling the first four bytes.
        unsafe {
            std::ptr::write_bytes(buf.stable_ptr_mut(), 7u8, 4);
            buf.set_init(4);
        }
        assert_eq!(buf.as_slice(), &[7, 7, 7, 7]);
    }

    #[test]
    fn bytes_mut_set_init_never_shrinks() {
        let mut buf = BytesMut::from(&b"abcdef"[..]);
        unsafe { buf.set_init(2) };
        assert_eq!(buf.bytes_init(), 6);
    }
}
