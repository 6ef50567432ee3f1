//! Buffer acquisition and release, shared by all three allocator engines.
//!
//! `libc::sbrk` grows the process heap in place by moving a single,
//! process-wide program break, so it cannot give three independently
//! sized, independently freed allocator instances memory of their own.
//! `RawBuffer` goes through `libc` for raw memory rather than
//! `std::alloc`, acquiring it with `libc::malloc`/`libc::free`, which
//! supports any number of independently owned regions.
//!
//! This module is the "clearly delimited unsafe core" the outer engines
//! build their safe-pointer (`NonNull<u8>`) surface on top of.

use std::ptr::NonNull;
use std::{mem, slice};

use log::{debug, trace};

use crate::error::AllocatorError;

/// Who is responsible for releasing a buffer's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ownership {
  /// The buffer was obtained from `libc::malloc` and must be `libc::free`d.
  Owned,
  /// The buffer was supplied by the caller; release is a no-op.
  Borrowed,
}

/// A contiguous byte buffer plus the bookkeeping needed to release it
/// correctly exactly once.
pub(crate) struct RawBuffer {
  base: NonNull<u8>,
  capacity: usize,
  ownership: Ownership,
}

impl RawBuffer {
  /// Acquires `capacity` bytes from the host allocation facility.
  pub(crate) fn owned(capacity: usize) -> Result<Self, AllocatorError> {
    if capacity == 0 {
      return Err(AllocatorError::ZeroCapacity);
    }

    // SAFETY: `capacity` is non-zero; the returned pointer is checked for
    // null before use, matching `malloc`'s contract.
    let raw = unsafe { libc::malloc(capacity) } as *mut u8;
    let base = NonNull::new(raw).ok_or(AllocatorError::AllocationFailed { requested: capacity })?;

    // SAFETY: `base` was just obtained from `malloc(capacity)` and is
    // writable for `capacity` bytes.
    unsafe { base.as_ptr().write_bytes(0, capacity) };

    debug!("RawBuffer: acquired {capacity} owned bytes at {base:p}");

    Ok(Self { base, capacity, ownership: Ownership::Owned })
  }

  /// Wraps a caller-supplied buffer. The allocator built on top of this
  /// `RawBuffer` never frees `buf`; the caller's lifetime governs it.
  pub(crate) fn borrowed(buf: &mut [u8], required_align: usize) -> Result<Self, AllocatorError> {
    if buf.is_empty() {
      return Err(AllocatorError::ZeroCapacity);
    }

    let base = NonNull::new(buf.as_mut_ptr()).ok_or(AllocatorError::ZeroCapacity)?;

    if (base.as_ptr() as usize) % required_align != 0 {
      return Err(AllocatorError::Misaligned { address: base.as_ptr() as usize, required: required_align });
    }

    trace!("RawBuffer: borrowed {} bytes at {:p}", buf.len(), base);

    Ok(Self { base, capacity: buf.len(), ownership: Ownership::Borrowed })
  }

  pub(crate) fn base(&self) -> NonNull<u8> {
    self.base
  }

  pub(crate) fn capacity(&self) -> usize {
    self.capacity
  }

  /// Zeroes every byte of the buffer. Used by `VarPool::reset`.
  pub(crate) fn zero(&mut self) {
    // SAFETY: `base` is valid for `capacity` bytes for the lifetime of
    // this `RawBuffer`.
    unsafe { self.base.as_ptr().write_bytes(0, self.capacity) };
  }

  /// Borrows the buffer's contents as a slice, for tests and invariant
  /// checks that want to read raw bytes without going through an engine.
  #[cfg(test)]
  pub(crate) fn as_slice(&self) -> &[u8] {
    // SAFETY: `base` is valid for `capacity` bytes.
    unsafe { slice::from_raw_parts(self.base.as_ptr(), self.capacity) }
  }

  pub(crate) fn is_owned(&self) -> bool {
    self.ownership == Ownership::Owned
  }
}

impl Drop for RawBuffer {
  fn drop(&mut self) {
    if self.ownership == Ownership::Owned {
      trace!("RawBuffer: releasing {} owned bytes at {:p}", self.capacity, self.base);
      // SAFETY: `base` was obtained from `libc::malloc` in `Self::owned`
      // and has not been freed yet (this runs at most once per instance).
      unsafe { libc::free(self.base.as_ptr() as *mut libc::c_void) };
    }
  }
}

/// Platform word size, the strictest alignment this crate guarantees
/// without caller-side over-allocation.
pub(crate) const WORD: usize = mem::size_of::<usize>();
