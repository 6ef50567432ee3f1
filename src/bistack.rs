//! # BiStack
//!
//! A bump allocator that grows from both ends of one buffer toward the
//! middle. `alloc_front` and `alloc_back` are independent monotonic
//! cursors; either side can be reset without disturbing the other.
//!
//! ```text
//!   ┌──────────────┬───────────────────────────┬──────────────────┐
//!   │  front stack  │          margin           │    back stack    │
//!   └──────────────┴───────────────────────────┴──────────────────┘
//!   base          front                        back     base + capacity
//! ```
//!
//! Neither `alloc_front` nor `alloc_back` zeroes the returned memory —
//! unlike `VarPool`, this allocator never touches the payload, only the
//! two cursors.

use std::ptr::NonNull;

use log::{debug, trace};

use crate::buffer::{RawBuffer, WORD};
use crate::error::AllocatorError;

/// Double-ended bump allocator over a single buffer.
///
/// `'buf` is `'static` for an owning stack (see [`BiStack::new`]) or the
/// lifetime of a caller-supplied slice for a borrowing one (see
/// [`BiStack::from_buffer`]).
pub struct BiStack<'buf> {
  buffer: RawBuffer,
  front: NonNull<u8>,
  back: NonNull<u8>,
  _borrow: std::marker::PhantomData<&'buf mut [u8]>,
}

impl BiStack<'static> {
  /// Creates a `BiStack` owning a freshly allocated `len`-byte buffer.
  pub fn new(len: usize) -> Result<Self, AllocatorError> {
    let buffer = RawBuffer::owned(len)?;
    Ok(Self::from_raw(buffer))
  }
}

impl<'buf> BiStack<'buf> {
  /// Creates a `BiStack` over a caller-supplied buffer. The buffer is
  /// never freed by this stack.
  pub fn from_buffer(buf: &'buf mut [u8]) -> Result<Self, AllocatorError> {
    let buffer = RawBuffer::borrowed(buf, WORD)?;
    Ok(Self::from_raw(buffer))
  }

  fn from_raw(buffer: RawBuffer) -> Self {
    let front = buffer.base();
    let back = back_bound(&buffer);
    debug!("BiStack: created with {} bytes", buffer.capacity());

    Self { buffer, front, back, _borrow: std::marker::PhantomData }
  }

  /// Total capacity of the backing buffer, in bytes.
  pub fn capacity(&self) -> usize {
    self.buffer.capacity()
  }

  /// Bumps `front` forward by `n` bytes (rounded up to word alignment).
  /// `None` if doing so would cross `back`. Contents are **not** zeroed.
  pub fn alloc_front(&mut self, n: usize) -> Option<NonNull<u8>> {
    let aligned = align_up(n)?;
    let front_addr = self.front.as_ptr() as usize;
    let back_addr = self.back.as_ptr() as usize;

    let new_front = front_addr.checked_add(aligned)?;
    if new_front > back_addr {
      debug!("BiStack::alloc_front({n}): would cross back cursor, exhausted");
      return None;
    }

    let r = self.front;
    // SAFETY: `new_front <= back_addr <= base + capacity`.
    self.front = unsafe { NonNull::new_unchecked(new_front as *mut u8) };
    trace!("BiStack::alloc_front({n}): bumped front to {new_front:#x}");
    Some(r)
  }

  /// Bumps `back` backward by `n` bytes (rounded up to word alignment),
  /// returning the new `back`. `None` if doing so would cross `front`.
  /// Contents are **not** zeroed.
  pub fn alloc_back(&mut self, n: usize) -> Option<NonNull<u8>> {
    let aligned = align_up(n)?;
    let front_addr = self.front.as_ptr() as usize;
    let back_addr = self.back.as_ptr() as usize;

    if back_addr < front_addr + aligned {
      debug!("BiStack::alloc_back({n}): would cross front cursor, exhausted");
      return None;
    }

    let new_back = back_addr - aligned;
    // SAFETY: `front_addr <= new_back`, derived above.
    self.back = unsafe { NonNull::new_unchecked(new_back as *mut u8) };
    trace!("BiStack::alloc_back({n}): bumped back to {new_back:#x}");
    Some(self.back)
  }

  /// Resets `front` to the start of the buffer. Does not affect `back` or
  /// anything already handed out from the back side.
  pub fn reset_front(&mut self) {
    self.front = self.buffer.base();
  }

  /// Resets `back` to the end of the buffer. Does not affect `front` or
  /// anything already handed out from the front side.
  pub fn reset_back(&mut self) {
    self.back = back_bound(&self.buffer);
  }

  /// Resets both cursors.
  pub fn reset_all(&mut self) {
    self.reset_front();
    self.reset_back();
  }

  /// `back - front`, in bytes. Non-positive indicates exhaustion (neither
  /// side can grow further without colliding with the other).
  pub fn margins(&self) -> isize {
    self.back.as_ptr() as isize - self.front.as_ptr() as isize
  }
}

fn back_bound(buffer: &RawBuffer) -> NonNull<u8> {
  // SAFETY: `buffer.base() + buffer.capacity()` is the buffer's exclusive
  // end, a valid (one-past-the-end) pointer.
  unsafe { NonNull::new_unchecked(buffer.base().as_ptr().add(buffer.capacity())) }
}

/// Rounds `n` up to word alignment, returning `None` on overflow instead
/// of panicking (treated the same as exhaustion by callers).
fn align_up(n: usize) -> Option<usize> {
  n.checked_add(WORD - 1).map(|v| v & !(WORD - 1))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn construction_rejects_zero_length() {
    assert_eq!(BiStack::new(0).unwrap_err(), AllocatorError::ZeroCapacity);
  }

  #[test]
  fn monotone_bounds_hold_as_both_sides_grow() {
    let mut stack = BiStack::new(128).unwrap();

    stack.alloc_front(10).unwrap();
    stack.alloc_back(10).unwrap();
    stack.alloc_front(20).unwrap();

    let base = stack.buffer.base().as_ptr() as usize;
    let front = stack.front.as_ptr() as usize;
    let back = stack.back.as_ptr() as usize;

    assert!(base <= front);
    assert!(front <= back);
    assert!(back <= base + stack.capacity());
  }

  // S5 — BiStack collision.
  #[test]
  fn s5_collision_leaves_a_small_margin() {
    let mut stack = BiStack::new(100).unwrap();

    assert!(stack.alloc_front(60).is_some());
    assert!(stack.alloc_back(60).is_none());
    assert!(stack.alloc_back(30).is_some());
    assert!(stack.margins() <= 10);
  }

  // S6 — BiStack independent reset.
  #[test]
  fn s6_front_reset_does_not_disturb_back_allocation() {
    let mut stack = BiStack::new(100).unwrap();

    stack.alloc_front(60).unwrap();
    let back_block = stack.alloc_back(30).unwrap();
    let back_addr_before = back_block.as_ptr() as usize;

    stack.reset_front();
    assert!(stack.alloc_front(50).is_some());

    assert_eq!(stack.back.as_ptr() as usize, back_addr_before);
  }

  #[test]
  fn reset_all_restores_both_cursors() {
    let mut stack = BiStack::new(64).unwrap();
    stack.alloc_front(10).unwrap();
    stack.alloc_back(10).unwrap();

    stack.reset_all();

    assert_eq!(stack.front, stack.buffer.base());
    assert_eq!(stack.back, back_bound(&stack.buffer));
    assert_eq!(stack.margins(), stack.capacity() as isize);
  }

  #[test]
  fn alloc_never_writes_to_payload() {
    let mut stack = BiStack::new(64).unwrap();
    let p = stack.alloc_front(16).unwrap();
    unsafe { p.as_ptr().write_bytes(0xEE, 16) };

    // A second, independent allocation must not disturb the first.
    let _q = stack.alloc_back(16).unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(p.as_ptr(), 16) };
    assert!(bytes.iter().all(|&b| b == 0xEE));
  }
}
