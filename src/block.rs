//! Block header layout and free-list splicing for [`crate::var_pool::VarPool`].
//!
//! ```text
//!   Live block:
//!   ┌────────────────────┬───────────────────────────────────────┐
//!   │  size (usize)      │              user payload             │
//!   └────────────────────┴───────────────────────────────────────┘
//!   ▲                    ▲
//!   block_ptr            payload_ptr (returned to the caller)
//!
//!   Freed block (same bytes, payload reinterpreted as two links):
//!   ┌────────────────────┬───────────────────┬───────────────────┬───────┐
//!   │  size (usize)      │  next (usize)     │  prev (usize)     │ free  │
//!   └────────────────────┴───────────────────┴───────────────────┴───────┘
//! ```
//!
//! `next`/`prev` are `0` for "null": a block at the very start of a buffer
//! is never itself linked as `0`, since links are stored as absolute
//! addresses and the allocator's buffer is never mapped at address zero.

use std::mem;
use std::ptr::NonNull;

use crate::buffer::WORD;

/// Bytes occupied by the block header (just the `size` field).
pub(crate) const HEADER_SIZE: usize = mem::size_of::<usize>();

/// Smallest block that can ever be put on a free list: header plus two
/// link fields. Also used as the VarPool size-class granularity.
pub(crate) const MIN_BLOCK: usize = HEADER_SIZE + 2 * WORD;

#[inline]
fn size_addr(block: NonNull<u8>) -> *mut usize {
  block.as_ptr() as *mut usize
}

#[inline]
fn next_addr(block: NonNull<u8>) -> *mut usize {
  // SAFETY: callers only invoke this on blocks at least `MIN_BLOCK` bytes,
  // which reserves room for the `next` link right after the header.
  unsafe { block.as_ptr().add(HEADER_SIZE) as *mut usize }
}

#[inline]
fn prev_addr(block: NonNull<u8>) -> *mut usize {
  // SAFETY: see `next_addr`; `prev` sits one word after `next`.
  unsafe { block.as_ptr().add(HEADER_SIZE + WORD) as *mut usize }
}

/// Reads the total block size (header included) from `block`'s header.
///
/// # Safety
/// `block` must point to a live header written by [`write_size`].
pub(crate) unsafe fn read_size(block: NonNull<u8>) -> usize {
  unsafe { size_addr(block).read() }
}

/// Writes the total block size (header included) into `block`'s header.
///
/// # Safety
/// `block` must be valid for at least `HEADER_SIZE` bytes.
pub(crate) unsafe fn write_size(block: NonNull<u8>, size: usize) {
  unsafe { size_addr(block).write(size) };
}

/// Returns the user payload pointer for a live block.
///
/// # Safety
/// `block` must point to a live header.
pub(crate) unsafe fn payload_of(block: NonNull<u8>) -> NonNull<u8> {
  // SAFETY: forwarded from the caller's obligation.
  unsafe { NonNull::new_unchecked(block.as_ptr().add(HEADER_SIZE)) }
}

/// Recovers the block header pointer from a payload pointer.
///
/// # Safety
/// `payload` must have been returned by [`payload_of`] on some live block.
pub(crate) unsafe fn block_of(payload: NonNull<u8>) -> NonNull<u8> {
  // SAFETY: forwarded from the caller's obligation; inverse of `payload_of`.
  unsafe { NonNull::new_unchecked(payload.as_ptr().sub(HEADER_SIZE)) }
}

/// A doubly linked chain of freed blocks, threaded through each block's
/// own first two payload words. Intrusive: the list itself stores nothing
/// but `head`/`tail`/`len`.
#[derive(Debug, Default)]
pub(crate) struct FreeList {
  head: Option<NonNull<u8>>,
  tail: Option<NonNull<u8>>,
  len: usize,
}

impl FreeList {
  pub(crate) const fn new() -> Self {
    Self { head: None, tail: None, len: 0 }
  }

  pub(crate) fn len(&self) -> usize {
    self.len
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.head.is_none()
  }

  /// Threads `block` onto the head of the chain. `block`'s header must
  /// already hold its size.
  ///
  /// # Safety
  /// `block` must be valid for at least `MIN_BLOCK` bytes and not already
  /// be linked into any free list.
  pub(crate) unsafe fn push_front(&mut self, block: NonNull<u8>) {
    unsafe {
      next_addr(block).write(self.head.map_or(0, |h| h.as_ptr() as usize));
      prev_addr(block).write(0);

      if let Some(old_head) = self.head {
        prev_addr(old_head).write(block.as_ptr() as usize);
      } else {
        self.tail = Some(block);
      }

      self.head = Some(block);
      self.len += 1;
    }
  }

  /// Unlinks `block` from wherever it sits in the chain. `block` must
  /// currently be a member of this list.
  ///
  /// # Safety
  /// `block` must be a block currently linked into this exact list.
  unsafe fn unlink(&mut self, block: NonNull<u8>) {
    unsafe {
      let next = next_addr(block).read();
      let prev = prev_addr(block).read();

      match NonNull::new(prev as *mut u8) {
        Some(prev_block) => next_addr(prev_block).write(next),
        None => self.head = NonNull::new(next as *mut u8),
      }

      match NonNull::new(next as *mut u8) {
        Some(next_block) => prev_addr(next_block).write(prev),
        None => self.tail = NonNull::new(prev as *mut u8),
      }

      self.len -= 1;
    }
  }

  /// Pops the head of the chain (most recently freed block), giving LIFO
  /// reuse order.
  ///
  /// # Safety
  /// Every block ever pushed onto this list must still be validly mapped.
  pub(crate) unsafe fn pop_front(&mut self) -> Option<NonNull<u8>> {
    let head = self.head?;
    unsafe { self.unlink(head) };
    Some(head)
  }

  /// First-fit scan for a block whose total size is *exactly* `size`,
  /// unlinking and returning it. Used for bucket lookups: a bucket spans a
  /// range of sizes, but the allocator only ever reuses an exact match.
  ///
  /// # Safety
  /// Every block ever pushed onto this list must still be validly mapped.
  pub(crate) unsafe fn take_exact(&mut self, size: usize) -> Option<NonNull<u8>> {
    let mut cursor = self.head;
    while let Some(block) = cursor {
      let block_size = unsafe { read_size(block) };
      if block_size == size {
        unsafe { self.unlink(block) };
        return Some(block);
      }
      cursor = NonNull::new(unsafe { next_addr(block).read() } as *mut u8);
    }
    None
  }

  /// First-fit scan for a block whose total size is *at least* `size`,
  /// unlinking and returning it whole (the baseline design never splits
  /// the remainder). Used for the `large` list.
  ///
  /// # Safety
  /// Every block ever pushed onto this list must still be validly mapped.
  pub(crate) unsafe fn take_at_least(&mut self, size: usize) -> Option<NonNull<u8>> {
    let mut cursor = self.head;
    while let Some(block) = cursor {
      let block_size = unsafe { read_size(block) };
      if block_size >= size {
        unsafe { self.unlink(block) };
        return Some(block);
      }
      cursor = NonNull::new(unsafe { next_addr(block).read() } as *mut u8);
    }
    None
  }

  /// Sums the total size (header included) of every block on this list.
  /// Used by `VarPool::free_space`; not on the allocation fast path.
  ///
  /// # Safety
  /// Every block ever pushed onto this list must still be validly mapped.
  pub(crate) unsafe fn total_bytes(&self) -> usize {
    let mut cursor = self.head;
    let mut total = 0usize;
    while let Some(block) = cursor {
      total += unsafe { read_size(block) };
      cursor = NonNull::new(unsafe { next_addr(block).read() } as *mut u8);
    }
    total
  }

  /// Walks the chain from `head`, checking that it is acyclic and that
  /// `next`/`prev` are consistent inverses. Used by debug assertions and
  /// tests, not by the allocation fast path.
  #[cfg(test)]
  pub(crate) unsafe fn assert_integrity(&self) {
    let mut seen = std::collections::HashSet::new();
    let mut cursor = self.head;
    let mut prev_expected: usize = 0;
    let mut count = 0;

    while let Some(block) = cursor {
      let addr = block.as_ptr() as usize;
      assert!(seen.insert(addr), "free list is cyclic at {addr:#x}");
      let prev = unsafe { prev_addr(block).read() };
      assert_eq!(prev, prev_expected, "prev link inconsistent at {addr:#x}");

      prev_expected = addr;
      cursor = NonNull::new(unsafe { next_addr(block).read() } as *mut u8);
      count += 1;
    }

    assert_eq!(count, self.len, "free list length does not match traversal");
    match self.tail {
      Some(tail) => assert_eq!(tail.as_ptr() as usize, prev_expected),
      None => assert_eq!(self.len, 0),
    }
  }
}
