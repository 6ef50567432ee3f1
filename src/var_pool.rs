//! # VarPool
//!
//! A hybrid allocator servicing requests of arbitrary size: freed blocks
//! are kept on segregated, exact-size free lists (fast, deterministic
//! reuse); anything that can't be satisfied from a free list is carved
//! fresh from an untouched bump region.
//!
//! ## Memory layout
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                         owned/borrowed buffer                    │
//!   ├───────────────────────────────────┬──────────────────────────────┤
//!   │        blocks (live + free)       │         bump region          │
//!   └───────────────────────────────────┴──────────────────────────────┘
//!   base                              cursor                  base + capacity
//! ```
//!
//! Carved blocks are taken off the *top* of the bump region, so `cursor`
//! walks from `base + capacity` down toward `base` as the pool fills up.
//! Freed blocks never move; they're threaded onto one of `B` segregated
//! free lists (`buckets`) keyed by a linear size class, or onto `large`
//! once a block's size exceeds the biggest bucket's range.
//!
//! ## Why no splitting or coalescing
//!
//! Buckets are exact-size-class free lists: an allocation request only
//! ever reuses a free block of the *same* total size, never a larger one
//! split down. This trades internal fragmentation for two guarantees that
//! matter more in the embedded/arena settings this allocator targets:
//! amortized O(1) reuse (no split bookkeeping, no coalescing scan), and a
//! fully deterministic reuse address for alloc/free/alloc cycles of the
//! same size (`S1` in the test suite below).

use std::array;
use std::ptr::{self, NonNull};

use log::{debug, trace, warn};

use crate::align_to;
use crate::block::{self, FreeList, HEADER_SIZE, MIN_BLOCK};
use crate::buffer::{RawBuffer, WORD};
use crate::error::AllocatorError;

/// Number of segregated size-class free lists.
pub const VAR_POOL_BUCKETS: usize = 12;

/// Size-class granularity: the minimum splittable block (header + two
/// free-list links). Bucket `k` holds blocks whose total size falls in
/// `[(k + 1) * GRANULARITY, (k + 2) * GRANULARITY)`.
pub const GRANULARITY: usize = MIN_BLOCK;

/// Arbitrary-size allocator over a single buffer, combining segregated
/// exact-size free lists with a bump-arena fallback.
///
/// `'buf` is `'static` for an owning pool (see [`VarPool::new`]) or the
/// lifetime of a caller-supplied slice for a borrowing one (see
/// [`VarPool::from_buffer`]).
pub struct VarPool<'buf> {
  buffer: RawBuffer,
  cursor: NonNull<u8>,
  buckets: [FreeList; VAR_POOL_BUCKETS],
  large: FreeList,
  _borrow: std::marker::PhantomData<&'buf mut [u8]>,
}

// SAFETY: `VarPool` owns or exclusively borrows its buffer; nothing about
// it is `Send`-unsafe as long as the whole value moves together, but the
// crate makes no concurrency claims (see the Non-goals), so neither
// `Send` nor `Sync` is implemented.

impl VarPool<'static> {
  /// Creates a `VarPool` that owns a freshly allocated `capacity`-byte
  /// buffer, released when the pool is dropped.
  pub fn new(capacity: usize) -> Result<Self, AllocatorError> {
    let buffer = RawBuffer::owned(capacity)?;
    Self::from_raw(buffer)
  }
}

impl<'buf> VarPool<'buf> {
  /// Creates a `VarPool` over a caller-supplied buffer. The buffer is
  /// never freed by this pool; `buf`'s lifetime governs it, and the
  /// exclusive borrow here prevents the caller from touching it while the
  /// pool is alive.
  pub fn from_buffer(buf: &'buf mut [u8]) -> Result<Self, AllocatorError> {
    let buffer = RawBuffer::borrowed(buf, WORD)?;
    Self::from_raw(buffer)
  }

  fn from_raw(buffer: RawBuffer) -> Result<Self, AllocatorError> {
    if buffer.capacity() < MIN_BLOCK {
      return Err(AllocatorError::BufferTooSmall { actual: buffer.capacity(), minimum: MIN_BLOCK });
    }

    let cursor = initial_cursor(&buffer);

    debug!(
      "VarPool: created with {} bytes, {} buckets, granularity {}",
      buffer.capacity(),
      VAR_POOL_BUCKETS,
      GRANULARITY
    );

    Ok(Self {
      buffer,
      cursor,
      buckets: array::from_fn(|_| FreeList::new()),
      large: FreeList::new(),
      _borrow: std::marker::PhantomData,
    })
  }

  /// Total capacity of the backing buffer, in bytes.
  pub fn capacity(&self) -> usize {
    self.buffer.capacity()
  }

  /// Returns a zeroed block of at least `n` user bytes, aligned to the
  /// platform word. `None` if no free block or bump space satisfies the
  /// request.
  pub fn alloc(&mut self, n: usize) -> Option<NonNull<u8>> {
    let total = Self::round_size(n)?;
    let large_request = bucket_index(total).is_none();

    if let Some(block) = self.take_exact(total) {
      trace!("VarPool::alloc({n}): reused exact-size block of {total} bytes");
      return Some(self.finish_alloc(block));
    }

    if let Some(block) = self.carve_bump(total) {
      trace!("VarPool::alloc({n}): carved {total} bytes from bump region");
      return Some(self.finish_alloc(block));
    }

    if large_request {
      // SAFETY: every block ever linked into `large` is still validly
      // mapped inside this pool's buffer.
      if let Some(block) = unsafe { self.large.take_at_least(total) } {
        trace!("VarPool::alloc({n}): reused oversized block from the large list");
        return Some(self.finish_alloc(block));
      }
    }

    debug!("VarPool::alloc({n}): exhausted (needed {total} bytes)");
    None
  }

  /// Returns a block of at least `n` bytes, preserving `[0, min(old, n))`
  /// of `p`'s contents. `p = None` behaves like `alloc(n)`. On failure,
  /// `p` (if any) remains valid and `None` is returned.
  pub fn realloc(&mut self, p: Option<NonNull<u8>>, n: usize) -> Option<NonNull<u8>> {
    let Some(p) = p else {
      return self.alloc(n);
    };

    let Some(p) = self.validate(p) else {
      warn!("VarPool::realloc: pointer {p:p} is not a live block from this pool");
      return None;
    };

    // SAFETY: `p` was validated above to be a live payload from this pool.
    let block = unsafe { block::block_of(p) };
    // SAFETY: `block` is a live header.
    let old_total = unsafe { block::read_size(block) };
    let new_total = Self::round_size(n)?;

    if new_total <= old_total {
      trace!("VarPool::realloc: block at {block:p} already satisfies {n} bytes, unchanged");
      return Some(p);
    }

    let new_p = self.alloc(n)?;
    let old_user = old_total - HEADER_SIZE;
    let copy_len = old_user.min(n);

    // SAFETY: both `p` and `new_p` are live, non-overlapping, valid for
    // `copy_len` bytes (`copy_len <= old_user <= old_total - HEADER_SIZE`
    // and `copy_len <= n <= new_total - HEADER_SIZE`).
    unsafe { ptr::copy_nonoverlapping(p.as_ptr(), new_p.as_ptr(), copy_len) };

    self.free(Some(p));
    Some(new_p)
  }

  /// Returns `p`'s block to the appropriate free list. A `None`, or a
  /// pointer outside this pool's buffer, is silently ignored.
  pub fn free(&mut self, p: Option<NonNull<u8>>) {
    let Some(p) = p else { return };

    let Some(p) = self.validate(p) else {
      warn!("VarPool::free: pointer {p:p} is out of range or misaligned, ignoring");
      return;
    };

    // SAFETY: `p` was validated to be a live payload from this pool.
    let block = unsafe { block::block_of(p) };
    // SAFETY: `block` is a live header.
    let size = unsafe { block::read_size(block) };

    match bucket_index(size) {
      // SAFETY: `block` is not currently linked anywhere; it was live.
      Some(k) => unsafe { self.buckets[k].push_front(block) },
      None => unsafe { self.large.push_front(block) },
    }
  }

  /// Empties every free list, restores the bump region to the whole
  /// buffer, and zeroes every byte.
  pub fn reset(&mut self) {
    self.buffer.zero();
    for bucket in &mut self.buckets {
      *bucket = FreeList::new();
    }
    self.large = FreeList::new();
    self.cursor = initial_cursor(&self.buffer);
    debug!("VarPool::reset: {} bytes reclaimed", self.buffer.capacity());
  }

  /// Bump region size plus the total size (header included) of every
  /// block sitting on a free list.
  pub fn free_space(&self) -> usize {
    let bump = self.cursor.as_ptr() as usize - self.buffer.base().as_ptr() as usize;
    // SAFETY: every block ever linked into any of these lists is still
    // validly mapped inside this pool's buffer.
    let free_lists: usize = self.buckets.iter().chain(std::iter::once(&self.large)).map(|l| unsafe { l.total_bytes() }).sum();
    bump + free_lists
  }

  fn take_exact(&mut self, total: usize) -> Option<NonNull<u8>> {
    match bucket_index(total) {
      // SAFETY: every block ever linked into this bucket is still validly
      // mapped inside this pool's buffer.
      Some(k) => unsafe { self.buckets[k].take_exact(total) },
      // SAFETY: see above.
      None => unsafe { self.large.take_exact(total) },
    }
  }

  fn carve_bump(&mut self, total: usize) -> Option<NonNull<u8>> {
    let base_addr = self.buffer.base().as_ptr() as usize;
    let cursor_addr = self.cursor.as_ptr() as usize;

    if cursor_addr - base_addr < total {
      return None;
    }

    let block_addr = cursor_addr - total;
    // SAFETY: `block_addr >= base_addr`, so this stays inside the buffer,
    // and it's non-null since the buffer's base is never address zero.
    let block = unsafe { NonNull::new_unchecked(block_addr as *mut u8) };
    // SAFETY: `block` is valid for `total >= MIN_BLOCK > HEADER_SIZE` bytes.
    unsafe { block::write_size(block, total) };
    self.cursor = block;

    Some(block)
  }

  fn finish_alloc(&self, block: NonNull<u8>) -> NonNull<u8> {
    // SAFETY: `block` was just carved or taken from a free list of this
    // pool; its header holds its true total size.
    let size = unsafe { block::read_size(block) };
    // SAFETY: `block` is a live header.
    let payload = unsafe { block::payload_of(block) };
    // SAFETY: `payload` is valid for `size - HEADER_SIZE` bytes.
    unsafe { payload.as_ptr().write_bytes(0, size - HEADER_SIZE) };
    payload
  }

  /// Checks that `p` is a plausible payload pointer returned by this pool:
  /// inside the buffer and word-aligned. Does not (cannot, without a
  /// per-allocation side table) detect a double free or a pointer from a
  /// different pool.
  fn validate(&self, p: NonNull<u8>) -> Option<NonNull<u8>> {
    let addr = p.as_ptr() as usize;
    let base_addr = self.buffer.base().as_ptr() as usize;
    let end_addr = base_addr + self.buffer.capacity();

    if addr % WORD != 0 || addr < base_addr + HEADER_SIZE || addr >= end_addr {
      return None;
    }

    Some(p)
  }

  /// Rounds a user-visible request `n` up to a total block size (header
  /// included, word-aligned, at least `MIN_BLOCK`). `None` if `n` is too
  /// large to round without overflowing `usize` — treated as exhaustion by
  /// every caller, never a panic.
  fn round_size(n: usize) -> Option<usize> {
    let raw = n.checked_add(HEADER_SIZE)?;
    let aligned = raw.checked_add(WORD - 1)? & !(WORD - 1);
    Some(aligned.max(MIN_BLOCK))
  }
}

/// Rounds `capacity` down to the nearest multiple of `WORD`, so every block
/// carved off the top of the bump region starts at a word-aligned address
/// regardless of the buffer's raw byte length.
fn initial_cursor(buffer: &RawBuffer) -> NonNull<u8> {
  let aligned_capacity = buffer.capacity() & !(WORD - 1);
  // SAFETY: `aligned_capacity <= buffer.capacity()`, so this stays within
  // (or at) the buffer's exclusive end, and it's non-null since the
  // buffer's base is never address zero.
  unsafe { NonNull::new_unchecked(buffer.base().as_ptr().add(aligned_capacity)) }
}

/// Maps a total block size to its bucket index, or `None` if it belongs
/// on the `large` list instead.
fn bucket_index(total: usize) -> Option<usize> {
  let k = total / GRANULARITY - 1;
  if k < VAR_POOL_BUCKETS { Some(k) } else { None }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn construction_rejects_zero_and_undersized_buffers() {
    assert_eq!(VarPool::new(0).unwrap_err(), AllocatorError::ZeroCapacity);
    assert!(matches!(VarPool::new(4).unwrap_err(), AllocatorError::BufferTooSmall { .. }));
  }

  #[test]
  fn capacity_not_a_multiple_of_word_still_yields_aligned_and_freeable_blocks() {
    // 100 % size_of::<usize>() != 0 on every platform this crate targets
    // (8 or 4 byte words); the bump region must still hand out word-aligned
    // payloads, and `free` must accept the pointer back.
    let mut pool = VarPool::new(100).unwrap();
    let p = pool.alloc(16).unwrap();
    assert_eq!(p.as_ptr() as usize % WORD, 0);

    let before = pool.free_space();
    pool.free(Some(p));
    assert_eq!(pool.free_space(), before + align_to!(16 + HEADER_SIZE, WORD).max(MIN_BLOCK));
  }

  #[test]
  fn alloc_returns_none_instead_of_panicking_on_unrepresentable_size() {
    let mut pool = VarPool::new(1024).unwrap();
    assert!(pool.alloc(usize::MAX).is_none());

    let p = pool.alloc(16).unwrap();
    assert!(pool.realloc(Some(p), usize::MAX).is_none());
  }

  #[test]
  fn from_buffer_rejects_misaligned_slice() {
    #[repr(align(16))]
    struct Aligned([u8; 128]);

    let mut storage = Aligned([0u8; 128]);
    // Offset the slice by one byte so its address is not word-aligned,
    // regardless of how the compiler placed `storage`.
    let buf = &mut storage.0[1..];
    match VarPool::from_buffer(buf) {
      Err(AllocatorError::Misaligned { .. }) => {}
      Err(other) => panic!("expected Misaligned, got {other:?}"),
      Ok(_) => panic!("expected Misaligned, got Ok"),
    }
  }

  // S1 — VarPool LIFO reuse.
  #[test]
  fn s1_lifo_reuse() {
    let mut pool = VarPool::new(1024).unwrap();
    let p = pool.alloc(16).unwrap();
    pool.free(Some(p));
    let q = pool.alloc(16).unwrap();
    assert_eq!(p, q);
  }

  // S2 — VarPool exhaustion then recovery.
  #[test]
  fn s2_exhaustion_then_recovery() {
    let mut pool = VarPool::new(256).unwrap();
    let p = pool.alloc(200).unwrap();
    assert!(pool.alloc(200).is_none());
    pool.free(Some(p));
    assert!(pool.alloc(200).is_some());
  }

  // S3 — VarPool realloc grow preserves contents.
  #[test]
  fn s3_realloc_grow_preserves_prefix() {
    let mut pool = VarPool::new(1024).unwrap();
    let p = pool.alloc(8).unwrap();
    let pattern = [1u8, 2, 3, 4, 5, 6, 7, 8];
    unsafe { ptr::copy_nonoverlapping(pattern.as_ptr(), p.as_ptr(), 8) };

    let q = pool.realloc(Some(p), 64).unwrap();
    let copied = unsafe { std::slice::from_raw_parts(q.as_ptr(), 8) };
    assert_eq!(copied, &pattern);
  }

  #[test]
  fn realloc_shrink_returns_same_pointer() {
    let mut pool = VarPool::new(1024).unwrap();
    let p = pool.alloc(64).unwrap();
    let q = pool.realloc(Some(p), 4).unwrap();
    assert_eq!(p, q);
  }

  #[test]
  fn realloc_null_behaves_like_alloc() {
    let mut pool = VarPool::new(1024).unwrap();
    let p = pool.realloc(None, 32);
    assert!(p.is_some());
  }

  #[test]
  fn alloc_zeroes_fresh_memory() {
    let mut pool = VarPool::new(1024).unwrap();
    let p = pool.alloc(32).unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(p.as_ptr(), 32) };
    assert!(bytes.iter().all(|&b| b == 0));
  }

  #[test]
  fn alloc_zeroes_reused_free_list_memory() {
    let mut pool = VarPool::new(1024).unwrap();
    let p = pool.alloc(32).unwrap();
    unsafe { ptr::write_bytes(p.as_ptr(), 0xAB, 32) };
    pool.free(Some(p));

    let q = pool.alloc(32).unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(q.as_ptr(), 32) };
    assert!(bytes.iter().all(|&b| b == 0));
  }

  #[test]
  fn free_ignores_out_of_range_and_null() {
    let mut pool = VarPool::new(1024).unwrap();
    pool.free(None);

    let bogus = NonNull::new(0x10 as *mut u8).unwrap();
    pool.free(Some(bogus)); // must not panic or corrupt state
    assert_eq!(pool.free_space(), pool.capacity());
  }

  // Property 6 — reset idempotence.
  #[test]
  fn reset_is_idempotent_and_restores_full_capacity() {
    let mut pool = VarPool::new(1024).unwrap();
    let _ = pool.alloc(100).unwrap();
    let _ = pool.alloc(200).unwrap();

    pool.reset();
    pool.reset();

    assert_eq!(pool.free_space(), pool.capacity());
  }

  // Property 1 — conservation: free_space + live bytes == capacity.
  #[test]
  fn conservation_holds_across_alloc_and_free() {
    let mut pool = VarPool::new(2048).unwrap();
    let sizes = [8usize, 16, 32, 64, 100];
    let mut live_total = 0usize;
    let mut ptrs = Vec::new();

    for &n in &sizes {
      let p = pool.alloc(n).unwrap();
      let block = unsafe { block::block_of(p) };
      live_total += unsafe { block::read_size(block) };
      ptrs.push(p);
    }

    assert_eq!(pool.free_space() + live_total, pool.capacity());

    for p in ptrs {
      pool.free(Some(p));
    }
    assert_eq!(pool.free_space(), pool.capacity());
  }

  // Property 4 — free-list integrity after a churn of alloc/free.
  #[test]
  fn free_list_integrity_after_churn() {
    let mut pool = VarPool::new(4096).unwrap();
    let mut ptrs = Vec::new();

    for _ in 0..20 {
      ptrs.push(pool.alloc(48).unwrap());
    }
    for p in ptrs.drain(..10) {
      pool.free(Some(p));
    }
    for _ in 0..5 {
      ptrs.push(pool.alloc(48).unwrap());
    }

    let total = align_to!(48 + HEADER_SIZE, WORD).max(MIN_BLOCK);
    let k = bucket_index(total).expect("48-byte blocks should land in a bucket, not the large list");
    unsafe { pool.buckets[k].assert_integrity() };
  }

  #[test]
  fn large_request_reuses_oversized_block_after_bump_exhaustion() {
    // Large enough that it lands past the last bucket's range.
    let big_total = GRANULARITY * (VAR_POOL_BUCKETS + 3);
    let mut pool = VarPool::new(big_total).unwrap();

    let big_n = big_total - HEADER_SIZE;
    let p = pool.alloc(big_n).unwrap();
    assert_eq!(pool.free_space(), 0);
    pool.free(Some(p));

    // Smaller, but still past the last bucket's range, and the bump
    // region is fully drained — only the large-list `>=` fallback can
    // satisfy this.
    let smaller_n = big_n - GRANULARITY;
    let q = pool.alloc(smaller_n).unwrap();
    assert_eq!(p, q);
  }
}
