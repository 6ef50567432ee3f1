//! Construction-time error taxonomy.
//!
//! Per-operation failures (exhaustion, misuse on `free`) are deliberately
//! *not* represented here — they keep the nullable-pointer contract of a
//! traditional allocator (`Option::None` on exhaustion, silent ignore on
//! a bad `free`). Only the "can this instance come into existence at
//! all" question is a typed `Result`.

use thiserror::Error;

/// Reasons a `VarPool`, `FixedPool`, or `BiStack` can fail to be built.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocatorError {
  /// A zero-byte capacity (or zero cells) was requested.
  #[error("requested capacity is zero")]
  ZeroCapacity,

  /// The buffer is too small to hold even the allocator's own bookkeeping
  /// (one minimum-sized VarPool block, one FixedPool cell, or any BiStack
  /// buffer at all).
  #[error("buffer of {actual} bytes cannot hold the minimum block of {minimum} bytes")]
  BufferTooSmall {
    /// Bytes actually supplied.
    actual: usize,
    /// Bytes required at minimum.
    minimum: usize,
  },

  /// A `FixedPool` cell size cannot hold the intrusive free-list pointer.
  #[error("cell size {cell_size} is smaller than a pointer ({pointer_size} bytes)")]
  CellTooSmall {
    /// The requested cell size.
    cell_size: usize,
    /// `mem::size_of::<usize>()` on this platform.
    pointer_size: usize,
  },

  /// A borrowed buffer's address does not meet the allocator's alignment
  /// requirement (word alignment for `VarPool`/`BiStack`, pointer alignment
  /// for `FixedPool`).
  #[error("borrowed buffer at {address:#x} is not aligned to {required} bytes")]
  Misaligned {
    /// The buffer's base address.
    address: usize,
    /// The required alignment.
    required: usize,
  },

  /// The host allocation facility (`libc::malloc`) returned null.
  #[error("host allocator failed to provide {requested} bytes")]
  AllocationFailed {
    /// Bytes requested from the host allocator.
    requested: usize,
  },
}
