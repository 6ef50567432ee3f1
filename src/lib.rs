//! # rmem - Three small allocator engines over a byte buffer
//!
//! This crate provides three independent, single-threaded memory
//! allocators, each trading a different set of guarantees for its own
//! allocation pattern:
//!
//! - [`VarPool`] - segregated free lists plus a bump arena, for
//!   variable-sized allocations with good reuse and no fragmentation
//!   from splitting.
//! - [`FixedPool`] - an intrusive LIFO free list over uniformly sized
//!   cells, for workloads that allocate and free one shape of object.
//! - [`BiStack`] - a double-ended bump allocator, for two independent
//!   allocation lifetimes sharing one buffer.
//!
//! ## Crate Structure
//!
//! ```text
//!   rmem
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── error      - AllocatorError, the construction-time error taxonomy
//!   ├── buffer     - RawBuffer, the owned/borrowed memory primitive
//!   ├── block      - Block header layout and free lists (VarPool internals)
//!   ├── var_pool   - VarPool
//!   ├── fixed_pool - FixedPool
//!   └── bistack    - BiStack
//! ```
//!
//! ## Ownership model
//!
//! Each engine can either own its buffer (`Engine::new(...)`, backed by
//! `libc::malloc`/`libc::free`) or borrow one supplied by the caller
//! (`Engine::from_buffer(&mut [u8], ...)`, never freed by the engine).
//! The borrowing constructors tie the engine's lifetime to the buffer's
//! via a `'buf` lifetime parameter, so the buffer cannot be dropped or
//! reused while the engine is alive.
//!
//! ## Quick start
//!
//! ```rust
//! use rmem::VarPool;
//!
//! let mut pool = VarPool::new(4096).unwrap();
//! let a = pool.alloc(64).unwrap();
//! pool.free(Some(a));
//! ```
//!
//! ## Safety
//!
//! This crate manages raw memory directly; every engine's `alloc`/`free`
//! pair is built on `unsafe` pointer arithmetic confined to `block.rs`
//! and `buffer.rs`. Safe callers only ever see `NonNull<u8>`.

pub mod align;
mod block;
mod buffer;
mod error;

mod bistack;
mod fixed_pool;
mod var_pool;

pub use bistack::BiStack;
pub use error::AllocatorError;
pub use fixed_pool::FixedPool;
pub use var_pool::VarPool;
