//! # suballoc
//!
//! Fixed-buffer memory allocators for predictable-cost, reusable storage.
//!
//! Every strategy acquires one contiguous region at construction and serves
//! all requests from it — there is no growth, chaining or compaction. Four
//! strategies share one polymorphic contract:
//!
//! - [`LinearAllocator`]: monotonic bump pointer, release is a no-op
//! - [`StackAllocator`]: LIFO release through in-band headers, plus markers
//!   for scoped rewind
//! - [`PoolAllocator`]: fixed-size classes, each an intrusive freelist of
//!   equal blocks
//! - [`FreeListAllocator`]: first-fit with split-on-allocate and boundary
//!   coalescing on release
//!
//! ## Quick start
//!
//! ```rust
//! use core::alloc::Layout;
//! use suballoc::{BufferAllocator, FreeListAllocator};
//!
//! # fn main() -> suballoc::AllocResult<()> {
//! let heap = FreeListAllocator::new(4096)?;
//! let layout = Layout::from_size_align(256, 16).unwrap();
//!
//! unsafe {
//!     let ptr = heap.allocate(layout)?;
//!     assert!(heap.owns(ptr.as_ptr()));
//!     heap.deallocate(ptr.as_ptr());
//! }
//! assert!(heap.validate_internal_state());
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! The pool allocator serializes every operation internally. The other
//! three strategies are single-owner by design — their thread-safety toggle
//! is advisory metadata — and the free-list allocator is `!Sync` so the
//! compiler rejects accidental sharing. Wrap any strategy in
//! [`SyncAllocator`] to drive the whole contract from several threads.
//!
//! ## Features
//!
//! - `logging`: emit `tracing` events at construction and reset. Allocation
//!   paths never log.

// Foundations
mod buffer;
pub mod error;
mod utils;

// The shared contract
pub mod traits;

// Strategy implementations
pub mod freelist;
pub mod linear;
pub mod pool;
pub mod stack;

// Opt-in synchronization decorator
pub mod sync;

pub use crate::error::{AllocError, AllocErrorKind, AllocResult};
pub use crate::freelist::FreeListAllocator;
pub use crate::linear::LinearAllocator;
pub use crate::pool::{PoolAllocator, PoolClass};
pub use crate::stack::{StackAllocator, StackMarker, StackScope};
pub use crate::sync::SyncAllocator;
pub use crate::traits::{BufferAllocator, MemoryUsage};

pub mod prelude {
    //! Convenient re-exports of the commonly used types and traits.

    pub use crate::error::{AllocError, AllocErrorKind, AllocResult};
    pub use crate::freelist::FreeListAllocator;
    pub use crate::linear::LinearAllocator;
    pub use crate::pool::{PoolAllocator, PoolClass};
    pub use crate::stack::{StackAllocator, StackMarker, StackScope};
    pub use crate::sync::SyncAllocator;
    pub use crate::traits::{BufferAllocator, MemoryUsage};
}
