//! The uniform allocator contract.
//!
//! Every strategy satisfies [`BufferAllocator`]: allocation, release,
//! resize, introspection, counters, reset and a human-readable report. The
//! trait is object safe so the same test suite and the same call sites can
//! drive any strategy through `&dyn BufferAllocator`.
//!
//! # Safety requirements
//!
//! Implementors must ensure that:
//! - Returned pointers lie inside the managed region and satisfy the
//!   requested alignment
//! - Releasing a pointer that did not come from the same allocator, or
//!   releasing it twice, is never required to be detected
//! - `reset` invalidates every outstanding pointer

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::AllocResult;

/// Capability set shared by every fixed-buffer strategy.
///
/// Exhaustion is reported as `Err` and is always recoverable; the allocator
/// state is unchanged by a failed allocation.
pub unsafe trait BufferAllocator {
    /// Allocates at least `layout.size()` bytes aligned to
    /// `layout.align()`.
    ///
    /// A zero-size request returns a well-aligned dangling pointer that
    /// consumes no buffer space and is ignored by [`deallocate`].
    ///
    /// # Safety
    /// The returned memory is uninitialized and must not be used after
    /// `reset` or after the allocator is dropped.
    ///
    /// [`deallocate`]: BufferAllocator::deallocate
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>>;

    /// Releases a pointer previously returned by this allocator.
    ///
    /// Null pointers are ignored. Strategy-specific discipline applies: the
    /// linear allocator ignores all releases, the stack allocator requires
    /// reverse allocation order.
    ///
    /// # Safety
    /// `ptr` must be null, dangling from a zero-size request, or a live
    /// pointer obtained from this allocator. Double release and foreign
    /// pointers are undefined where the strategy cannot cheaply reject them.
    unsafe fn deallocate(&self, ptr: *mut u8);

    /// Resizes an allocation, in place when the strategy allows it.
    ///
    /// A null `ptr` is equivalent to [`allocate`]. The first
    /// `min(old, new)` bytes are preserved. The free-list strategy treats a
    /// zero-size request as a release and returns `Ok(None)`.
    ///
    /// # Safety
    /// Same requirements as [`allocate`] and [`deallocate`]. On success the
    /// old pointer must be considered invalid unless it was returned again.
    ///
    /// [`allocate`]: BufferAllocator::allocate
    /// [`deallocate`]: BufferAllocator::deallocate
    unsafe fn reallocate(
        &self,
        ptr: *mut u8,
        new_layout: Layout,
    ) -> AllocResult<Option<NonNull<u8>>>;

    /// Usable size of the region behind `ptr`, or 0 for null and non-owned
    /// pointers. The linear strategy reports an upper bound.
    fn allocation_size(&self, ptr: *const u8) -> usize;

    /// True when `ptr` lies inside this allocator's managed region(s).
    fn owns(&self, ptr: *const u8) -> bool;

    /// In-use bytes under the strategy's accounting (see each strategy's
    /// documentation for what one allocation contributes).
    fn total_allocated(&self) -> usize;

    /// Highest value of [`total_allocated`] observed since construction or
    /// the last reset.
    ///
    /// [`total_allocated`]: BufferAllocator::total_allocated
    fn peak_usage(&self) -> usize;

    /// Live allocation count. The stack allocator does not reconcile this
    /// on marker rewind.
    fn allocation_count(&self) -> usize;

    /// Strategy-defined fragmentation metric in `[0.0, 100.0]`.
    fn fragmentation_percentage(&self) -> f32;

    /// Returns the allocator to its empty state and zeroes the counters.
    ///
    /// # Safety
    /// Every pointer previously returned becomes invalid. The caller must
    /// ensure no live references into the buffer remain.
    unsafe fn reset(&self);

    /// Diagnostic name.
    fn name(&self) -> &'static str;

    /// Overrides the diagnostic name. The string is borrowed, not owned.
    fn set_name(&self, name: &'static str);

    /// Declares whether the caller intends concurrent use.
    ///
    /// Advisory on the linear, stack and free-list strategies; the pool
    /// allocator serializes every operation regardless. Use
    /// [`SyncAllocator`](crate::SyncAllocator) to make any strategy safe to
    /// share.
    fn set_thread_safe(&self, thread_safe: bool);

    /// Reports the flag set by [`set_thread_safe`].
    ///
    /// [`set_thread_safe`]: BufferAllocator::set_thread_safe
    fn is_thread_safe(&self) -> bool;

    /// Checks every structural invariant the strategy maintains.
    fn validate_internal_state(&self) -> bool;

    /// Human-readable usage report, one field per line.
    fn detailed_stats(&self) -> String;
}

/// Capacity-oriented usage reporting.
///
/// Fixed buffers always know their total capacity, so unlike open-ended
/// heaps these accessors are total functions.
pub trait MemoryUsage {
    /// Bytes currently in use.
    fn used_memory(&self) -> usize;

    /// Bytes still available for allocation.
    fn available_memory(&self) -> usize;

    /// Total managed capacity in bytes.
    fn total_memory(&self) -> usize;

    /// Usage as a percentage of capacity.
    fn memory_usage_percent(&self) -> f32 {
        let total = self.total_memory();
        if total == 0 {
            0.0
        } else {
            (self.used_memory() as f32 / total as f32) * 100.0
        }
    }
}

// SAFETY: forwarding preserves every contract obligation of the referent.
unsafe impl<T: BufferAllocator + ?Sized> BufferAllocator for &T {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        // SAFETY: caller upholds the allocate contract.
        unsafe { (**self).allocate(layout) }
    }

    unsafe fn deallocate(&self, ptr: *mut u8) {
        // SAFETY: caller upholds the deallocate contract.
        unsafe { (**self).deallocate(ptr) }
    }

    unsafe fn reallocate(
        &self,
        ptr: *mut u8,
        new_layout: Layout,
    ) -> AllocResult<Option<NonNull<u8>>> {
        // SAFETY: caller upholds the reallocate contract.
        unsafe { (**self).reallocate(ptr, new_layout) }
    }

    fn allocation_size(&self, ptr: *const u8) -> usize {
        (**self).allocation_size(ptr)
    }

    fn owns(&self, ptr: *const u8) -> bool {
        (**self).owns(ptr)
    }

    fn total_allocated(&self) -> usize {
        (**self).total_allocated()
    }

    fn peak_usage(&self) -> usize {
        (**self).peak_usage()
    }

    fn allocation_count(&self) -> usize {
        (**self).allocation_count()
    }

    fn fragmentation_percentage(&self) -> f32 {
        (**self).fragmentation_percentage()
    }

    unsafe fn reset(&self) {
        // SAFETY: caller upholds the reset contract.
        unsafe { (**self).reset() }
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn set_name(&self, name: &'static str) {
        (**self).set_name(name);
    }

    fn set_thread_safe(&self, thread_safe: bool) {
        (**self).set_thread_safe(thread_safe);
    }

    fn is_thread_safe(&self) -> bool {
        (**self).is_thread_safe()
    }

    fn validate_internal_state(&self) -> bool {
        (**self).validate_internal_state()
    }

    fn detailed_stats(&self) -> String {
        (**self).detailed_stats()
    }
}

impl<T: MemoryUsage + ?Sized> MemoryUsage for &T {
    fn used_memory(&self) -> usize {
        (**self).used_memory()
    }

    fn available_memory(&self) -> usize {
        (**self).available_memory()
    }

    fn total_memory(&self) -> usize {
        (**self).total_memory()
    }
}
