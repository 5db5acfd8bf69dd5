//! Mutual-exclusion decorator for sharing any strategy across threads.

use core::alloc::Layout;
use core::ptr::NonNull;

use parking_lot::Mutex;

use crate::error::AllocResult;
use crate::traits::{BufferAllocator, MemoryUsage};

/// Wraps an allocator in a mutex so the whole contract can be driven from
/// multiple threads.
///
/// The linear, stack and free-list strategies treat their thread-safety
/// toggle as advisory; this decorator is the supported way to actually
/// share them. Every contract method runs under the lock, which also gives
/// release/acquire consistency between threads.
pub struct SyncAllocator<A> {
    inner: Mutex<A>,
}

impl<A: BufferAllocator> SyncAllocator<A> {
    /// Takes ownership of `inner` and guards it with a mutex.
    pub fn new(inner: A) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Unwraps the decorated allocator.
    pub fn into_inner(self) -> A {
        self.inner.into_inner()
    }

    /// Runs `f` with the locked allocator, for operations outside the
    /// shared contract (markers, class queries, usage accessors).
    pub fn with<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        f(&self.inner.lock())
    }
}

// SAFETY: every operation forwards under the mutex, so the inner
// allocator's contract obligations are preserved and serialized.
unsafe impl<A: BufferAllocator> BufferAllocator for SyncAllocator<A> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        // SAFETY: forwarded allocate contract.
        unsafe { self.inner.lock().allocate(layout) }
    }

    unsafe fn deallocate(&self, ptr: *mut u8) {
        // SAFETY: forwarded deallocate contract.
        unsafe { self.inner.lock().deallocate(ptr) }
    }

    unsafe fn reallocate(
        &self,
        ptr: *mut u8,
        new_layout: Layout,
    ) -> AllocResult<Option<NonNull<u8>>> {
        // SAFETY: forwarded reallocate contract.
        unsafe { self.inner.lock().reallocate(ptr, new_layout) }
    }

    fn allocation_size(&self, ptr: *const u8) -> usize {
        self.inner.lock().allocation_size(ptr)
    }

    fn owns(&self, ptr: *const u8) -> bool {
        self.inner.lock().owns(ptr)
    }

    fn total_allocated(&self) -> usize {
        self.inner.lock().total_allocated()
    }

    fn peak_usage(&self) -> usize {
        self.inner.lock().peak_usage()
    }

    fn allocation_count(&self) -> usize {
        self.inner.lock().allocation_count()
    }

    fn fragmentation_percentage(&self) -> f32 {
        self.inner.lock().fragmentation_percentage()
    }

    unsafe fn reset(&self) {
        // SAFETY: forwarded reset contract.
        unsafe { self.inner.lock().reset() }
    }

    fn name(&self) -> &'static str {
        self.inner.lock().name()
    }

    fn set_name(&self, name: &'static str) {
        self.inner.lock().set_name(name);
    }

    fn set_thread_safe(&self, thread_safe: bool) {
        self.inner.lock().set_thread_safe(thread_safe);
    }

    fn is_thread_safe(&self) -> bool {
        // The mutex makes concurrent use safe regardless of the inner flag.
        true
    }

    fn validate_internal_state(&self) -> bool {
        self.inner.lock().validate_internal_state()
    }

    fn detailed_stats(&self) -> String {
        self.inner.lock().detailed_stats()
    }
}

impl<A: BufferAllocator + MemoryUsage> MemoryUsage for SyncAllocator<A> {
    fn used_memory(&self) -> usize {
        self.inner.lock().used_memory()
    }

    fn available_memory(&self) -> usize {
        self.inner.lock().available_memory()
    }

    fn total_memory(&self) -> usize {
        self.inner.lock().total_memory()
    }
}

impl<A: BufferAllocator + core::fmt::Debug> core::fmt::Debug for SyncAllocator<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("SyncAllocator").field(&*self.inner.lock()).finish()
    }
}
