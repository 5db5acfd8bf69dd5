//! Monotonic bump allocator.
//!
//! A single offset advances through the buffer; individual release is a
//! no-op and the whole region is reclaimed at once by `reset`. The offset is
//! an atomic cursor updated by compare-and-swap, so allocation never tears
//! even when the advisory thread-safety flag is left off.
//!
//! ## Invariants
//!
//! - `offset <= capacity` at all times
//! - Every returned pointer lies in `[base, base + offset)`
//! - `peak_usage` tracks the maximum offset since construction or reset

use core::alloc::Layout;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::buffer::RawBuffer;
use crate::error::{AllocError, AllocResult};
use crate::traits::{BufferAllocator, MemoryUsage};
use crate::utils::{align_up, atomic_max, dangling_for};

/// Linear (bump) allocator over one fixed buffer.
///
/// `total_allocated` reports the raw offset, which includes alignment
/// padding between allocations.
pub struct LinearAllocator {
    buffer: RawBuffer,
    /// Bytes consumed from the start of the buffer.
    offset: AtomicUsize,
    allocation_count: AtomicUsize,
    peak_usage: AtomicUsize,
    name: Mutex<&'static str>,
    thread_safe: AtomicBool,
}

impl LinearAllocator {
    /// Creates an allocator over a fresh buffer of `capacity` bytes.
    ///
    /// # Errors
    /// `InvalidConfig` for a zero capacity, `BufferAcquisition` when the
    /// host refuses the region.
    pub fn new(capacity: usize) -> AllocResult<Self> {
        let buffer = RawBuffer::new(capacity)?;

        #[cfg(feature = "logging")]
        tracing::debug!(capacity, "created linear allocator");

        Ok(Self {
            buffer,
            offset: AtomicUsize::new(0),
            allocation_count: AtomicUsize::new(0),
            peak_usage: AtomicUsize::new(0),
            name: Mutex::new("LinearAllocator"),
            thread_safe: AtomicBool::new(false),
        })
    }

    /// Total buffer capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Bytes consumed so far, including alignment padding.
    #[inline]
    pub fn used(&self) -> usize {
        self.offset.load(Ordering::Relaxed)
    }

    /// Bytes still available at the end of the buffer.
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity() - self.used()
    }

    fn try_bump(&self, layout: Layout) -> Option<NonNull<u8>> {
        let base = self.buffer.base_addr();
        loop {
            let current = self.offset.load(Ordering::Acquire);
            // Aligning the absolute address keeps the guarantee for
            // alignments above the buffer's own.
            let user = align_up(base + current, layout.align());
            let new_offset = (user - base).checked_add(layout.size())?;
            if new_offset > self.capacity() {
                return None;
            }

            if self
                .offset
                .compare_exchange_weak(current, new_offset, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.allocation_count.fetch_add(1, Ordering::Relaxed);
                atomic_max(&self.peak_usage, new_offset);

                // SAFETY: user is within [base, base + capacity); the CAS
                // reserved [user, base + new_offset) exclusively.
                let ptr = unsafe { self.buffer.ptr_at(user) };
                return NonNull::new(ptr);
            }
        }
    }
}

// SAFETY: allocate returns aligned pointers inside the owned buffer; the
// atomic cursor guarantees returned regions never overlap. Release is a
// documented no-op.
unsafe impl BufferAllocator for LinearAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        if layout.size() == 0 {
            return Ok(dangling_for(layout));
        }
        self.try_bump(layout)
            .ok_or(AllocError::exhausted(layout))
    }

    unsafe fn deallocate(&self, _ptr: *mut u8) {
        // Individual release is not supported; memory returns on reset.
    }

    unsafe fn reallocate(
        &self,
        ptr: *mut u8,
        new_layout: Layout,
    ) -> AllocResult<Option<NonNull<u8>>> {
        if new_layout.size() == 0 {
            return Ok(Some(dangling_for(new_layout)));
        }

        // The old user-visible size is only known as an upper bound, so a
        // fresh region is always carved and the prefix copied. The bound is
        // taken before the new allocation moves the offset end.
        let old_bound = self.allocation_size(ptr);
        // SAFETY: forwarded allocate contract.
        let new_ptr = unsafe { self.allocate(new_layout)? };
        let copy = old_bound.min(new_layout.size());
        if copy > 0 {
            // SAFETY: ptr is live for at least `copy` bytes (bounded by the
            // distance to the old offset end), new_ptr was just allocated
            // with room for new_layout.size() >= copy, and the regions are
            // disjoint because the fresh region starts past the old end.
            unsafe { ptr::copy_nonoverlapping(ptr, new_ptr.as_ptr(), copy) };
        }
        Ok(Some(new_ptr))
    }

    fn allocation_size(&self, ptr: *const u8) -> usize {
        if !self.owns(ptr) {
            return 0;
        }
        self.buffer.base_addr() + self.used() - ptr as usize
    }

    fn owns(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        addr >= self.buffer.base_addr() && addr < self.buffer.base_addr() + self.used()
    }

    fn total_allocated(&self) -> usize {
        self.used()
    }

    fn peak_usage(&self) -> usize {
        self.peak_usage.load(Ordering::Relaxed)
    }

    fn allocation_count(&self) -> usize {
        self.allocation_count.load(Ordering::Relaxed)
    }

    fn fragmentation_percentage(&self) -> f32 {
        // All free space is one contiguous tail.
        0.0
    }

    unsafe fn reset(&self) {
        self.offset.store(0, Ordering::Release);
        self.allocation_count.store(0, Ordering::Relaxed);
        self.peak_usage.store(0, Ordering::Relaxed);

        #[cfg(feature = "logging")]
        tracing::debug!(name = self.name(), "linear allocator reset");
    }

    fn name(&self) -> &'static str {
        *self.name.lock()
    }

    fn set_name(&self, name: &'static str) {
        *self.name.lock() = name;
    }

    fn set_thread_safe(&self, thread_safe: bool) {
        self.thread_safe.store(thread_safe, Ordering::Relaxed);
    }

    fn is_thread_safe(&self) -> bool {
        self.thread_safe.load(Ordering::Relaxed)
    }

    fn validate_internal_state(&self) -> bool {
        let offset = self.used();
        let peak = self.peak_usage();
        offset <= self.capacity() && peak <= self.capacity() && offset <= peak
    }

    fn detailed_stats(&self) -> String {
        format!(
            "LinearAllocator Stats:\n\
             Total Size: {}\n\
             Used: {}\n\
             Peak Usage: {}\n\
             Allocation Count: {}\n",
            self.capacity(),
            self.used(),
            self.peak_usage(),
            self.allocation_count(),
        )
    }
}

impl MemoryUsage for LinearAllocator {
    fn used_memory(&self) -> usize {
        self.used()
    }

    fn available_memory(&self) -> usize {
        self.available()
    }

    fn total_memory(&self) -> usize {
        self.capacity()
    }
}

impl core::fmt::Debug for LinearAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LinearAllocator")
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .field("allocation_count", &self.allocation_count())
            .finish()
    }
}
