//! LIFO stack allocator with marker support.
//!
//! ## Modules
//! - `marker` - Position markers for scoped deallocation
//! - `scope` - RAII helper for automatic stack restoration
//!
//! Each allocation is preceded by an in-band header recording its size and
//! the distance back to the start of its block, which is what makes
//! individual release possible — in reverse allocation order only.

mod marker;
mod scope;

pub use marker::StackMarker;
pub use scope::StackScope;

use core::alloc::Layout;
use core::mem;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::buffer::RawBuffer;
use crate::error::{AllocError, AllocResult};
use crate::traits::{BufferAllocator, MemoryUsage};
use crate::utils::{align_up, atomic_max, dangling_for, is_aligned};

/// In-band metadata preceding every live allocation.
///
/// `adjustment` is the distance from the block start (the offset before the
/// allocation) to the returned user address: header size plus alignment
/// padding. Release rewinds the offset by exactly that distance.
#[repr(C)]
#[derive(Clone, Copy)]
struct AllocHeader {
    size: usize,
    adjustment: usize,
}

const HEADER_SIZE: usize = mem::size_of::<AllocHeader>();

/// Stack allocator with LIFO release and marker-based bulk rewind.
///
/// # Memory layout
/// ```text
/// [base]--[hdr|alloc1]--[hdr|alloc2]--[offset]------[free]------[end]
///          <-------- allocated ------>       <---- available ---->
/// ```
///
/// `total_allocated` reports the raw offset, which includes headers and
/// alignment padding. Marker rewinds do not reconcile `allocation_count`;
/// only `deallocate` and `reset` do.
pub struct StackAllocator {
    buffer: RawBuffer,
    /// Current top of the stack, as a byte offset from the buffer base.
    offset: AtomicUsize,
    allocation_count: AtomicUsize,
    peak_usage: AtomicUsize,
    markers: Mutex<Vec<usize>>,
    name: Mutex<&'static str>,
    thread_safe: AtomicBool,
}

impl StackAllocator {
    /// Creates an allocator over a fresh buffer of `capacity` bytes.
    ///
    /// # Errors
    /// `InvalidConfig` for a zero capacity, `BufferAcquisition` when the
    /// host refuses the region.
    pub fn new(capacity: usize) -> AllocResult<Self> {
        let buffer = RawBuffer::new(capacity)?;

        #[cfg(feature = "logging")]
        tracing::debug!(capacity, "created stack allocator");

        Ok(Self {
            buffer,
            offset: AtomicUsize::new(0),
            allocation_count: AtomicUsize::new(0),
            peak_usage: AtomicUsize::new(0),
            markers: Mutex::new(Vec::new()),
            name: Mutex::new("StackAllocator"),
            thread_safe: AtomicBool::new(false),
        })
    }

    /// Total buffer capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Bytes consumed so far, including headers and padding.
    #[inline]
    pub fn used(&self) -> usize {
        self.offset.load(Ordering::Acquire)
    }

    /// Bytes still available above the top of the stack.
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity() - self.used()
    }

    /// Captures the current top of the stack.
    pub fn marker(&self) -> StackMarker {
        StackMarker { offset: self.used() }
    }

    /// Rewinds the stack to `marker`, releasing everything allocated after
    /// it. Markers above the current top are ignored.
    ///
    /// The live-allocation counter is intentionally left untouched; it only
    /// reconciles through `deallocate` and `reset`.
    ///
    /// # Safety
    /// `marker` must come from this allocator, and every pointer handed out
    /// after it was captured becomes invalid.
    pub unsafe fn free_to_marker(&self, marker: StackMarker) {
        if marker.offset <= self.used() {
            self.offset.store(marker.offset, Ordering::Release);
        }
    }

    /// Pushes the current top onto the internal marker stack.
    pub fn push_marker(&self) {
        self.markers.lock().push(self.used());
    }

    /// Pops the most recent marker and rewinds to it. A no-op when the
    /// marker stack is empty.
    ///
    /// # Safety
    /// Same contract as [`free_to_marker`](Self::free_to_marker).
    pub unsafe fn pop_marker(&self) {
        let popped = self.markers.lock().pop();
        if let Some(offset) = popped {
            // SAFETY: the offset was captured from this allocator.
            unsafe { self.free_to_marker(StackMarker { offset }) };
        }
    }

    /// Number of markers currently pushed.
    pub fn marker_count(&self) -> usize {
        self.markers.lock().len()
    }

    /// Reads the header of a live allocation.
    ///
    /// # Safety
    /// `user` must be the address of a live allocation from this allocator.
    unsafe fn read_header(&self, user: usize) -> AllocHeader {
        // SAFETY: a live allocation always has its header in-band at
        // user - HEADER_SIZE, inside the buffer, aligned because every user
        // address is at least header-aligned.
        unsafe { (self.buffer.ptr_at(user - HEADER_SIZE) as *const AllocHeader).read() }
    }

    fn try_allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let base = self.buffer.base_addr();
        // Raising the alignment to the header's keeps the in-band header
        // itself naturally aligned at user - HEADER_SIZE.
        let align = layout.align().max(mem::align_of::<AllocHeader>());

        loop {
            let current = self.offset.load(Ordering::Acquire);
            let block_start = base + current;
            let user = align_up(block_start + HEADER_SIZE, align);
            let new_offset = (user - base).checked_add(layout.size())?;
            if new_offset > self.capacity() {
                return None;
            }

            if self
                .offset
                .compare_exchange_weak(current, new_offset, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let header = AllocHeader {
                    size: layout.size(),
                    adjustment: user - block_start,
                };
                // SAFETY: the CAS reserved [block_start, base + new_offset)
                // exclusively; the header slot is inside that range and
                // aligned (user is at least header-aligned).
                unsafe {
                    (self.buffer.ptr_at(user - HEADER_SIZE) as *mut AllocHeader).write(header);
                }

                self.allocation_count.fetch_add(1, Ordering::Relaxed);
                atomic_max(&self.peak_usage, new_offset);

                // SAFETY: user lies inside the reserved range.
                let ptr = unsafe { self.buffer.ptr_at(user) };
                return NonNull::new(ptr);
            }
        }
    }
}

// SAFETY: allocate returns aligned pointers inside the owned buffer and the
// atomic top guarantees reserved ranges never overlap. deallocate rejects
// pointers outside the live region; LIFO order is the caller's obligation.
unsafe impl BufferAllocator for StackAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        if layout.size() == 0 {
            return Ok(dangling_for(layout));
        }
        self.try_allocate(layout)
            .ok_or(AllocError::exhausted(layout))
    }

    /// # Safety
    /// `ptr` must be the most recently allocated live block. Releasing any
    /// other live pointer rewinds the offset into the middle of the stack
    /// and corrupts later allocations.
    unsafe fn deallocate(&self, ptr: *mut u8) {
        if ptr.is_null() || !self.owns(ptr) {
            return;
        }
        let user = ptr as usize;
        // SAFETY: owns() established that ptr is a live allocation address.
        let header = unsafe { self.read_header(user) };
        let block_start = user - self.buffer.base_addr() - header.adjustment;
        self.offset.store(block_start, Ordering::Release);
        self.allocation_count.fetch_sub(1, Ordering::Relaxed);
    }

    unsafe fn reallocate(
        &self,
        ptr: *mut u8,
        new_layout: Layout,
    ) -> AllocResult<Option<NonNull<u8>>> {
        if ptr.is_null() {
            // SAFETY: forwarded allocate contract.
            return unsafe { self.allocate(new_layout).map(Some) };
        }
        if new_layout.size() == 0 {
            return Ok(Some(dangling_for(new_layout)));
        }
        if !self.owns(ptr) {
            // Dangling zero-size pointers have no header to consult.
            // SAFETY: forwarded allocate contract.
            return unsafe { self.allocate(new_layout).map(Some) };
        }

        let base = self.buffer.base_addr();
        let user = ptr as usize;
        // SAFETY: owns() established that ptr is a live allocation address.
        let header = unsafe { self.read_header(user) };
        let old_size = header.size;
        let user_offset = user - base;
        let current = self.used();

        // In-place resize is only sound for the top allocation, and growth
        // must not demand stricter alignment than the block already has.
        if user_offset + old_size == current && is_aligned(user, new_layout.align()) {
            let new_offset = user_offset + new_layout.size();
            if new_offset <= self.capacity()
                && self
                    .offset
                    .compare_exchange(current, new_offset, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                let updated = AllocHeader {
                    size: new_layout.size(),
                    ..header
                };
                // SAFETY: the header slot of a live allocation stays inside
                // the buffer and aligned.
                unsafe {
                    (self.buffer.ptr_at(user - HEADER_SIZE) as *mut AllocHeader).write(updated);
                }
                atomic_max(&self.peak_usage, new_offset);
                // SAFETY: ptr is non-null (owns() passed).
                return Ok(Some(unsafe { NonNull::new_unchecked(ptr) }));
            }
        }

        // Not the top allocation: carve a fresh block and copy. The old
        // region stays in place until a marker rewind or reset reclaims it;
        // stack discipline forbids releasing it from the middle.
        // SAFETY: forwarded allocate contract.
        let new_ptr = unsafe { self.allocate(new_layout)? };
        let copy = old_size.min(new_layout.size());
        if copy > 0 {
            // SAFETY: ptr is live for old_size bytes, new_ptr was just
            // allocated with room for new_layout.size() >= copy, and the
            // regions are disjoint because the top only moves forward.
            unsafe { ptr::copy_nonoverlapping(ptr, new_ptr.as_ptr(), copy) };
        }
        Ok(Some(new_ptr))
    }

    fn allocation_size(&self, ptr: *const u8) -> usize {
        if ptr.is_null() || !self.owns(ptr) {
            return 0;
        }
        // SAFETY: owns() established that ptr is a live allocation address.
        unsafe { self.read_header(ptr as usize).size }
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
        self.markers.lock().clear();

        #[cfg(feature = "logging")]
        tracing::debug!(name = self.name(), "stack allocator reset");
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
        offset <= self.capacity()
            && peak <= self.capacity()
            && offset <= peak
            && self.markers.lock().iter().all(|&m| m <= self.capacity())
    }

    fn detailed_stats(&self) -> String {
        format!(
            "StackAllocator Stats:\n\
             Total Size: {}\n\
             Used: {}\n\
             Peak Usage: {}\n\
             Allocation Count: {}\n\
             Marker Count: {}\n",
            self.capacity(),
            self.used(),
            self.peak_usage(),
            self.allocation_count(),
            self.marker_count(),
        )
    }
}

impl MemoryUsage for StackAllocator {
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

impl core::fmt::Debug for StackAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StackAllocator")
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .field("allocation_count", &self.allocation_count())
            .field("marker_count", &self.marker_count())
            .finish()
    }
}
