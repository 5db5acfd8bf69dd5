//! Free-list allocator with boundary coalescing.
//!
//! The buffer starts as one spanning free block. Allocation is first-fit
//! over an address-sorted singly-linked freelist with split-on-allocate;
//! release reinserts the block in address order and merges it with adjacent
//! free neighbors, so coalescing is always maximal. Live allocations carry
//! an in-band header recording the full span they consume and the distance
//! back to the span's start.
//!
//! All freelist state lives inside the buffer; the only out-of-band state
//! is the list head. The head sits in an [`UnsafeCell`], which makes the
//! type `!Sync` — cross-thread sharing requires
//! [`SyncAllocator`](crate::SyncAllocator).
//!
//! ## Invariants
//!
//! - The freelist is sorted strictly by ascending address
//! - No two free blocks are contiguous in memory
//! - Every free block is at least `size_of::<FreeBlock>()` bytes
//! - Free bytes plus in-use spans equal the buffer capacity

use core::alloc::Layout;
use core::cell::{Cell, UnsafeCell};
use core::mem;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::buffer::RawBuffer;
use crate::error::{AllocError, AllocResult};
use crate::traits::{BufferAllocator, MemoryUsage};
use crate::utils::{align_up, atomic_max, dangling_for, is_aligned};

/// Descriptor overlaying the head of every idle region.
#[repr(C)]
struct FreeBlock {
    size: usize,
    next: *mut FreeBlock,
}

/// In-band metadata preceding every live allocation.
///
/// `size` is the full span the allocation consumes, including this header,
/// alignment padding and the bytes that will become the free-block
/// descriptor again on release. `padding` is the distance from the span
/// start to this header.
#[repr(C)]
#[derive(Clone, Copy)]
struct BlockHeader {
    size: usize,
    padding: usize,
}

const FREE_BLOCK_SIZE: usize = mem::size_of::<FreeBlock>();
const HEADER_SIZE: usize = mem::size_of::<BlockHeader>();

/// Splits never leave a fragment too small to hold a descriptor.
const MIN_BLOCK_SIZE: usize = FREE_BLOCK_SIZE;

/// Every span start stays on this boundary so descriptors and headers are
/// always written to naturally aligned addresses.
const BLOCK_ALIGN: usize = mem::align_of::<FreeBlock>();

/// General-purpose allocator with first-fit allocation, block splitting and
/// boundary coalescing.
///
/// `total_allocated` counts the full consumed span per live allocation, so
/// free bytes plus allocated bytes always equal the capacity exactly.
pub struct FreeListAllocator {
    buffer: RawBuffer,
    head: UnsafeCell<*mut FreeBlock>,
    /// Sum of consumed spans across live allocations.
    allocated: AtomicUsize,
    peak_usage: AtomicUsize,
    allocation_count: AtomicUsize,
    name: Cell<&'static str>,
    thread_safe: AtomicBool,
}

// SAFETY: the buffer and every freelist pointer into it are exclusively
// owned and move with the allocator. The type stays !Sync via UnsafeCell.
unsafe impl Send for FreeListAllocator {}

impl FreeListAllocator {
    /// Creates an allocator over a fresh buffer of `capacity` bytes.
    ///
    /// # Errors
    /// `InvalidConfig` when `capacity` cannot hold at least one descriptor,
    /// header and minimal block; `BufferAcquisition` when the host refuses
    /// the region.
    pub fn new(capacity: usize) -> AllocResult<Self> {
        if capacity < FREE_BLOCK_SIZE + HEADER_SIZE + MIN_BLOCK_SIZE {
            return Err(AllocError::invalid_config(
                "free-list buffer too small for one allocation",
            ));
        }
        let buffer = RawBuffer::new(capacity)?;

        #[cfg(feature = "logging")]
        tracing::debug!(capacity, "created free-list allocator");

        let allocator = Self {
            buffer,
            head: UnsafeCell::new(ptr::null_mut()),
            allocated: AtomicUsize::new(0),
            peak_usage: AtomicUsize::new(0),
            allocation_count: AtomicUsize::new(0),
            name: Cell::new("FreeListAllocator"),
            thread_safe: AtomicBool::new(false),
        };
        allocator.install_initial_block();
        Ok(allocator)
    }

    /// Total buffer capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    fn install_initial_block(&self) {
        let base = self.buffer.base_addr();
        // SAFETY: the base is aligned for FreeBlock and the buffer is large
        // enough for one descriptor (checked at construction). No other
        // block exists, so the write cannot clobber live data.
        unsafe {
            let block = self.buffer.ptr_at(base) as *mut FreeBlock;
            (*block).size = self.capacity();
            (*block).next = ptr::null_mut();
            *self.head.get() = block;
        }
    }

    #[inline]
    fn head_ptr(&self) -> *mut FreeBlock {
        // SAFETY: the type is !Sync, so no other thread can be mutating the
        // head while this shared read happens.
        unsafe { *self.head.get() }
    }

    #[inline]
    fn set_head(&self, block: *mut FreeBlock) {
        // SAFETY: same single-thread reasoning as head_ptr.
        unsafe { *self.head.get() = block };
    }

    /// Walks the freelist, summing free bytes, the largest block, and the
    /// block count.
    fn free_list_summary(&self) -> (usize, usize, usize) {
        let mut total = 0;
        let mut largest = 0;
        let mut count = 0;
        let mut node = self.head_ptr();
        while !node.is_null() {
            // SAFETY: freelist nodes always point at valid descriptors
            // inside the buffer (list manipulation preserves this).
            let (size, next) = unsafe { ((*node).size, (*node).next) };
            total += size;
            largest = largest.max(size);
            count += 1;
            node = next;
        }
        (total, largest, count)
    }
}

// SAFETY: allocate returns aligned pointers carved out of free blocks of
// the owned buffer; split and coalesce preserve the sorted, non-overlapping
// freelist, so live regions are never handed out twice.
unsafe impl BufferAllocator for FreeListAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        if layout.size() == 0 {
            return Ok(dangling_for(layout));
        }

        let mut prev: *mut FreeBlock = ptr::null_mut();
        let mut current = self.head_ptr();

        while !current.is_null() {
            let block_addr = current as usize;
            // SAFETY: current is a valid freelist descriptor.
            let (block_size, next) = unsafe { ((*current).size, (*current).next) };

            let user = align_up(block_addr + FREE_BLOCK_SIZE + HEADER_SIZE, layout.align());
            let padding_before_header = user - (block_addr + FREE_BLOCK_SIZE);
            // Rounding the span keeps every later block start aligned for
            // its descriptor.
            let mut required = align_up(
                layout
                    .size()
                    .saturating_add(HEADER_SIZE + padding_before_header),
                BLOCK_ALIGN,
            );

            if block_size >= required {
                if block_size - required <= MIN_BLOCK_SIZE {
                    // Absorb the whole block; the leftover would be too
                    // small to ever serve an allocation.
                    required = block_size;
                    if prev.is_null() {
                        self.set_head(next);
                    } else {
                        // SAFETY: prev is a valid descriptor earlier in the
                        // list.
                        unsafe { (*prev).next = next };
                    }
                } else {
                    // SAFETY: the remainder region [block_addr + required,
                    // block_addr + block_size) is free, large enough for a
                    // descriptor, and starts on BLOCK_ALIGN.
                    unsafe {
                        let remainder = self.buffer.ptr_at(block_addr + required) as *mut FreeBlock;
                        (*remainder).size = block_size - required;
                        (*remainder).next = next;
                        if prev.is_null() {
                            self.set_head(remainder);
                        } else {
                            (*prev).next = remainder;
                        }
                    }
                }

                let header = BlockHeader {
                    size: required,
                    padding: (user - HEADER_SIZE) - block_addr,
                };
                // SAFETY: the header slot [user - HEADER_SIZE, user) lies
                // inside the consumed span, past the descriptor bytes that
                // were just read, and user is at least BLOCK_ALIGN aligned.
                unsafe {
                    (self.buffer.ptr_at(user - HEADER_SIZE) as *mut BlockHeader).write(header);
                }

                let allocated = self.allocated.fetch_add(required, Ordering::Relaxed) + required;
                self.allocation_count.fetch_add(1, Ordering::Relaxed);
                atomic_max(&self.peak_usage, allocated);

                // SAFETY: user lies inside the consumed span.
                let ptr = unsafe { self.buffer.ptr_at(user) };
                return NonNull::new(ptr).ok_or(AllocError::exhausted(layout));
            }

            prev = current;
            current = next;
        }

        Err(AllocError::exhausted(layout))
    }

    /// # Safety
    /// `ptr` must be null, dangling from a zero-size request, or a live
    /// allocation from this allocator that has not been released yet.
    /// Double release corrupts the freelist.
    unsafe fn deallocate(&self, ptr: *mut u8) {
        if ptr.is_null() || !self.owns(ptr) {
            return;
        }

        let user = ptr as usize;
        // SAFETY: a live allocation keeps its header at user - HEADER_SIZE.
        let header = unsafe { (self.buffer.ptr_at(user - HEADER_SIZE) as *const BlockHeader).read() };
        let block_addr = (user - HEADER_SIZE) - header.padding;
        let span = header.size;

        // Reconstitute the descriptor over the span head.
        // SAFETY: block_addr is the span start, aligned and inside the
        // buffer; the span is dead from here on, so the overwrite is fine.
        let block = unsafe {
            let block = self.buffer.ptr_at(block_addr) as *mut FreeBlock;
            (*block).size = span;
            block
        };

        // Find the sorted insertion point.
        let mut prev: *mut FreeBlock = ptr::null_mut();
        let mut current = self.head_ptr();
        while !current.is_null() && (current as usize) < block_addr {
            prev = current;
            // SAFETY: current is a valid freelist descriptor.
            current = unsafe { (*current).next };
        }

        // SAFETY: prev/current bracket the insertion point; all three nodes
        // are valid descriptors and the writes only touch idle regions.
        unsafe {
            (*block).next = current;
            if prev.is_null() {
                self.set_head(block);
            } else {
                (*prev).next = block;
            }

            // Merge with the successor when the regions touch.
            if !current.is_null() && block_addr + (*block).size == current as usize {
                (*block).size += (*current).size;
                (*block).next = (*current).next;
            }

            // Merge the predecessor into the block the same way.
            if !prev.is_null() && (prev as usize) + (*prev).size == block_addr {
                (*prev).size += (*block).size;
                (*prev).next = (*block).next;
            }
        }

        self.allocated.fetch_sub(span, Ordering::Relaxed);
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
            // SAFETY: forwarded deallocate contract.
            unsafe { self.deallocate(ptr) };
            return Ok(None);
        }
        if !self.owns(ptr) {
            // Dangling zero-size pointers have no header to consult.
            // SAFETY: forwarded allocate contract.
            return unsafe { self.allocate(new_layout).map(Some) };
        }

        let usable = self.allocation_size(ptr);
        if new_layout.size() <= usable && is_aligned(ptr as usize, new_layout.align()) {
            // No shrink-split: the block keeps its span.
            // SAFETY: ptr is non-null (owns() passed).
            return Ok(Some(unsafe { NonNull::new_unchecked(ptr) }));
        }

        // SAFETY: forwarded allocate contract.
        let new_ptr = unsafe { self.allocate(new_layout)? };
        let copy = usable.min(new_layout.size());
        if copy > 0 {
            // SAFETY: ptr is live for `usable` bytes, new_ptr is a fresh
            // disjoint region of at least new_layout.size() bytes.
            unsafe { ptr::copy_nonoverlapping(ptr, new_ptr.as_ptr(), copy) };
        }
        // SAFETY: forwarded deallocate contract.
        unsafe { self.deallocate(ptr) };
        Ok(Some(new_ptr))
    }

    fn allocation_size(&self, ptr: *const u8) -> usize {
        if ptr.is_null() || !self.owns(ptr) {
            return 0;
        }
        let user = ptr as usize;
        // SAFETY: a live allocation keeps its header at user - HEADER_SIZE.
        let header = unsafe { (self.buffer.ptr_at(user - HEADER_SIZE) as *const BlockHeader).read() };
        header.size - header.padding - HEADER_SIZE
    }

    fn owns(&self, ptr: *const u8) -> bool {
        self.buffer.contains(ptr as usize)
    }

    fn total_allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    fn peak_usage(&self) -> usize {
        self.peak_usage.load(Ordering::Relaxed)
    }

    fn allocation_count(&self) -> usize {
        self.allocation_count.load(Ordering::Relaxed)
    }

    fn fragmentation_percentage(&self) -> f32 {
        let (total_free, largest, _) = self.free_list_summary();
        if total_free == 0 {
            0.0
        } else {
            (1.0 - largest as f32 / total_free as f32) * 100.0
        }
    }

    unsafe fn reset(&self) {
        self.install_initial_block();
        self.allocated.store(0, Ordering::Relaxed);
        self.peak_usage.store(0, Ordering::Relaxed);
        self.allocation_count.store(0, Ordering::Relaxed);

        #[cfg(feature = "logging")]
        tracing::debug!(name = self.name(), "free-list allocator reset");
    }

    fn name(&self) -> &'static str {
        self.name.get()
    }

    fn set_name(&self, name: &'static str) {
        self.name.set(name);
    }

    fn set_thread_safe(&self, thread_safe: bool) {
        self.thread_safe.store(thread_safe, Ordering::Relaxed);
    }

    fn is_thread_safe(&self) -> bool {
        self.thread_safe.load(Ordering::Relaxed)
    }

    fn validate_internal_state(&self) -> bool {
        let base = self.buffer.base_addr();
        let end = self.buffer.end_addr();
        let mut total_free = 0;
        let mut previous_end: Option<usize> = None;
        let mut node = self.head_ptr();

        while !node.is_null() {
            let addr = node as usize;
            if addr < base || addr >= end || !is_aligned(addr, BLOCK_ALIGN) {
                return false;
            }
            // SAFETY: bounds were checked; descriptors are only ever
            // written at aligned in-buffer addresses.
            let (size, next) = unsafe { ((*node).size, (*node).next) };
            if size < MIN_BLOCK_SIZE || addr + size > end {
                return false;
            }
            match previous_end {
                // Sorted, non-overlapping, and maximally coalesced means
                // each block starts strictly past its predecessor's end.
                Some(prev_end) if addr <= prev_end => return false,
                _ => {}
            }
            previous_end = Some(addr + size);
            total_free += size;
            node = next;
        }

        total_free + self.total_allocated() == self.capacity()
    }

    fn detailed_stats(&self) -> String {
        let (total_free, largest, blocks) = self.free_list_summary();
        format!(
            "FreeListAllocator Stats:\n\
             Total Size: {}\n\
             Allocated: {}\n\
             Free: {}\n\
             Peak Usage: {}\n\
             Allocation Count: {}\n\
             Free Block Count: {}\n\
             Largest Free Block: {}\n\
             Fragmentation: {:.2}%\n",
            self.capacity(),
            self.total_allocated(),
            total_free,
            self.peak_usage(),
            self.allocation_count(),
            blocks,
            largest,
            self.fragmentation_percentage(),
        )
    }
}

impl MemoryUsage for FreeListAllocator {
    fn used_memory(&self) -> usize {
        self.total_allocated()
    }

    fn available_memory(&self) -> usize {
        self.capacity() - self.total_allocated()
    }

    fn total_memory(&self) -> usize {
        self.capacity()
    }
}

impl core::fmt::Debug for FreeListAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (total_free, _, blocks) = self.free_list_summary();
        f.debug_struct("FreeListAllocator")
            .field("capacity", &self.capacity())
            .field("allocated", &self.total_allocated())
            .field("free", &total_free)
            .field("free_blocks", &blocks)
            .finish()
    }
}
