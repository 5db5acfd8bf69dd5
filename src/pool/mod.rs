//! Pool allocator over multiple fixed-size classes.
//!
//! ## Modules
//! - `class` - Size class declarations
//!
//! Each class owns a contiguous slab carved into equal blocks, threaded
//! into an intrusive singly-linked freelist through the first word of every
//! idle block. Allocation scans the classes in declaration order and pops
//! the first fitting class's freelist head; there is no fallback into a
//! larger class once the fitting one is empty.
//!
//! Unlike the other strategies, every contract method serializes through an
//! internal mutex, so the pool is safe to share across threads as-is.

mod class;

pub use class::PoolClass;

use core::alloc::Layout;
use core::mem;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::buffer::{RawBuffer, BUFFER_ALIGN};
use crate::error::{AllocError, AllocResult};
use crate::traits::{BufferAllocator, MemoryUsage};
use crate::utils::{align_up, dangling_for};

/// Intrusive freelist node stored in the first word of an idle block.
#[repr(C)]
struct FreeLink {
    next: *mut FreeLink,
}

/// One size class: a slab plus its freelist.
struct SubPool {
    slab: RawBuffer,
    block_size: usize,
    block_align: usize,
    block_count: usize,
    free_head: *mut FreeLink,
    free_count: usize,
}

// SAFETY: the freelist pointers only ever point into the exclusively owned
// slab, which moves with the struct.
unsafe impl Send for SubPool {}

impl SubPool {
    fn new(declared: PoolClass) -> AllocResult<Self> {
        if declared.block_size < mem::size_of::<*mut u8>() {
            return Err(AllocError::invalid_config(
                "pool block size must hold a pointer",
            ));
        }
        if declared.block_count == 0 {
            return Err(AllocError::invalid_config(
                "pool block count must be non-zero",
            ));
        }

        // Keeping block size pointer-aligned keeps every block's free link
        // on a natural boundary.
        let block_size = align_up(declared.block_size, mem::align_of::<*mut FreeLink>());
        let slab_size = block_size
            .checked_mul(declared.block_count)
            .ok_or(AllocError::invalid_config("pool slab size overflows"))?;
        let slab = RawBuffer::new(slab_size)?;

        // A block's guaranteed alignment: the slab base is BUFFER_ALIGN
        // aligned and successive blocks repeat every block_size bytes.
        let block_align = BUFFER_ALIGN.min(1 << block_size.trailing_zeros());

        let mut pool = Self {
            slab,
            block_size,
            block_align,
            block_count: declared.block_count,
            free_head: ptr::null_mut(),
            free_count: 0,
        };
        pool.rebuild_free_list();
        Ok(pool)
    }

    /// Threads every block into the freelist in ascending address order.
    fn rebuild_free_list(&mut self) {
        let mut head: *mut FreeLink = ptr::null_mut();
        for i in (0..self.block_count).rev() {
            let addr = self.slab.base_addr() + i * self.block_size;
            debug_assert!(addr % mem::align_of::<FreeLink>() == 0);
            // SAFETY: addr is a block boundary inside the owned slab,
            // pointer-aligned because block_size is; rebuilding happens
            // under &mut, so no block is live.
            unsafe {
                let block = self.slab.ptr_at(addr) as *mut FreeLink;
                (*block).next = head;
                head = block;
            }
        }
        self.free_head = head;
        self.free_count = self.block_count;
    }

    fn contains(&self, addr: usize) -> bool {
        self.slab.contains(addr)
    }

    fn is_block_boundary(&self, addr: usize) -> bool {
        self.contains(addr) && (addr - self.slab.base_addr()) % self.block_size == 0
    }

    fn pop_block(&mut self) -> Option<NonNull<u8>> {
        let head = self.free_head;
        if head.is_null() {
            return None;
        }
        // SAFETY: a non-null freelist head always points at an idle block
        // inside the slab whose first word is a valid link.
        self.free_head = unsafe { (*head).next };
        self.free_count -= 1;
        NonNull::new(head.cast::<u8>())
    }

    fn push_block(&mut self, ptr: NonNull<u8>) {
        let block = ptr.as_ptr().cast::<FreeLink>();
        // SAFETY: the caller verified ptr is a block boundary of this slab;
        // the block is being retired, so overwriting its first word is fine.
        unsafe { (*block).next = self.free_head };
        self.free_head = block;
        self.free_count += 1;
    }

    fn used_blocks(&self) -> usize {
        self.block_count - self.free_count
    }
}

/// Mutable pool state, guarded by the allocator's mutex.
struct PoolState {
    pools: Vec<SubPool>,
    total_allocated: usize,
    peak_usage: usize,
    allocation_count: usize,
}

impl PoolState {
    fn allocate(&mut self, layout: Layout) -> AllocResult<NonNull<u8>> {
        let index = self
            .pools
            .iter()
            .position(|pool| pool.block_size >= layout.size())
            .ok_or(AllocError::no_matching_size_class(layout))?;

        let pool = &mut self.pools[index];
        if layout.align() > pool.block_align {
            return Err(AllocError::unsupported_alignment(layout));
        }

        let block_size = pool.block_size;
        let ptr = pool.pop_block().ok_or(AllocError::exhausted(layout))?;

        self.total_allocated += block_size;
        self.allocation_count += 1;
        self.peak_usage = self.peak_usage.max(self.total_allocated);
        Ok(ptr)
    }

    fn deallocate(&mut self, ptr: NonNull<u8>) {
        let addr = ptr.as_ptr() as usize;
        for pool in &mut self.pools {
            if pool.contains(addr) {
                if !pool.is_block_boundary(addr) {
                    return;
                }
                let block_size = pool.block_size;
                pool.push_block(ptr);
                self.total_allocated -= block_size;
                self.allocation_count -= 1;
                return;
            }
        }
    }

    fn block_size_of(&self, addr: usize) -> usize {
        self.pools
            .iter()
            .find(|pool| pool.contains(addr))
            .map_or(0, |pool| pool.block_size)
    }
}

/// Pool allocator with one intrusive freelist per size class.
///
/// `total_allocated` counts in whole blocks of the serving class, not in
/// requested bytes. Fragmentation inside a class is not reported.
pub struct PoolAllocator {
    state: Mutex<PoolState>,
    name: Mutex<&'static str>,
    thread_safe: AtomicBool,
}

impl PoolAllocator {
    /// Creates a pool allocator from an ordered list of size classes.
    ///
    /// The declared order is the search order used by `allocate`.
    ///
    /// # Errors
    /// `InvalidConfig` for an empty class list, a block size too small for
    /// the intrusive link, or a zero block count; `BufferAcquisition` when a
    /// slab cannot be acquired.
    pub fn new<C>(classes: &[C]) -> AllocResult<Self>
    where
        C: Into<PoolClass> + Copy,
    {
        if classes.is_empty() {
            return Err(AllocError::invalid_config(
                "pool needs at least one size class",
            ));
        }

        let pools = classes
            .iter()
            .map(|&class| SubPool::new(class.into()))
            .collect::<AllocResult<Vec<_>>>()?;

        #[cfg(feature = "logging")]
        tracing::debug!(classes = pools.len(), "created pool allocator");

        Ok(Self {
            state: Mutex::new(PoolState {
                pools,
                total_allocated: 0,
                peak_usage: 0,
                allocation_count: 0,
            }),
            name: Mutex::new(""),
            thread_safe: AtomicBool::new(false),
        })
    }

    /// Number of declared size classes.
    pub fn class_count(&self) -> usize {
        self.state.lock().pools.len()
    }

    /// Free blocks remaining in the class at `index`, or `None` for an
    /// unknown index.
    pub fn free_blocks(&self, index: usize) -> Option<usize> {
        self.state.lock().pools.get(index).map(|p| p.free_count)
    }

    /// Total capacity across all slabs in bytes.
    pub fn capacity(&self) -> usize {
        self.state
            .lock()
            .pools
            .iter()
            .map(|p| p.slab.capacity())
            .sum()
    }
}

// SAFETY: every contract method takes the internal mutex, so returned
// blocks are popped exactly once and all counters stay consistent even
// under concurrent callers.
unsafe impl BufferAllocator for PoolAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        if layout.size() == 0 {
            return Ok(dangling_for(layout));
        }
        self.state.lock().allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        self.state.lock().deallocate(ptr);
    }

    unsafe fn reallocate(
        &self,
        ptr: *mut u8,
        new_layout: Layout,
    ) -> AllocResult<Option<NonNull<u8>>> {
        let mut state = self.state.lock();

        let Some(old_ptr) = NonNull::new(ptr) else {
            if new_layout.size() == 0 {
                return Ok(Some(dangling_for(new_layout)));
            }
            return state.allocate(new_layout).map(Some);
        };

        if new_layout.size() == 0 {
            state.deallocate(old_ptr);
            return Ok(Some(dangling_for(new_layout)));
        }

        let old_size = state.block_size_of(old_ptr.as_ptr() as usize);
        let new_ptr = state.allocate(new_layout)?;
        let copy = old_size.min(new_layout.size());
        if copy > 0 {
            // SAFETY: old_ptr is live for old_size bytes, new_ptr is a
            // fresh block of at least new_layout.size() bytes, and two
            // distinct blocks never overlap.
            unsafe { ptr::copy_nonoverlapping(old_ptr.as_ptr(), new_ptr.as_ptr(), copy) };
        }
        state.deallocate(old_ptr);
        Ok(Some(new_ptr))
    }

    fn allocation_size(&self, ptr: *const u8) -> usize {
        if ptr.is_null() {
            return 0;
        }
        self.state.lock().block_size_of(ptr as usize)
    }

    fn owns(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        self.state.lock().pools.iter().any(|p| p.contains(addr))
    }

    fn total_allocated(&self) -> usize {
        self.state.lock().total_allocated
    }

    fn peak_usage(&self) -> usize {
        self.state.lock().peak_usage
    }

    fn allocation_count(&self) -> usize {
        self.state.lock().allocation_count
    }

    fn fragmentation_percentage(&self) -> f32 {
        // Class-internal waste is not reported here.
        0.0
    }

    unsafe fn reset(&self) {
        let mut state = self.state.lock();
        for pool in &mut state.pools {
            pool.rebuild_free_list();
        }
        state.total_allocated = 0;
        state.peak_usage = 0;
        state.allocation_count = 0;

        #[cfg(feature = "logging")]
        tracing::debug!(name = self.name(), "pool allocator reset");
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
        let state = self.state.lock();
        let mut live_bytes = 0;

        for pool in &state.pools {
            let mut seen = 0;
            let mut node = pool.free_head;
            while !node.is_null() {
                let addr = node as usize;
                if !pool.is_block_boundary(addr) {
                    return false;
                }
                seen += 1;
                if seen > pool.block_count {
                    return false;
                }
                // SAFETY: boundary check above proves node is an idle block
                // of this slab; its first word is the freelist link.
                node = unsafe { (*node).next };
            }
            if seen != pool.free_count {
                return false;
            }
            live_bytes += pool.used_blocks() * pool.block_size;
        }

        live_bytes == state.total_allocated
    }

    fn detailed_stats(&self) -> String {
        use core::fmt::Write as _;

        let state = self.state.lock();
        let mut report = format!(
            "PoolAllocator Stats:\n\
             Total Allocated: {}\n\
             Peak Usage: {}\n\
             Allocation Count: {}\n",
            state.total_allocated, state.peak_usage, state.allocation_count,
        );
        for (index, pool) in state.pools.iter().enumerate() {
            let _ = writeln!(
                report,
                "Class {}: Block Size: {}, Block Count: {}, Free: {}, In Use: {}",
                index,
                pool.block_size,
                pool.block_count,
                pool.free_count,
                pool.used_blocks(),
            );
        }
        report
    }
}

impl MemoryUsage for PoolAllocator {
    fn used_memory(&self) -> usize {
        self.total_allocated()
    }

    fn available_memory(&self) -> usize {
        let state = self.state.lock();
        state
            .pools
            .iter()
            .map(|p| p.free_count * p.block_size)
            .sum()
    }

    fn total_memory(&self) -> usize {
        self.capacity()
    }
}

impl core::fmt::Debug for PoolAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PoolAllocator")
            .field("classes", &state.pools.len())
            .field("total_allocated", &state.total_allocated)
            .field("allocation_count", &state.allocation_count)
            .finish()
    }
}
