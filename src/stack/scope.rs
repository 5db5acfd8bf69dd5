//! RAII helper for automatic stack restoration.

use super::{StackAllocator, StackMarker};

/// Restores the stack to a captured marker on drop.
///
/// Everything allocated while the scope is alive is released when it goes
/// out of scope, including on unwind.
pub struct StackScope<'a> {
    allocator: &'a StackAllocator,
    marker: StackMarker,
}

impl<'a> StackScope<'a> {
    /// Captures the current position of `allocator`.
    pub fn new(allocator: &'a StackAllocator) -> Self {
        let marker = allocator.marker();
        Self { allocator, marker }
    }

    /// The allocator this scope guards.
    pub fn allocator(&self) -> &'a StackAllocator {
        self.allocator
    }

    /// The captured marker.
    pub fn marker(&self) -> StackMarker {
        self.marker
    }
}

impl Drop for StackScope<'_> {
    fn drop(&mut self) {
        // SAFETY: the scope borrows the allocator for its whole lifetime,
        // and dropping it declares the allocations made inside dead.
        unsafe { self.allocator.free_to_marker(self.marker) };
    }
}
