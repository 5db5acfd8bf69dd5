//! Integration tests for the stack allocator.

use core::alloc::Layout;
use suballoc::{BufferAllocator, StackAllocator, StackScope};

#[test]
fn basic_allocation() {
    let allocator = StackAllocator::new(4096).expect("failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(128, 8).unwrap();
        let ptr = allocator.allocate(layout).expect("allocation failed");

        std::ptr::write_bytes(ptr.as_ptr(), 0x55, 128);
        assert_eq!(*ptr.as_ptr(), 0x55);
        assert_eq!(allocator.allocation_size(ptr.as_ptr()), 128);

        allocator.deallocate(ptr.as_ptr());
    }

    assert_eq!(allocator.allocation_count(), 0);
    assert_eq!(allocator.total_allocated(), 0);
}

#[test]
fn lifo_release_rewinds_fully() {
    let allocator = StackAllocator::new(4096).expect("failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(64, 8).unwrap();

        let a = allocator.allocate(layout).expect("allocation a failed");
        let b = allocator.allocate(layout).expect("allocation b failed");
        let c = allocator.allocate(layout).expect("allocation c failed");

        std::ptr::write_bytes(a.as_ptr(), 0xAA, 64);
        std::ptr::write_bytes(b.as_ptr(), 0xBB, 64);
        std::ptr::write_bytes(c.as_ptr(), 0xCC, 64);
        assert_eq!(*a.as_ptr(), 0xAA);
        assert_eq!(*b.as_ptr(), 0xBB);
        assert_eq!(*c.as_ptr(), 0xCC);

        allocator.deallocate(c.as_ptr());
        allocator.deallocate(b.as_ptr());
        allocator.deallocate(a.as_ptr());
    }

    assert_eq!(allocator.total_allocated(), 0);
    assert!(allocator.validate_internal_state());
}

#[test]
fn marker_rewind_reuses_addresses() {
    let allocator = StackAllocator::new(1024).expect("failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(64, 16).unwrap();

        allocator.push_marker();
        let p1 = allocator.allocate(layout).expect("allocation p1 failed");
        let _p2 = allocator.allocate(layout).expect("allocation p2 failed");
        allocator.pop_marker();

        let p3 = allocator.allocate(layout).expect("allocation p3 failed");
        assert_eq!(p1.as_ptr(), p3.as_ptr());
    }
}

#[test]
fn nested_markers() {
    let allocator = StackAllocator::new(4096).expect("failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(32, 8).unwrap();

        let outer = allocator.marker();
        let _a = allocator.allocate(layout).expect("allocation failed");

        let middle = allocator.marker();
        let _b = allocator.allocate(layout).expect("allocation failed");

        let inner = allocator.marker();
        let _c = allocator.allocate(layout).expect("allocation failed");

        allocator.free_to_marker(inner);
        assert_eq!(allocator.total_allocated(), inner.offset());

        allocator.free_to_marker(middle);
        allocator.free_to_marker(outer);
        assert_eq!(allocator.total_allocated(), 0);
    }
}

#[test]
fn stale_marker_above_top_is_ignored() {
    let allocator = StackAllocator::new(1024).expect("failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(64, 8).unwrap();
        let _a = allocator.allocate(layout).expect("allocation failed");
        let high = allocator.marker();
        allocator.reset();

        allocator.free_to_marker(high);
        assert_eq!(allocator.total_allocated(), 0);
    }
}

#[test]
fn scope_restores_on_drop() {
    let allocator = StackAllocator::new(4096).expect("failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(64, 8).unwrap();

        let before = allocator.total_allocated();
        {
            let scope = StackScope::new(&allocator);
            let _p1 = scope.allocator().allocate(layout).expect("allocation failed");
            let _p2 = scope.allocator().allocate(layout).expect("allocation failed");
            assert!(allocator.total_allocated() > before);
        }
        assert_eq!(allocator.total_allocated(), before);
    }
}

#[test]
fn reallocate_grows_top_allocation_in_place() {
    let allocator = StackAllocator::new(1024).expect("failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(64, 8).unwrap();
        let ptr = allocator.allocate(layout).expect("allocation failed");
        for i in 0..64 {
            ptr.as_ptr().add(i).write(i as u8);
        }

        let grown = Layout::from_size_align(128, 8).unwrap();
        let new_ptr = allocator
            .reallocate(ptr.as_ptr(), grown)
            .expect("reallocation failed")
            .expect("grow must return a pointer");

        assert_eq!(ptr.as_ptr(), new_ptr.as_ptr());
        assert_eq!(allocator.allocation_size(new_ptr.as_ptr()), 128);
        for i in 0..64 {
            assert_eq!(*new_ptr.as_ptr().add(i), i as u8);
        }
    }
}

#[test]
fn reallocate_shrinks_top_allocation_in_place() {
    let allocator = StackAllocator::new(1024).expect("failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(128, 8).unwrap();
        let ptr = allocator.allocate(layout).expect("allocation failed");
        let used_before = allocator.total_allocated();

        let shrunk = Layout::from_size_align(32, 8).unwrap();
        let new_ptr = allocator
            .reallocate(ptr.as_ptr(), shrunk)
            .expect("reallocation failed")
            .expect("shrink must return a pointer");

        assert_eq!(ptr.as_ptr(), new_ptr.as_ptr());
        assert!(allocator.total_allocated() < used_before);
        assert_eq!(allocator.allocation_size(new_ptr.as_ptr()), 32);
    }
}

#[test]
fn reallocate_of_buried_allocation_copies() {
    let allocator = StackAllocator::new(2048).expect("failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(64, 8).unwrap();
        let buried = allocator.allocate(layout).expect("allocation failed");
        std::ptr::write_bytes(buried.as_ptr(), 0xAB, 64);
        let _top = allocator.allocate(layout).expect("allocation failed");

        let grown = Layout::from_size_align(96, 8).unwrap();
        let moved = allocator
            .reallocate(buried.as_ptr(), grown)
            .expect("reallocation failed")
            .expect("grow must return a pointer");

        assert_ne!(buried.as_ptr(), moved.as_ptr());
        for i in 0..64 {
            assert_eq!(*moved.as_ptr().add(i), 0xAB);
        }
    }
}

#[test]
fn exhaustion_is_reported() {
    let allocator = StackAllocator::new(128).expect("failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(200, 8).unwrap();
        assert!(allocator.allocate(layout).is_err());
    }
}

#[test]
fn alignment_is_respected() {
    let allocator = StackAllocator::new(4096).expect("failed to create stack allocator");

    unsafe {
        for align in [8usize, 16, 32, 64] {
            let layout = Layout::from_size_align(48, align).unwrap();
            let ptr = allocator.allocate(layout).expect("allocation failed");
            assert_eq!(ptr.as_ptr() as usize % align, 0, "misaligned for {align}");
        }
    }
}

#[test]
fn reset_clears_markers_and_counters() {
    let allocator = StackAllocator::new(1024).expect("failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(64, 8).unwrap();
        allocator.push_marker();
        let _p = allocator.allocate(layout).expect("allocation failed");
        allocator.push_marker();

        allocator.reset();
    }

    assert_eq!(allocator.total_allocated(), 0);
    assert_eq!(allocator.allocation_count(), 0);
    assert_eq!(allocator.marker_count(), 0);
    assert!(allocator.validate_internal_state());
}

#[test]
fn detailed_stats_lists_marker_count() {
    let allocator = StackAllocator::new(512).expect("failed to create stack allocator");
    allocator.push_marker();
    allocator.push_marker();

    let stats = allocator.detailed_stats();
    assert!(stats.contains("Total Size: 512"));
    assert!(stats.contains("Marker Count: 2"));
}

#[test]
fn peak_usage_survives_rewind() {
    let allocator = StackAllocator::new(1024).expect("failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(256, 8).unwrap();
        let marker = allocator.marker();
        let _p = allocator.allocate(layout).expect("allocation failed");
        let peak = allocator.peak_usage();
        assert!(peak >= 256);

        allocator.free_to_marker(marker);
        assert_eq!(allocator.peak_usage(), peak);
    }
}
