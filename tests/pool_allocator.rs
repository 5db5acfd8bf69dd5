//! Integration tests for the pool allocator.

use core::alloc::Layout;
use std::sync::Arc;

use suballoc::{AllocErrorKind, BufferAllocator, PoolAllocator, PoolClass};

fn two_class_pool() -> PoolAllocator {
    PoolAllocator::new(&[PoolClass::new(32, 4), PoolClass::new(128, 2)])
        .expect("failed to create pool allocator")
}

#[test]
fn requests_land_in_the_first_fitting_class() {
    let pool = two_class_pool();

    unsafe {
        let small = Layout::from_size_align(20, 8).unwrap();
        let p = pool.allocate(small).expect("small allocation failed");
        assert_eq!(pool.allocation_size(p.as_ptr()), 32);

        let large = Layout::from_size_align(100, 8).unwrap();
        let q = pool.allocate(large).expect("large allocation failed");
        assert_eq!(pool.allocation_size(q.as_ptr()), 128);
    }
}

#[test]
fn class_exhaustion_has_no_fallback() {
    let pool = two_class_pool();

    unsafe {
        let layout = Layout::from_size_align(32, 8).unwrap();
        for _ in 0..4 {
            pool.allocate(layout).expect("class should have room");
        }

        // The 32-byte class is empty; the 128-byte class must not serve it.
        let err = pool.allocate(layout).unwrap_err();
        assert_eq!(err.kind(), AllocErrorKind::Exhausted);
        assert_eq!(pool.free_blocks(1), Some(2));
    }
}

#[test]
fn oversized_request_is_rejected() {
    let pool = two_class_pool();

    unsafe {
        let layout = Layout::from_size_align(256, 8).unwrap();
        let err = pool.allocate(layout).unwrap_err();
        assert_eq!(err.kind(), AllocErrorKind::NoMatchingSizeClass);
    }
}

#[test]
fn excessive_alignment_is_rejected() {
    let pool = two_class_pool();

    unsafe {
        let layout = Layout::from_size_align(16, 64).unwrap();
        let err = pool.allocate(layout).unwrap_err();
        assert_eq!(err.kind(), AllocErrorKind::UnsupportedAlignment);
    }
}

#[test]
fn release_recycles_blocks() {
    let pool = two_class_pool();

    unsafe {
        let layout = Layout::from_size_align(32, 8).unwrap();
        let first = pool.allocate(layout).expect("allocation failed");
        let addr = first.as_ptr() as usize;
        pool.deallocate(first.as_ptr());

        // The freed block is the freelist head again.
        let second = pool.allocate(layout).expect("allocation failed");
        assert_eq!(second.as_ptr() as usize, addr);
    }
}

#[test]
fn counters_track_class_sizes() {
    let pool = two_class_pool();

    unsafe {
        let small = Layout::from_size_align(10, 8).unwrap();
        let large = Layout::from_size_align(128, 8).unwrap();
        let a = pool.allocate(small).expect("allocation failed");
        let _b = pool.allocate(large).expect("allocation failed");

        assert_eq!(pool.total_allocated(), 32 + 128);
        assert_eq!(pool.allocation_count(), 2);
        assert_eq!(pool.peak_usage(), 32 + 128);

        pool.deallocate(a.as_ptr());
        assert_eq!(pool.total_allocated(), 128);
        assert_eq!(pool.allocation_count(), 1);
        assert_eq!(pool.peak_usage(), 32 + 128);
    }

    assert!(pool.validate_internal_state());
}

#[test]
fn reallocate_moves_across_classes() {
    let pool = two_class_pool();

    unsafe {
        let small = Layout::from_size_align(24, 8).unwrap();
        let ptr = pool.allocate(small).expect("allocation failed");
        for i in 0..24 {
            ptr.as_ptr().add(i).write(i as u8);
        }

        let large = Layout::from_size_align(100, 8).unwrap();
        let moved = pool
            .reallocate(ptr.as_ptr(), large)
            .expect("reallocation failed")
            .expect("grow must return a pointer");

        assert_eq!(pool.allocation_size(moved.as_ptr()), 128);
        for i in 0..24 {
            assert_eq!(*moved.as_ptr().add(i), i as u8);
        }
        // The small block went back to its class.
        assert_eq!(pool.free_blocks(0), Some(4));
    }
}

#[test]
fn reset_rebuilds_every_class() {
    let pool = two_class_pool();

    unsafe {
        let layout = Layout::from_size_align(32, 8).unwrap();
        for _ in 0..4 {
            pool.allocate(layout).expect("allocation failed");
        }
        assert_eq!(pool.free_blocks(0), Some(0));

        pool.reset();
    }

    assert_eq!(pool.free_blocks(0), Some(4));
    assert_eq!(pool.free_blocks(1), Some(2));
    assert_eq!(pool.total_allocated(), 0);
    assert_eq!(pool.allocation_count(), 0);
    assert!(pool.validate_internal_state());
}

#[test]
fn owns_covers_every_slab() {
    let pool = two_class_pool();

    unsafe {
        let small = Layout::from_size_align(8, 8).unwrap();
        let large = Layout::from_size_align(128, 8).unwrap();
        let a = pool.allocate(small).expect("allocation failed");
        let b = pool.allocate(large).expect("allocation failed");

        assert!(pool.owns(a.as_ptr()));
        assert!(pool.owns(b.as_ptr()));
        assert!(!pool.owns(std::ptr::null()));
        let stack_local = 0u8;
        assert!(!pool.owns(&stack_local));
    }
}

#[test]
fn detailed_stats_report_per_class_occupancy() {
    let pool = two_class_pool();

    unsafe {
        let layout = Layout::from_size_align(32, 8).unwrap();
        let _a = pool.allocate(layout).expect("allocation failed");
    }

    let stats = pool.detailed_stats();
    assert!(stats.contains("Class 0: Block Size: 32, Block Count: 4, Free: 3, In Use: 1"));
    assert!(stats.contains("Class 1: Block Size: 128, Block Count: 2, Free: 2, In Use: 0"));
}

#[test]
fn invalid_configurations_are_rejected() {
    let empty: &[PoolClass] = &[];
    assert!(PoolAllocator::new(empty).is_err());
    assert!(PoolAllocator::new(&[PoolClass::new(4, 16)]).is_err());
    assert!(PoolAllocator::new(&[PoolClass::new(64, 0)]).is_err());
}

#[test]
fn concurrent_allocate_and_release() {
    let pool = Arc::new(
        PoolAllocator::new(&[PoolClass::new(64, 8)]).expect("failed to create pool allocator"),
    );
    pool.set_thread_safe(true);

    let mut handles = Vec::new();
    for worker in 0..4u8 {
        let pool = Arc::clone(&pool);
        handles.push(std::thread::spawn(move || {
            let layout = Layout::from_size_align(48, 8).unwrap();
            for _ in 0..200 {
                unsafe {
                    let ptr = pool.allocate(layout).expect("allocation failed");
                    std::ptr::write_bytes(ptr.as_ptr(), worker, 48);
                    assert_eq!(*ptr.as_ptr(), worker);
                    pool.deallocate(ptr.as_ptr());
                }
            }
        }));
    }
    for handle in handles {
        handle.join().expect("worker panicked");
    }

    assert_eq!(pool.total_allocated(), 0);
    assert_eq!(pool.free_blocks(0), Some(8));
    assert!(pool.validate_internal_state());
}
