//! Arena tests
//!
//! - Allocation: malloc/calloc/free through the mapper
//! - Resize: realloc keeps contents
//! - Lifecycle: dropping the arena unmaps every region
//! - Strategies: both lock strategies and both backings

use super::*;
use crate::config::{Backing, HeapConfig, LockStrategy};

fn arena() -> Arena {
    Arena::new(&HeapConfig::default()).expect("arena")
}

// ===== Allocation =====

#[test]
fn arena_starts_without_regions() {
    let arena = arena();
    let stats = arena.stats();
    assert_eq!(stats.regions.regions, 0);
    assert_eq!(stats.live_blocks, 0);
    assert_eq!(arena.lock_strategy(), LockStrategy::Spin);
}

#[test]
fn malloc_maps_guarded_region_on_demand() {
    let arena = arena();
    let ptr = arena.malloc(128).expect("malloc");
    assert_eq!(ptr.as_ptr() as usize % BLOCK_ALIGN, 0);

    let stats = arena.stats();
    assert!(stats.regions.regions >= 1);
    assert_eq!(stats.regions.guard_bytes, stats.regions.regions * 2 * arena.mapper().page_size());
    assert_eq!(stats.live_blocks, 1);
    assert_eq!(stats.live_bytes, 128);

    unsafe {
        core::ptr::write_bytes(ptr.as_ptr(), 0xCD, 128);
        arena.free(ptr, 128);
    }
    assert_eq!(arena.stats().live_blocks, 0);
    assert_eq!(arena.stats().live_bytes, 0);
}

#[test]
fn calloc_zeroes_reused_memory() {
    let arena = arena();
    let size = 4096;

    let dirty = arena.malloc(size).unwrap();
    unsafe {
        core::ptr::write_bytes(dirty.as_ptr(), 0xFF, size);
        arena.free(dirty, size);
    }

    let clean = arena.calloc(size).unwrap();
    let bytes = unsafe { core::slice::from_raw_parts(clean.as_ptr(), size) };
    assert!(bytes.iter().all(|&b| b == 0));
    unsafe { arena.free(clean, size) };
}

#[test]
fn distinct_live_blocks_do_not_overlap() {
    let arena = arena();
    let sizes = [8, 24, 100, 512, 4096, 70_000];

    let blocks: Vec<_> = sizes.iter().map(|&s| (arena.malloc(s).unwrap(), s)).collect();
    for (i, &(a, sa)) in blocks.iter().enumerate() {
        for &(b, _) in &blocks[i + 1..] {
            let (a, b) = (a.as_ptr() as usize, b.as_ptr() as usize);
            assert!(b >= a + sa || b < a, "blocks overlap");
        }
    }
    for (ptr, size) in blocks {
        unsafe { arena.free(ptr, size) };
    }
}

#[test]
fn huge_allocation_is_usable_end_to_end() {
    let arena = arena();
    let size = 4 * 1024 * 1024;
    let ptr = arena.malloc(size).unwrap();
    unsafe {
        core::ptr::write_bytes(ptr.as_ptr(), 0x3C, size);
        assert_eq!(*ptr.as_ptr().add(size - 1), 0x3C);
        arena.free(ptr, size);
    }
}

// ===== Resize =====

#[test]
fn realloc_grow_preserves_prefix() {
    let arena = arena();
    let ptr = arena.malloc(64).unwrap();
    unsafe {
        for i in 0..64 {
            *ptr.as_ptr().add(i) = i as u8;
        }
        let grown = arena.realloc(ptr, 64, 1024 * 1024).expect("realloc");
        for i in 0..64 {
            assert_eq!(*grown.as_ptr().add(i), i as u8);
        }
        assert_eq!(arena.stats().live_bytes, 1024 * 1024);
        arena.free(grown, 1024 * 1024);
    }
}

#[test]
fn realloc_shrink_huge_block() {
    let arena = arena();
    let big = 2 * 1024 * 1024;
    let ptr = arena.malloc(big).unwrap();
    unsafe {
        core::ptr::write_bytes(ptr.as_ptr(), 0x5E, big);
        let small = arena.realloc(ptr, big, 300 * 1024).expect("shrink");
        assert_eq!(*small.as_ptr().add(300 * 1024 - 1), 0x5E);
        arena.free(small, 300 * 1024);
    }
}

#[test]
fn trim_after_frees_does_not_break_arena() {
    let arena = arena();
    let ptrs: Vec<_> = (0..64).map(|_| arena.malloc(16 * 1024).unwrap()).collect();
    for ptr in ptrs {
        unsafe { arena.free(ptr, 16 * 1024) };
    }
    arena.trim();

    let again = arena.malloc(16 * 1024).unwrap();
    unsafe { arena.free(again, 16 * 1024) };
}

// ===== Lifecycle =====

#[test]
fn drop_releases_every_region() {
    let arena = arena();
    for size in [100, 10_000, 1_000_000] {
        arena.malloc(size).unwrap();
    }
    let mapper = arena.mapper().clone();
    assert!(mapper.stats().regions > 0);

    drop(arena);
    assert_eq!(mapper.stats().regions, 0);
}

// ===== Strategies =====

#[test]
fn parking_lock_and_plain_backing() {
    let config = HeapConfig {
        backing: Backing::Plain,
        lock: LockStrategy::Parking,
        ..HeapConfig::default()
    };
    let arena = Arena::new(&config).unwrap();
    assert_eq!(arena.lock_strategy(), LockStrategy::Parking);

    let ptr = arena.calloc(1000).unwrap();
    assert_eq!(arena.stats().regions.guard_bytes, 0);
    unsafe { arena.free(ptr, 1000) };
}

#[test]
fn invalid_config_is_rejected() {
    let config = HeapConfig {
        region_label: String::new(),
        ..HeapConfig::default()
    };
    assert!(matches!(Arena::new(&config), Err(HeapError::Config(_))));
}
