//! A reservation that cannot be made read/write leaves no mapping behind
//!
//! Counts lines of /proc/self/maps, so this binary holds a single test and
//! nothing else maps memory while it runs.

#![cfg(target_os = "linux")]

use pcache_heap::{HeapConfig, MapError, RegionMapper};

fn mapping_count() -> usize {
    std::fs::read_to_string("/proc/self/maps")
        .expect("read /proc/self/maps")
        .lines()
        .count()
}

#[test]
fn failed_protection_leaves_no_mapping() {
    let overcommit = std::fs::read_to_string("/proc/sys/vm/overcommit_memory").unwrap_or_default();
    if overcommit.trim() == "1" {
        return;
    }

    let mapper = RegionMapper::new(&HeapConfig {
        annotate_regions: false,
        ..HeapConfig::default()
    })
    .expect("mapper");
    let len = 1usize << 44;

    let before = mapping_count();
    let result = mapper.reserve(len);
    let after = mapping_count();

    assert_eq!(result.unwrap_err(), MapError::Protection { len });
    assert_eq!(after, before);
    assert_eq!(mapper.stats().regions, 0);
}
