//! Multi-threaded allocate/free stress
//!
//! Every block is filled with a per-block tag and checked before it is
//! freed, so any overlap between concurrently handed-out blocks shows up as
//! a corrupted tag.

use std::sync::mpsc;
use std::thread;

use pcache_heap::{Heap, HeapConfig, LockStrategy, SizeHeader};

const THREADS: usize = 8;
const CYCLES: usize = 2_000;
const SIZES: [usize; 8] = [0, 1, 24, 100, 1024, 4095, 4097, 70_000];

/// xorshift64*, seeded per thread
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 >> 12;
        self.0 ^= self.0 << 25;
        self.0 ^= self.0 >> 27;
        self.0.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}

unsafe fn check_and_free(heap: &Heap, addr: usize, size: usize, tag: u8) {
    let ptr = addr as *mut u8;
    assert_eq!(heap.requested_size(ptr), size);
    let bytes = core::slice::from_raw_parts(ptr, size);
    assert!(bytes.iter().all(|&b| b == tag), "block at {:#x} corrupted", addr);
    heap.free(ptr);
}

fn stress(config: HeapConfig) {
    let heap = Heap::new(config).expect("heap");

    thread::scope(|scope| {
        for t in 0..THREADS {
            let heap = &heap;
            scope.spawn(move || {
                let mut rng = Rng(0x9E37_79B9_7F4A_7C15 ^ (t as u64 + 1));
                let mut live: Vec<(usize, usize, u8)> = Vec::new();

                for cycle in 0..CYCLES {
                    if live.is_empty() || rng.below(3) != 0 {
                        let size = SIZES[rng.below(SIZES.len())];
                        let tag = (cycle % 251) as u8;
                        let ptr = if rng.below(2) == 0 {
                            heap.allocate(size)
                        } else {
                            heap.allocate_zeroed(size)
                        }
                        .expect("allocation");
                        unsafe { core::ptr::write_bytes(ptr.as_ptr(), tag, size) };
                        live.push((ptr.as_ptr() as usize, size, tag));
                    } else {
                        let (addr, size, tag) = live.swap_remove(rng.below(live.len()));
                        unsafe { check_and_free(heap, addr, size, tag) };
                    }
                }

                for (addr, size, tag) in live {
                    unsafe { check_and_free(heap, addr, size, tag) };
                }
            });
        }
    });

    let stats = heap.stats();
    assert_eq!(stats.live_blocks, 0);
    assert_eq!(stats.live_bytes, 0);
}

#[test]
fn spin_locked_heap_survives_parallel_churn() {
    stress(HeapConfig::default());
}

#[test]
fn parking_locked_heap_survives_parallel_churn() {
    stress(HeapConfig {
        lock: LockStrategy::Parking,
        ..HeapConfig::default()
    });
}

#[test]
fn plain_heap_survives_parallel_churn() {
    stress(HeapConfig::plain());
}

#[test]
fn blocks_can_be_freed_on_another_thread() {
    let heap = Heap::new(HeapConfig::default()).expect("heap");
    let (tx, rx) = mpsc::channel::<(usize, usize)>();

    thread::scope(|scope| {
        let producer = &heap;
        scope.spawn(move || {
            for i in 0..500usize {
                let size = 64 + i;
                let ptr = producer.allocate(size).expect("allocation");
                unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0x5A, size) };
                tx.send((ptr.as_ptr() as usize, size)).unwrap();
            }
        });

        let consumer = &heap;
        scope.spawn(move || {
            for (addr, size) in rx {
                unsafe {
                    assert_eq!(consumer.size_of(addr as *const u8), size + SizeHeader::PADDING);
                    check_and_free(consumer, addr, size, 0x5A);
                }
            }
        });
    });

    assert_eq!(heap.stats().live_blocks, 0);
}
