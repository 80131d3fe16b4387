//! Heap - size-tracking allocation surface for the page cache
//!
//! Design: three layers, each only talking to the next:
//! 1. `Heap` (this module): prefixes every block with its size
//! 2. `Arena`: dlmalloc behind a spin lock
//! 3. `RegionMapper`: guarded OS regions
//!
//! Failure is reported with `None`; nothing on this path panics or retries.

mod header;


pub use header::{round8, SizeHeader};

use core::ptr::NonNull;

use crate::arena::{Arena, ArenaStats};
use crate::config::{HeapConfig, LockStrategy};
use crate::error::HeapError;
use crate::logging::{log_allocation, log_deallocation};

/// The allocation surface. One per lifecycle; shared by reference across threads.
pub struct Heap {
    arena: Arena,
    config: HeapConfig,
}

impl Heap {
    pub fn new(config: HeapConfig) -> Result<Self, HeapError> {
        let arena = Arena::new(&config)?;
        Ok(Self { arena, config })
    }

    /// Allocate `size` bytes. `None` when the OS refuses more address space.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let total = SizeHeader::total_for(size)?;
        let raw = self.arena.malloc(total)?;
        let payload = unsafe { SizeHeader::wrap(raw, total) };
        log_allocation(size, payload.as_ptr());
        Some(payload)
    }

    /// Allocate `size` zeroed bytes. The header overwrites the first
    /// `PADDING` zeroed bytes of the raw block; the payload stays zero.
    pub fn allocate_zeroed(&self, size: usize) -> Option<NonNull<u8>> {
        let total = SizeHeader::total_for(size)?;
        let raw = self.arena.calloc(total)?;
        let payload = unsafe { SizeHeader::wrap(raw, total) };
        log_allocation(size, payload.as_ptr());
        Some(payload)
    }

    /// Free a block. Null is accepted and ignored.
    ///
    /// # Safety
    /// A non-null `ptr` must come from this heap and not have been freed.
    pub unsafe fn free(&self, ptr: *mut u8) {
        let Some(payload) = NonNull::new(ptr) else {
            return;
        };
        let total = SizeHeader::read(payload);
        log_deallocation(total, ptr);
        self.arena.free(SizeHeader::unwrap(payload), total);
    }

    /// Size recorded for a block, header padding included (`requested + PADDING`).
    /// 0 for null.
    ///
    /// # Safety
    /// A non-null `ptr` must be a live block from this heap.
    pub unsafe fn size_of(&self, ptr: *const u8) -> usize {
        NonNull::new(ptr as *mut u8).map_or(0, |payload| SizeHeader::read(payload))
    }

    /// Size the caller originally asked for. 0 for null.
    ///
    /// # Safety
    /// Same contract as `size_of`.
    pub unsafe fn requested_size(&self, ptr: *const u8) -> usize {
        self.size_of(ptr).saturating_sub(SizeHeader::PADDING)
    }

    /// Resize a block, keeping the first `min(old, new)` payload bytes.
    /// Null behaves like `allocate`. On `None` the old block is still live.
    ///
    /// # Safety
    /// Same contract as `free`.
    pub unsafe fn reallocate(&self, ptr: *mut u8, new_size: usize) -> Option<NonNull<u8>> {
        let Some(payload) = NonNull::new(ptr) else {
            return self.allocate(new_size);
        };
        let old_total = SizeHeader::read(payload);
        let new_total = SizeHeader::total_for(new_size)?;
        let raw = self.arena.realloc(SizeHeader::unwrap(payload), old_total, new_total)?;
        let payload = SizeHeader::wrap(raw, new_total);
        log_allocation(new_size, payload.as_ptr());
        Some(payload)
    }

    /// Give unused arena memory back to the OS
    pub fn trim(&self) -> bool {
        self.arena.trim()
    }

    pub fn stats(&self) -> ArenaStats {
        self.arena.stats()
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    pub fn lock_strategy(&self) -> LockStrategy {
        self.arena.lock_strategy()
    }

    pub fn page_size(&self) -> usize {
        self.arena.mapper().page_size()
    }
}
