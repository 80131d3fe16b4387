//! Arena - one allocation space over guarded regions
//!
//! Design: the free-list/binning algorithm is dlmalloc, configured with
//! `RegionMapper` as its only system allocator. It never falls back to
//! brk/sbrk or the process allocator, so every block it hands out lives in a
//! region the mapper placed between guard pages.
//!
//! Every entry point holds the arena lock for the whole bookkeeping update.

mod lock;

#[cfg(test)]
mod tests;

pub use lock::{ArenaLock, RawSpinLock, SpinMutex};

use core::ptr::NonNull;
use dlmalloc::Dlmalloc;

use crate::config::{HeapConfig, LockStrategy};
use crate::error::HeapError;
use crate::logging::{debug, info};
use crate::mapper::{MapperStats, RegionMapper};

/// Alignment requested from the arena for every block
pub const BLOCK_ALIGN: usize = 8;

/// Everything the lock protects
struct ArenaState {
    dl: Dlmalloc<RegionMapper>,
    live_blocks: usize,
    live_bytes: usize,
}

// Safety: the raw pointers inside dlmalloc are only touched with the arena lock held
unsafe impl Send for ArenaState {}

pub struct Arena {
    state: ArenaLock<ArenaState>,
    /// Shares the ledger with the copy inside dlmalloc; used for stats and teardown
    mapper: RegionMapper,
}

impl Arena {
    pub fn new(config: &HeapConfig) -> Result<Self, HeapError> {
        let mapper = RegionMapper::new(config)?;
        let state = ArenaState {
            dl: Dlmalloc::new_with_allocator(mapper.clone()),
            live_blocks: 0,
            live_bytes: 0,
        };

        info!(
            backing = ?config.backing,
            lock = ?config.lock,
            page_size = mapper.page_size(),
            "Arena created"
        );

        Ok(Self {
            state: ArenaLock::new(config.lock, state),
            mapper,
        })
    }

    /// Allocate `size` bytes aligned to `BLOCK_ALIGN`
    pub fn malloc(&self, size: usize) -> Option<NonNull<u8>> {
        self.state.with(|state| {
            let ptr = NonNull::new(unsafe { state.dl.malloc(size, BLOCK_ALIGN) })?;
            state.live_blocks += 1;
            state.live_bytes += size;
            Some(ptr)
        })
    }

    /// Allocate `size` zeroed bytes aligned to `BLOCK_ALIGN`
    pub fn calloc(&self, size: usize) -> Option<NonNull<u8>> {
        self.state.with(|state| {
            let ptr = NonNull::new(unsafe { state.dl.calloc(size, BLOCK_ALIGN) })?;
            state.live_blocks += 1;
            state.live_bytes += size;
            Some(ptr)
        })
    }

    /// # Safety
    /// `ptr` must be a live block from this arena allocated with exactly `size` bytes.
    pub unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        self.state.with(|state| {
            state.dl.free(ptr.as_ptr(), size, BLOCK_ALIGN);
            state.live_blocks -= 1;
            state.live_bytes -= size;
        })
    }

    /// Resize a block, moving it if needed. On failure the old block is untouched.
    ///
    /// # Safety
    /// Same contract as `free`.
    pub unsafe fn realloc(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        self.state.with(|state| {
            let fresh = NonNull::new(state.dl.realloc(ptr.as_ptr(), old_size, BLOCK_ALIGN, new_size))?;
            state.live_bytes = state.live_bytes - old_size + new_size;
            Some(fresh)
        })
    }

    /// Return unused top-of-arena memory to the OS
    pub fn trim(&self) -> bool {
        let released = self.state.with(|state| unsafe { state.dl.trim(0) });
        debug!(released, "Arena trimmed");
        released
    }

    pub fn lock_strategy(&self) -> LockStrategy {
        self.state.strategy()
    }

    pub fn mapper(&self) -> &RegionMapper {
        &self.mapper
    }

    pub fn stats(&self) -> ArenaStats {
        self.state.with(|state| ArenaStats {
            regions: self.mapper.stats(),
            live_blocks: state.live_blocks,
            live_bytes: state.live_bytes,
        })
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // dlmalloc has no destructor of its own; the ledger knows every region
        // it still holds.
        let released = unsafe { self.mapper.release_all() };
        info!(released_bytes = released, "Arena destroyed");
    }
}

/// Arena statistics for monitoring and debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    pub regions: MapperStats,
    pub live_blocks: usize,
    /// Sum of the sizes passed to the arena for live blocks
    pub live_bytes: usize,
}
