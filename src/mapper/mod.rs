//! Guarded region mapper - the arena's only source of address space
//!
//! Design: every region is laid out as
//!
//! ```text
//! [ guard page | payload (read/write, whole pages) | guard page ]
//!                ^ pointer handed out
//! ```
//!
//! Guards are mapped with no access rights and never change protection while
//! the region lives, so an overrun or underrun faults at the offending
//! instruction. The `Plain` backing uses the same code with a zero-width guard.

mod ledger;


pub use ledger::{Extent, RegionLedger};

use core::ptr::{self, NonNull};
use std::ffi::CString;
use std::sync::Arc;

use crate::config::HeapConfig;
use crate::error::{HeapError, MapError};
use crate::logging::{error, log_map_failure, log_region_released, log_region_reserved, warn};
use crate::platform;

/// NUL-terminated labels handed to the OS annotation call
struct RegionLabels {
    payload: CString,
    guard: CString,
}

/// Maps and unmaps guarded regions and keeps the ledger of what is live.
///
/// Cheap to clone: clones share the same ledger, which is how the arena keeps
/// a handle for teardown after moving the mapper into the arena algorithm.
#[derive(Clone)]
pub struct RegionMapper {
    page: usize,
    guard: usize,
    labels: Option<Arc<RegionLabels>>,
    ledger: Arc<RegionLedger>,
}

impl RegionMapper {
    pub fn new(config: &HeapConfig) -> Result<Self, HeapError> {
        config.validate()?;

        let labels = if config.annotate_regions {
            let payload = CString::new(config.region_label.as_str())
                .map_err(|e| HeapError::Config(e.to_string()))?;
            let guard = CString::new(format!("{} guard", config.region_label))
                .map_err(|e| HeapError::Config(e.to_string()))?;
            Some(Arc::new(RegionLabels { payload, guard }))
        } else {
            None
        };

        let page = platform::page_size();
        Ok(Self {
            page,
            guard: if config.guarded() { page } else { 0 },
            labels,
            ledger: Arc::new(RegionLedger::new()),
        })
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page
    }

    /// Width of each guard (0 for plain backing)
    #[inline]
    pub fn guard_size(&self) -> usize {
        self.guard
    }

    #[inline]
    pub fn is_guarded(&self) -> bool {
        self.guard != 0
    }

    /// Payload length actually mapped for a request of `size` bytes:
    /// whole pages, at least one.
    #[inline]
    pub fn payload_len(&self, size: usize) -> Option<usize> {
        platform::round_to_pages(size.max(1))
    }

    /// Map a region with at least `size` usable bytes.
    ///
    /// No partially set-up mapping survives an error: if the payload cannot
    /// be made read/write the whole reservation is released first.
    pub fn reserve(&self, size: usize) -> Result<NonNull<u8>, MapError> {
        self.reserve_extent(size).map(|(payload, _)| payload)
    }

    /// `reserve`, also returning the payload length actually mapped
    pub fn reserve_extent(&self, size: usize) -> Result<(NonNull<u8>, usize), MapError> {
        let payload_len = self.payload_len(size).ok_or(MapError::Overflow { len: size })?;
        let total = payload_len
            .checked_add(2 * self.guard)
            .ok_or(MapError::Overflow { len: size })?;

        let payload = if self.is_guarded() {
            let base = platform::reserve(total).ok_or(MapError::Reservation { len: total })?;
            unsafe {
                let payload = base.as_ptr().add(self.guard);
                if !platform::protect_read_write(payload, payload_len) {
                    platform::release(base.as_ptr(), total);
                    return Err(MapError::Protection { len: payload_len });
                }
                self.annotate(base.as_ptr(), total, payload, payload_len);
                NonNull::new_unchecked(payload)
            }
        } else {
            let payload =
                platform::map_read_write(total).ok_or(MapError::Reservation { len: total })?;
            self.annotate(ptr::null_mut(), 0, payload.as_ptr(), payload_len);
            payload
        };

        self.ledger.record(payload.as_ptr() as usize, payload_len);
        log_region_reserved(payload.as_ptr(), payload_len, self.guard);
        Ok((payload, payload_len))
    }

    fn annotate(&self, base: *mut u8, total: usize, payload: *mut u8, payload_len: usize) {
        if let Some(labels) = &self.labels {
            if !base.is_null() {
                platform::annotate(base, total, &labels.guard);
            }
            platform::annotate(payload, payload_len, &labels.payload);
        }
    }

    /// Unmap a region previously returned by `reserve`.
    ///
    /// # Safety
    /// `ptr` must come from `reserve` on this mapper (or a clone) with the same
    /// `size`, and nothing may reference the region afterwards.
    pub unsafe fn release(&self, ptr: NonNull<u8>, size: usize) -> bool {
        let Some(payload_len) = self.payload_len(size) else {
            return false;
        };
        let start = ptr.as_ptr() as usize;

        if self.is_guarded() {
            if let Err(recorded) = self.ledger.forget_exact(start, payload_len) {
                mismatch("release", start, payload_len, recorded);
                return false;
            }
            if !platform::release(ptr.as_ptr().sub(self.guard), payload_len + 2 * self.guard) {
                self.keep_unreleased(start, payload_len);
                return false;
            }
            log_region_released(ptr.as_ptr(), payload_len);
            return true;
        }

        // Plain regions can sit back to back, and the arena algorithm may
        // hand back several of them as one span.
        let pieces = self.ledger.forget_range(start, payload_len);
        let covered: usize = pieces.iter().map(|p| p.len).sum();
        if covered != payload_len {
            mismatch("release", start, payload_len, Some(covered));
        }
        let mut released = !pieces.is_empty();
        for piece in &pieces {
            if platform::release(piece.start as *mut u8, piece.len) {
                log_region_released(piece.start as *const u8, piece.len);
            } else {
                self.keep_unreleased(piece.start, piece.len);
                released = false;
            }
        }
        released
    }

    /// Put an extent the OS refused to unmap back in the ledger, so teardown
    /// retries it instead of leaking it.
    fn keep_unreleased(&self, start: usize, len: usize) {
        self.ledger.record(start, len);
        error!(
            event = "region_release_failed",
            address = start,
            len,
            "Region could not be unmapped; kept for teardown"
        );
    }

    /// Shrink a region in place to `new_size` bytes, moving the trailing guard
    /// down to sit directly after the new payload end.
    ///
    /// # Safety
    /// Same contract as `release`; bytes past `new_size` must be unreferenced.
    pub unsafe fn release_tail(&self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> bool {
        if !platform::can_release_part() || new_size == 0 {
            return false;
        }
        let (Some(old_len), Some(new_len)) =
            (self.payload_len(old_size), self.payload_len(new_size))
        else {
            return false;
        };
        if new_len >= old_len {
            return new_len == old_len;
        }

        let start = ptr.as_ptr() as usize;
        let new_end = ptr.as_ptr().add(new_len);

        if self.is_guarded() {
            let recorded = self.ledger.lookup(start);
            if recorded != Some(old_len) {
                mismatch("release_tail", start, old_len, recorded);
                return false;
            }
            // New guard first, so the payload never has an open edge
            if !platform::protect_none(new_end, self.guard) {
                return false;
            }
            // Everything past the new guard, including the old trailing guard
            if !platform::release(new_end.add(self.guard), old_len - new_len) {
                platform::protect_read_write(new_end, self.guard);
                return false;
            }
            self.ledger.resize(start, new_len);
        } else {
            if !platform::release(new_end, old_len - new_len) {
                return false;
            }
            self.ledger.forget_range(new_end as usize, old_len - new_len);
        }

        log_region_released(new_end, old_len - new_len);
        true
    }

    /// Resize a region to `new_size` bytes.
    ///
    /// Shrinks happen in place where the platform can release part of a
    /// mapping. Anything else needs `can_move`: a fresh guarded region is
    /// mapped, the payload copied across, and the old region released.
    ///
    /// # Safety
    /// Same contract as `release`. On success the old pointer is invalid
    /// unless it is the one returned.
    pub unsafe fn remap(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
        can_move: bool,
    ) -> Option<NonNull<u8>> {
        let old_len = self.payload_len(old_size)?;
        let new_len = self.payload_len(new_size)?;

        if new_len == old_len {
            return Some(ptr);
        }
        if new_len < old_len && self.release_tail(ptr, old_len, new_len) {
            return Some(ptr);
        }
        if !can_move {
            return None;
        }

        let fresh = match self.reserve(new_len) {
            Ok(fresh) => fresh,
            Err(err) => {
                log_map_failure(&err);
                return None;
            }
        };
        ptr::copy_nonoverlapping(ptr.as_ptr(), fresh.as_ptr(), old_len.min(new_len));
        if !self.release(ptr, old_len) {
            warn!(
                event = "remap_old_region_kept",
                address = ptr.as_ptr() as usize,
                len = old_len,
                "Old region still mapped after move"
            );
        }
        Some(fresh)
    }

    /// Unmap every region still in the ledger. Returns payload bytes released.
    ///
    /// # Safety
    /// Nothing may reference any region handed out by this mapper.
    pub unsafe fn release_all(&self) -> usize {
        let mut total = 0;
        for extent in self.ledger.drain() {
            let base = (extent.start as *mut u8).sub(self.guard);
            platform::release(base, extent.len + 2 * self.guard);
            log_region_released(extent.start as *const u8, extent.len);
            total += extent.len;
        }
        total
    }

    pub fn stats(&self) -> MapperStats {
        let regions = self.ledger.count();
        MapperStats {
            regions,
            payload_bytes: self.ledger.total_bytes(),
            guard_bytes: regions * 2 * self.guard,
        }
    }
}

fn mismatch(operation: &str, start: usize, len: usize, recorded: Option<usize>) {
    error!(
        event = "region_mismatch",
        operation,
        address = start,
        len,
        recorded = ?recorded,
        "Region size does not match the ledger"
    );
    debug_assert!(
        false,
        "{} size mismatch at {:#x}: got {} bytes, ledger has {:?}",
        operation, start, len, recorded
    );
}

/// Region counts for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapperStats {
    pub regions: usize,
    pub payload_bytes: usize,
    pub guard_bytes: usize,
}

impl MapperStats {
    pub fn mapped_bytes(&self) -> usize {
        self.payload_bytes + self.guard_bytes
    }
}

// The arena algorithm drives the mapper through these hooks only; it has no
// other way to grow, so every byte it hands out sits inside a guarded region.
unsafe impl dlmalloc::Allocator for RegionMapper {
    fn alloc(&self, size: usize) -> (*mut u8, usize, u32) {
        match self.reserve_extent(size) {
            Ok((ptr, len)) => (ptr.as_ptr(), len, 0),
            Err(err) => {
                log_map_failure(&err);
                (ptr::null_mut(), 0, 0)
            }
        }
    }

    fn remap(&self, ptr: *mut u8, oldsize: usize, newsize: usize, can_move: bool) -> *mut u8 {
        match NonNull::new(ptr) {
            Some(ptr) => unsafe { RegionMapper::remap(self, ptr, oldsize, newsize, can_move) }
                .map_or(ptr::null_mut(), NonNull::as_ptr),
            None => ptr::null_mut(),
        }
    }

    fn free_part(&self, ptr: *mut u8, oldsize: usize, newsize: usize) -> bool {
        NonNull::new(ptr).map_or(false, |ptr| unsafe { self.release_tail(ptr, oldsize, newsize) })
    }

    fn free(&self, ptr: *mut u8, size: usize) -> bool {
        NonNull::new(ptr).map_or(false, |ptr| unsafe { self.release(ptr, size) })
    }

    fn can_release_part(&self, _flags: u32) -> bool {
        platform::can_release_part()
    }

    fn allocates_zeros(&self) -> bool {
        true
    }

    fn page_size(&self) -> usize {
        self.page
    }
}
