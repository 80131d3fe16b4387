//! Size header - the word in front of every block handed to a caller
//!
//! Layout:
//!
//! ```text
//! [ total size: usize | pad to 8 ][ payload ... ]
//! ^ raw block from the arena       ^ pointer the caller sees
//! ```
//!
//! `total` is the exact byte count requested from the arena, header included.
//! All offset arithmetic between the two pointers lives here.

use core::mem::size_of;
use core::ptr::NonNull;

/// Round up to a multiple of 8
#[inline(always)]
pub const fn round8(n: usize) -> usize {
    (n + 7) & !7
}

/// Namespace for the header arithmetic; never instantiated
pub enum SizeHeader {}

impl SizeHeader {
    /// Bytes between the raw block and the payload pointer
    pub const PADDING: usize = round8(size_of::<usize>());

    /// Arena request size for a payload of `requested` bytes
    #[inline]
    pub const fn total_for(requested: usize) -> Option<usize> {
        requested.checked_add(Self::PADDING)
    }

    /// Stamp `total` into a fresh raw block and return its payload pointer.
    ///
    /// # Safety
    /// `raw` must point to at least `total` writable bytes, aligned for `usize`,
    /// with `total >= PADDING`.
    #[inline]
    pub unsafe fn wrap(raw: NonNull<u8>, total: usize) -> NonNull<u8> {
        debug_assert!(total >= Self::PADDING);
        raw.as_ptr().cast::<usize>().write(total);
        NonNull::new_unchecked(raw.as_ptr().add(Self::PADDING))
    }

    /// Raw block for a payload pointer produced by `wrap`.
    ///
    /// # Safety
    /// `payload` must come from `wrap`.
    #[inline]
    pub unsafe fn unwrap(payload: NonNull<u8>) -> NonNull<u8> {
        NonNull::new_unchecked(payload.as_ptr().sub(Self::PADDING))
    }

    /// Total size stored for a payload pointer produced by `wrap`.
    ///
    /// # Safety
    /// `payload` must come from `wrap` and its block must still be live.
    #[inline]
    pub unsafe fn read(payload: NonNull<u8>) -> usize {
        Self::unwrap(payload).as_ptr().cast::<usize>().read()
    }
}
