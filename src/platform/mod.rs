//! OS virtual-memory primitives
//!
//! The only place in the crate that talks to the kernel. Each function maps
//! 1:1 onto a syscall (or a short fixed sequence of them) so the unsafe
//! surface stays small enough to review in one sitting.
//!
//! All lengths passed in are expected to be multiples of `page_size()`.

use once_cell::sync::Lazy;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as imp;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as imp;

pub use imp::{
    annotate, can_release_part, map_read_write, protect_none, protect_read_write, release,
    reserve,
};

static PAGE_SIZE: Lazy<usize> = Lazy::new(imp::query_page_size);

/// OS page size (mapping and protection granularity)
#[inline]
pub fn page_size() -> usize {
    *PAGE_SIZE
}

/// Round `len` up to a whole number of pages, `None` on overflow
#[inline]
pub fn round_to_pages(len: usize) -> Option<usize> {
    let page = page_size();
    len.checked_add(page - 1).map(|n| n & !(page - 1))
}
