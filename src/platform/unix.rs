//! mmap/mprotect/munmap backend

use core::ptr::{self, NonNull};
use std::ffi::CStr;

pub(super) fn query_page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size < 1 {
        4096
    } else {
        size as usize
    }
}

fn map(len: usize, prot: libc::c_int) -> Option<NonNull<u8>> {
    let addr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            prot,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        None
    } else {
        NonNull::new(addr.cast())
    }
}

/// Reserve `len` bytes of address space with no access rights
pub fn reserve(len: usize) -> Option<NonNull<u8>> {
    map(len, libc::PROT_NONE)
}

/// Map `len` zeroed, readable/writable bytes
pub fn map_read_write(len: usize) -> Option<NonNull<u8>> {
    map(len, libc::PROT_READ | libc::PROT_WRITE)
}

/// # Safety
/// `[ptr, ptr + len)` must lie inside a mapping owned by the caller.
pub unsafe fn protect_read_write(ptr: *mut u8, len: usize) -> bool {
    libc::mprotect(ptr.cast(), len, libc::PROT_READ | libc::PROT_WRITE) == 0
}

/// # Safety
/// `[ptr, ptr + len)` must lie inside a mapping owned by the caller and
/// nothing may still reference it.
pub unsafe fn protect_none(ptr: *mut u8, len: usize) -> bool {
    libc::mprotect(ptr.cast(), len, libc::PROT_NONE) == 0
}

/// # Safety
/// `[ptr, ptr + len)` must be mapped by the caller and unreferenced.
pub unsafe fn release(ptr: *mut u8, len: usize) -> bool {
    libc::munmap(ptr.cast(), len) == 0
}

/// munmap accepts any page-aligned sub-range
pub fn can_release_part() -> bool {
    true
}

#[cfg(any(target_os = "linux", target_os = "android"))]
const PR_SET_VMA: libc::c_int = 0x5356_4d41;
#[cfg(any(target_os = "linux", target_os = "android"))]
const PR_SET_VMA_ANON_NAME: libc::c_ulong = 0;

/// Name an anonymous mapping so it shows up in /proc/<pid>/maps and tombstones.
/// Kernels without CONFIG_ANON_VMA_NAME reject the call; that is not an error.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn annotate(ptr: *mut u8, len: usize, label: &CStr) -> bool {
    unsafe {
        libc::prctl(
            PR_SET_VMA,
            PR_SET_VMA_ANON_NAME,
            ptr as libc::c_ulong,
            len as libc::c_ulong,
            label.as_ptr() as libc::c_ulong,
        ) == 0
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn annotate(_ptr: *mut u8, _len: usize, _label: &CStr) -> bool {
    false
}
