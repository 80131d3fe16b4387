//! VirtualAlloc/VirtualFree backend

use core::ptr::{self, NonNull};
use std::ffi::CStr;

use winapi::um::memoryapi::{VirtualAlloc, VirtualFree};
use winapi::um::sysinfoapi::{GetSystemInfo, SYSTEM_INFO};
use winapi::um::winnt::{
    MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_NOACCESS, PAGE_READWRITE,
};

pub(super) fn query_page_size() -> usize {
    let mut info: SYSTEM_INFO = unsafe { core::mem::zeroed() };
    unsafe {
        GetSystemInfo(&mut info);
    }
    info.dwPageSize as usize
}

/// Reserve `len` bytes of address space with no access rights
pub fn reserve(len: usize) -> Option<NonNull<u8>> {
    let addr = unsafe { VirtualAlloc(ptr::null_mut(), len, MEM_RESERVE, PAGE_NOACCESS) };
    NonNull::new(addr.cast())
}

/// Reserve and commit `len` zeroed, readable/writable bytes
pub fn map_read_write(len: usize) -> Option<NonNull<u8>> {
    let addr = unsafe {
        VirtualAlloc(ptr::null_mut(), len, MEM_RESERVE | MEM_COMMIT, PAGE_READWRITE)
    };
    NonNull::new(addr.cast())
}

/// # Safety
/// `[ptr, ptr + len)` must lie inside a reservation owned by the caller.
pub unsafe fn protect_read_write(ptr: *mut u8, len: usize) -> bool {
    !VirtualAlloc(ptr.cast(), len, MEM_COMMIT, PAGE_READWRITE).is_null()
}

/// Decommitted pages fault on any access, same as PROT_NONE.
///
/// # Safety
/// `[ptr, ptr + len)` must lie inside a reservation owned by the caller and
/// nothing may still reference it.
pub unsafe fn protect_none(ptr: *mut u8, len: usize) -> bool {
    VirtualFree(ptr.cast(), len, MEM_DECOMMIT) != 0
}

/// Releases the whole reservation starting at `ptr`; `len` is implied.
///
/// # Safety
/// `ptr` must be the base address returned by `reserve`/`map_read_write`.
pub unsafe fn release(ptr: *mut u8, _len: usize) -> bool {
    VirtualFree(ptr.cast(), 0, MEM_RELEASE) != 0
}

/// A reservation can only be released as a whole
pub fn can_release_part() -> bool {
    false
}

pub fn annotate(_ptr: *mut u8, _len: usize, _label: &CStr) -> bool {
    false
}
