//! C FFI - allocation surface for the host page cache
//!
//! Design: plain C functions over one process-wide `HeapLifecycle`:
//! 1. Lifecycle (`pcache_meminit`, `pcache_memdeinit`)
//! 2. Allocation (`pcache_malloc`, `pcache_malloc_zero`, `pcache_realloc`)
//! 3. Release and queries (`pcache_free`, `pcache_memsize`, `pcache_release_memory`)
//! 4. Error propagation via null pointers / zero
//!
//! Only init and deinit take the lifecycle lock. Init publishes the heap in
//! an atomic pointer and deinit withdraws it before tearing down, so an
//! allocation call is one acquire load. The host must not overlap any call
//! with init or deinit. Calls outside the init/deinit window abort in debug
//! builds and return the failure value in release builds.

use core::ffi::{c_int, c_void};
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::allocator::Heap;
use crate::config::HeapConfig;
use crate::error::HeapError;
use crate::lifecycle::HeapLifecycle;
use crate::logging::{self, log_contract_violation};

static LIFECYCLE: Lazy<Mutex<HeapLifecycle>> = Lazy::new(|| Mutex::new(HeapLifecycle::new()));

/// The live heap inside `LIFECYCLE`; null outside the init/deinit window
static HEAP: AtomicPtr<Heap> = AtomicPtr::new(ptr::null_mut());

fn violation(operation: &str, err: &HeapError) {
    log_contract_violation(operation, &err.to_string());
    debug_assert!(false, "{}: {}", operation, err);
}

#[cold]
fn outside_window(operation: &str) {
    let err = LIFECYCLE.lock().heap().err().unwrap_or(HeapError::NotInitialized);
    violation(operation, &err);
}

#[inline]
fn with_heap<R>(operation: &str, failure: R, f: impl FnOnce(&Heap) -> R) -> R {
    // Non-null only while the lifecycle owns the heap, which stays put
    // inside the static until deinit clears this pointer.
    match unsafe { HEAP.load(Ordering::Acquire).as_ref() } {
        Some(heap) => f(heap),
        None => {
            outside_window(operation);
            failure
        }
    }
}

/// Create the heap (called once before the page cache starts).
/// Configuration comes from `PCACHE_HEAP_*` environment variables.
#[no_mangle]
pub extern "C" fn pcache_meminit() {
    logging::init();
    let mut lifecycle = LIFECYCLE.lock();
    match lifecycle.initialize(HeapConfig::from_env()) {
        Ok(heap) => HEAP.store(heap as *const Heap as *mut Heap, Ordering::Release),
        Err(err) => violation("pcache_meminit", &err),
    }
}

/// Destroy the heap, unmapping every region (called once at shutdown)
#[no_mangle]
pub extern "C" fn pcache_memdeinit() {
    let mut lifecycle = LIFECYCLE.lock();
    HEAP.store(ptr::null_mut(), Ordering::Release);
    if let Err(err) = lifecycle.teardown() {
        violation("pcache_memdeinit", &err);
    }
}

/// Allocate `sz` bytes; null on failure
#[no_mangle]
pub extern "C" fn pcache_malloc(sz: usize) -> *mut c_void {
    with_heap("pcache_malloc", ptr::null_mut(), |heap| {
        heap.allocate(sz).map_or(ptr::null_mut(), |p| p.as_ptr().cast())
    })
}

/// Allocate `sz` zeroed bytes; null on failure
#[no_mangle]
pub extern "C" fn pcache_malloc_zero(sz: usize) -> *mut c_void {
    with_heap("pcache_malloc_zero", ptr::null_mut(), |heap| {
        heap.allocate_zeroed(sz).map_or(ptr::null_mut(), |p| p.as_ptr().cast())
    })
}

/// Free a block; null is a no-op
///
/// # Safety
/// A non-null `p` must come from `pcache_malloc*`/`pcache_realloc` and not
/// have been freed.
#[no_mangle]
pub unsafe extern "C" fn pcache_free(p: *mut c_void) {
    if p.is_null() {
        return;
    }
    with_heap("pcache_free", (), |heap| heap.free(p.cast()))
}

/// Resize a block; null on failure, in which case `p` is still live
///
/// # Safety
/// Same contract as `pcache_free`.
#[no_mangle]
pub unsafe extern "C" fn pcache_realloc(p: *mut c_void, sz: usize) -> *mut c_void {
    with_heap("pcache_realloc", ptr::null_mut(), |heap| {
        heap.reallocate(p.cast(), sz)
            .map_or(ptr::null_mut(), |p| p.as_ptr().cast())
    })
}

/// Bytes recorded for a block, header padding included; 0 for null.
/// Saturates at `INT_MAX`.
///
/// # Safety
/// A non-null `p` must be a live block from this heap.
#[no_mangle]
pub unsafe extern "C" fn pcache_memsize(p: *const c_void) -> c_int {
    if p.is_null() {
        return 0;
    }
    with_heap("pcache_memsize", 0, |heap| {
        c_int::try_from(heap.size_of(p.cast())).unwrap_or(c_int::MAX)
    })
}

/// Return unused arena memory to the OS; 1 if anything was released
#[no_mangle]
pub extern "C" fn pcache_release_memory() -> c_int {
    with_heap("pcache_release_memory", 0, |heap| c_int::from(heap.trim()))
}
