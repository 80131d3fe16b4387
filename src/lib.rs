//! pcache-heap - guard-page heap for a database page cache
//!
//! Every region the heap maps is flanked by inaccessible guard pages, so
//! heap corruption faults at the offending instruction instead of surfacing
//! later as a corrupted page. Blocks carry a size header so the page cache
//! can ask how big a block is without arena introspection.
//!
//! Rust callers own a `HeapLifecycle`; C callers use the `pcache_*` functions
//! in `ffi`, which wrap one process-wide lifecycle.

pub mod allocator;
pub mod arena;
pub mod config;
pub mod error;
pub mod ffi;
pub mod lifecycle;
pub mod logging;
pub mod mapper;
pub mod platform;

// Re-export core types
pub use allocator::{Heap, SizeHeader};
pub use arena::{Arena, ArenaStats};
pub use config::{Backing, HeapConfig, LockStrategy};
pub use error::{HeapError, MapError};
pub use lifecycle::{HeapLifecycle, LifecycleState, TeardownReport};
pub use mapper::{MapperStats, RegionMapper};
