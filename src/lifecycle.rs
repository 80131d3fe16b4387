//! Lifecycle - the one window in which the heap may be used
//!
//! `Uninitialized -> Initialized -> Destroyed`, never backwards. The heap
//! only exists inside `Initialized`, so any use outside the window is an
//! error value rather than a stray pointer into unmapped memory.

use crate::allocator::Heap;
use crate::config::HeapConfig;
use crate::error::HeapError;
use crate::logging::{info, log_contract_violation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Destroyed,
}

/// Owns the single heap and enforces its create-once/destroy-once window
pub struct HeapLifecycle {
    state: LifecycleState,
    heap: Option<Heap>,
}

/// What teardown gave back to the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    pub regions: usize,
    pub mapped_bytes: usize,
    /// Blocks the host never freed; their memory goes with the regions
    pub leaked_blocks: usize,
}

impl HeapLifecycle {
    pub const fn new() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            heap: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Create the heap. Valid only from `Uninitialized`.
    pub fn initialize(&mut self, config: HeapConfig) -> Result<&Heap, HeapError> {
        match self.state {
            LifecycleState::Uninitialized => {}
            LifecycleState::Initialized => {
                log_contract_violation("initialize", "heap already initialized");
                return Err(HeapError::AlreadyInitialized);
            }
            LifecycleState::Destroyed => {
                log_contract_violation("initialize", "heap already torn down");
                return Err(HeapError::Destroyed);
            }
        }

        let heap = Heap::new(config)?;
        info!(event = "heap_init", guarded = heap.config().guarded(), "Heap initialized");

        self.state = LifecycleState::Initialized;
        Ok(self.heap.insert(heap))
    }

    /// The live heap. Errors outside `Initialized`.
    #[inline]
    pub fn heap(&self) -> Result<&Heap, HeapError> {
        match (&self.heap, self.state) {
            (Some(heap), LifecycleState::Initialized) => Ok(heap),
            (_, LifecycleState::Destroyed) => Err(HeapError::Destroyed),
            _ => Err(HeapError::NotInitialized),
        }
    }

    /// Destroy the heap, unmapping every region it still holds.
    /// Valid only from `Initialized`.
    pub fn teardown(&mut self) -> Result<TeardownReport, HeapError> {
        let heap = match (self.heap.take(), self.state) {
            (Some(heap), LifecycleState::Initialized) => heap,
            (_, LifecycleState::Destroyed) => {
                log_contract_violation("teardown", "heap already torn down");
                return Err(HeapError::Destroyed);
            }
            _ => {
                log_contract_violation("teardown", "heap never initialized");
                return Err(HeapError::NotInitialized);
            }
        };

        let stats = heap.stats();
        drop(heap);
        self.state = LifecycleState::Destroyed;

        let report = TeardownReport {
            regions: stats.regions.regions,
            mapped_bytes: stats.regions.mapped_bytes(),
            leaked_blocks: stats.live_blocks,
        };
        info!(
            event = "heap_teardown",
            regions = report.regions,
            mapped_bytes = report.mapped_bytes,
            leaked_blocks = report.leaked_blocks,
            "Heap torn down"
        );
        Ok(report)
    }
}

impl Default for HeapLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uninitialized_and_refuses_use() {
        let lifecycle = HeapLifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);
        assert_eq!(lifecycle.heap().err(), Some(HeapError::NotInitialized));
    }

    #[test]
    fn full_lifecycle() {
        let mut lifecycle = HeapLifecycle::new();
        let heap = lifecycle.initialize(HeapConfig::default()).unwrap();
        let ptr = heap.allocate(64).unwrap();
        unsafe { heap.free(ptr.as_ptr()) };

        assert_eq!(lifecycle.state(), LifecycleState::Initialized);
        assert!(lifecycle.heap().is_ok());

        let report = lifecycle.teardown().unwrap();
        assert_eq!(report.leaked_blocks, 0);
        assert_eq!(lifecycle.state(), LifecycleState::Destroyed);
        assert_eq!(lifecycle.heap().err(), Some(HeapError::Destroyed));
    }

    #[test]
    fn double_initialize_is_rejected() {
        let mut lifecycle = HeapLifecycle::new();
        lifecycle.initialize(HeapConfig::default()).unwrap();
        assert_eq!(
            lifecycle.initialize(HeapConfig::default()).err(),
            Some(HeapError::AlreadyInitialized)
        );
        // The first heap is still usable
        assert!(lifecycle.heap().unwrap().allocate(8).is_some());
    }

    #[test]
    fn no_transition_back_after_teardown() {
        let mut lifecycle = HeapLifecycle::new();
        lifecycle.initialize(HeapConfig::default()).unwrap();
        lifecycle.teardown().unwrap();

        assert_eq!(lifecycle.teardown().err(), Some(HeapError::Destroyed));
        assert_eq!(
            lifecycle.initialize(HeapConfig::default()).err(),
            Some(HeapError::Destroyed)
        );
    }

    #[test]
    fn teardown_before_initialize_is_rejected() {
        let mut lifecycle = HeapLifecycle::new();
        assert_eq!(lifecycle.teardown().err(), Some(HeapError::NotInitialized));
        assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);
    }

    #[test]
    fn teardown_reports_and_releases_leaked_blocks() {
        let mut lifecycle = HeapLifecycle::new();
        let heap = lifecycle.initialize(HeapConfig::default()).unwrap();
        for size in [10, 1000, 100_000, 1_000_000] {
            heap.allocate(size).unwrap();
        }

        let report = lifecycle.teardown().unwrap();
        assert_eq!(report.leaked_blocks, 4);
        assert!(report.regions >= 1);
        assert!(report.mapped_bytes > 1_000_000);
    }

    #[test]
    fn failed_initialize_stays_uninitialized() {
        let mut lifecycle = HeapLifecycle::new();
        let config = HeapConfig {
            region_label: "bad\0label".into(),
            ..HeapConfig::default()
        };
        assert!(matches!(lifecycle.initialize(config), Err(HeapError::Config(_))));
        assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);
        assert!(lifecycle.initialize(HeapConfig::default()).is_ok());
    }
}
