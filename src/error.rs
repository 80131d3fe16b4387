//! Error types for the heap
//!
//! Mapping failures surface as `MapError`; everything the lifecycle and
//! configuration layers can reject is a `HeapError`. The allocation hot path
//! never returns these directly: it reports failure with a `None`/null
//! sentinel and logs the underlying `MapError`.

use core::fmt;

/// Failure to obtain or adjust a mapped region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// The OS declined to reserve the address range
    Reservation { len: usize },
    /// The reservation succeeded but the payload could not be made read/write.
    /// The reservation has already been rolled back when this is returned.
    Protection { len: usize },
    /// The requested size plus guard pages does not fit in the address space
    Overflow { len: usize },
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reservation { len } => write!(f, "failed to reserve {} bytes", len),
            Self::Protection { len } => {
                write!(f, "failed to make {} bytes readable/writable", len)
            }
            Self::Overflow { len } => write!(f, "region of {} bytes overflows address space", len),
        }
    }
}

impl std::error::Error for MapError {}

/// Lifecycle and configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    /// `initialize` called on a lifecycle that already holds a heap
    AlreadyInitialized,
    /// Heap used before `initialize`
    NotInitialized,
    /// Heap used (or re-initialized) after `teardown`
    Destroyed,
    /// Configuration could not be read or is invalid
    Config(String),
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized => write!(f, "heap is already initialized"),
            Self::NotInitialized => write!(f, "heap has not been initialized"),
            Self::Destroyed => write!(f, "heap has been torn down"),
            Self::Config(msg) => write!(f, "invalid heap configuration: {}", msg),
        }
    }
}

impl std::error::Error for HeapError {}
