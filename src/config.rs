//! Heap configuration
//!
//! One explicit struct chosen at initialization time and threaded through the
//! mapper and arena. Loaded from defaults, environment variables or TOML.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::HeapError;

/// Where the arena gets its address space from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backing {
    /// Every region is flanked by one inaccessible page on each side
    Guarded,
    /// Pass-through mapping with no guard pages
    Plain,
}

impl Default for Backing {
    fn default() -> Self {
        Self::Guarded
    }
}

/// Lock protecting the arena bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStrategy {
    /// Busy-wait with backoff; critical sections are a handful of pointer updates
    Spin,
    /// `parking_lot` mutex, parks the thread under contention
    Parking,
}

impl Default for LockStrategy {
    fn default() -> Self {
        Self::Spin
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapConfig {
    #[serde(default)]
    pub backing: Backing,

    #[serde(default)]
    pub lock: LockStrategy,

    /// Label mapped regions so crash reports can attribute them (Linux/Android)
    #[serde(default = "default_true")]
    pub annotate_regions: bool,

    #[serde(default = "default_label")]
    pub region_label: String,
}

fn default_true() -> bool { true }
fn default_label() -> String { String::from("pcache-heap") }

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            backing: Backing::default(),
            lock: LockStrategy::default(),
            annotate_regions: true,
            region_label: default_label(),
        }
    }
}

impl HeapConfig {
    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // PCACHE_HEAP_BACKING: guarded, plain
        if let Ok(value) = std::env::var("PCACHE_HEAP_BACKING") {
            config.backing = match value.to_lowercase().as_str() {
                "plain" => Backing::Plain,
                _ => Backing::Guarded,
            };
        }

        // PCACHE_HEAP_LOCK: spin, parking
        if let Ok(value) = std::env::var("PCACHE_HEAP_LOCK") {
            config.lock = match value.to_lowercase().as_str() {
                "parking" => LockStrategy::Parking,
                _ => LockStrategy::Spin,
            };
        }

        if let Ok(value) = std::env::var("PCACHE_HEAP_ANNOTATE") {
            config.annotate_regions = value == "1" || value.to_lowercase() == "true";
        }

        if let Ok(label) = std::env::var("PCACHE_HEAP_LABEL") {
            if !label.is_empty() {
                config.region_label = label;
            }
        }

        config
    }

    /// Guard pages off, for measuring the cost of the guarded mapper
    pub fn plain() -> Self {
        Self {
            backing: Backing::Plain,
            ..Self::default()
        }
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, HeapError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| HeapError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, HeapError> {
        let content = fs::read_to_string(path)
            .map_err(|e| HeapError::Config(format!("failed to read {}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    pub fn to_toml(&self) -> Result<String, HeapError> {
        toml::to_string_pretty(self)
            .map_err(|e| HeapError::Config(format!("failed to serialize config: {}", e)))
    }

    /// Reject labels the OS annotation call cannot carry
    pub fn validate(&self) -> Result<(), HeapError> {
        if self.region_label.is_empty() {
            return Err(HeapError::Config("region_label must not be empty".into()));
        }
        if self.region_label.contains('\0') {
            return Err(HeapError::Config("region_label must not contain NUL".into()));
        }
        Ok(())
    }

    #[inline]
    pub fn guarded(&self) -> bool {
        self.backing == Backing::Guarded
    }
}
