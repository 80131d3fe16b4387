//! Logging infrastructure - structured tracing for the heap
//!
//! Design: `tracing` events throughout, with:
//! - Configurable level via env or `LogConfig`
//! - Zero cost when disabled (allocation events sit at TRACE)
//! - Optional JSON output and file output through `tracing-appender`

use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

// Re-export tracing macros for use throughout the crate
pub use tracing::{debug, error, info, trace, warn};

/// Set once the global subscriber is installed. Holds the file writer guard
/// so buffered lines are flushed for the life of the process.
static LOGGER: OnceCell<Option<WorkerGuard>> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Log file path; console output when `None`
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // PCACHE_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("PCACHE_LOG_LEVEL") {
            config.level = parse_level(&level_str).unwrap_or(Level::INFO);
        }

        // PCACHE_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("PCACHE_LOG_FILE") {
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("PCACHE_LOG_JSON").is_ok();
        config.show_spans = std::env::var("PCACHE_LOG_SPANS").is_ok();

        config
    }

    /// Errors only; for hosts that call into the heap on every page fetch
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Every region and block event, written to a file
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            log_path: Some("pcache_heap.log".to_string()),
            json_format: false,
            show_spans: true,
        }
    }
}

fn parse_level(value: &str) -> Option<Level> {
    match value.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration. Only the first call has
/// an effect; a subscriber installed by the host beforehand is left alone.
pub fn init_with_config(config: LogConfig) {
    LOGGER.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "pcache_heap={}",
                config.level.as_str().to_lowercase()
            ))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let (writer, guard) = match config.log_path.as_deref().map(Path::new) {
            Some(path) => {
                let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
                let file = path.file_name().map(|f| f.to_os_string()).unwrap_or_default();
                let appender = tracing_appender::rolling::never(dir.unwrap_or(Path::new(".")), file);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                (fmt::writer::BoxMakeWriter::new(writer), Some(guard))
            }
            None => (fmt::writer::BoxMakeWriter::new(io::stderr), None),
        };

        let layer = fmt::layer()
            .with_writer(writer)
            .with_span_events(span_events)
            .with_target(true)
            .with_thread_ids(cfg!(debug_assertions))
            .with_line_number(cfg!(debug_assertions));

        let layer = if config.json_format {
            layer.json().boxed()
        } else {
            layer.compact().boxed()
        };

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init();

        guard
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER.get().is_some()
}

// ============================================================================
// Heap-specific logging functions
// ============================================================================

/// Log a region reservation
#[inline]
pub fn log_region_reserved(ptr: *const u8, payload: usize, guard: usize) {
    debug!(
        event = "region_reserved",
        address = ?ptr,
        payload_bytes = payload,
        guard_bytes = guard,
        "Region mapped"
    );
}

/// Log a region release
#[inline]
pub fn log_region_released(ptr: *const u8, payload: usize) {
    debug!(
        event = "region_released",
        address = ?ptr,
        payload_bytes = payload,
        "Region unmapped"
    );
}

/// Log a mapping failure
#[inline]
pub fn log_map_failure(error: &crate::error::MapError) {
    warn!(event = "map_failure", %error, "Region mapping failed");
}

/// Log block allocation
#[inline]
pub fn log_allocation(size: usize, ptr: *const u8) {
    trace!(
        event = "allocation",
        size_bytes = size,
        address = ?ptr,
        "Block allocated"
    );
}

/// Log block deallocation
#[inline]
pub fn log_deallocation(size: usize, ptr: *const u8) {
    trace!(
        event = "deallocation",
        size_bytes = size,
        address = ?ptr,
        "Block freed"
    );
}

/// Log a usage-contract violation
pub fn log_contract_violation(operation: &str, detail: &str) {
    error!(
        event = "contract_violation",
        operation,
        detail,
        "Heap used outside its contract"
    );
}
