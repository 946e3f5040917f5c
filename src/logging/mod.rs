//! Logging infrastructure - structured tracing throughout the engine
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log level plus extra filter directives
//! - Zero-cost when disabled
//! - Span-based performance tracking
//! - Console or daily-rotated file output

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

pub use tracing::{debug, error, info, trace, warn};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Keeps the non-blocking writer flushing for the life of the process
static WRITER_GUARD: Mutex<Option<WorkerGuard>> = parking_lot::const_mutex(None);

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with timestamps
    Pretty,
    /// Compact format for production
    Compact,
    /// JSON format for structured logging
    Json,
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// File with daily rotation
    File { directory: String, prefix: String },
}

impl LogOutput {
    /// Daily-rotated file named after `path`
    pub fn file(path: impl AsRef<std::path::Path>) -> Self {
        let path = path.as_ref();
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string());
        let prefix = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dyninvoke.log".to_string());
        Self::File { directory, prefix }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Show span events (enter/exit)
    pub span_events: bool,
    /// Extra filter directives (e.g., "dyninvoke::invoke=trace")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // DYNINVOKE_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("DYNINVOKE_LOG_LEVEL") {
            config.level = parse_level(&level).unwrap_or(Level::INFO);
        }

        // DYNINVOKE_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("DYNINVOKE_LOG_FILE") {
            config.output = LogOutput::file(path);
        }

        if std::env::var("DYNINVOKE_LOG_JSON").is_ok() {
            config.format = LogFormat::Json;
        }

        config.span_events = std::env::var("DYNINVOKE_LOG_SPANS").is_ok();

        config
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Parse a level name, case-insensitive
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
///
/// Only the first call installs a subscriber. If the host already installed
/// its own global subscriber, that one is kept.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let (writer, guard) = match &config.output {
            LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
            LogOutput::File { directory, prefix } => {
                tracing_appender::non_blocking(rolling::daily(directory, prefix))
            }
        };

        let span_events = if config.span_events {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
            LogFormat::Pretty => fmt::layer()
                .with_writer(writer)
                .pretty()
                .with_span_events(span_events)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .with_writer(writer)
                .compact()
                .with_span_events(span_events)
                .with_target(true)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .with_writer(writer)
                .json()
                .with_span_events(span_events)
                .boxed(),
        };

        if tracing_subscriber::registry()
            .with(layer)
            .with(build_filter(&config))
            .try_init()
            .is_ok()
        {
            *WRITER_GUARD.lock() = Some(guard);
        }
    });
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dyninvoke={}", config.level.as_str().to_lowercase())));

    match &config.filter {
        Some(directives) => directives
            .split(',')
            .filter(|d| !d.trim().is_empty())
            .fold(base, |filter, directive| match directive.trim().parse() {
                Ok(directive) => filter.add_directive(directive),
                Err(_) => {
                    warn!("Invalid filter directive: {}", directive);
                    filter
                }
            }),
        None => base,
    }
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Engine-specific logging functions
// ============================================================================

/// Log native buffer allocation
#[inline]
pub fn log_allocation(size: usize, ptr: *const u8) {
    trace!(
        event = "allocation",
        size_bytes = size,
        address = ?ptr,
        "Native memory allocated"
    );
}

/// Log native buffer release
#[inline]
pub fn log_deallocation(ptr: *const u8) {
    trace!(
        event = "deallocation",
        address = ?ptr,
        "Native memory released"
    );
}

/// Log call plan compilation
pub fn log_plan_compiled(function: &str, in_count: usize, out_count: usize, slots: usize) {
    debug!(
        event = "plan_compiled",
        function = function,
        in_count = in_count,
        out_count = out_count,
        frame_slots = slots,
        "Call plan compiled"
    );
}

/// Log native function call
pub fn log_ffi_call(fn_name: &str, arg_count: usize) {
    debug!(
        event = "ffi_call",
        function = fn_name,
        args = arg_count,
        "Native function called"
    );
}

/// Log native function return
pub fn log_ffi_return(fn_name: &str) {
    trace!(
        event = "ffi_return",
        function = fn_name,
        "Native function returned"
    );
}

/// Log native call failure
pub fn log_ffi_error(fn_name: &str, error: &str) {
    warn!(
        event = "ffi_error",
        function = fn_name,
        error = error,
        "Native function call failed"
    );
}

/// Log callback creation and destruction
pub fn log_callback(event: &'static str, callback: &str, token: *const u8) {
    debug!(
        event = event,
        callback = callback,
        token = ?token,
        "Callback trampoline"
    );
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &str) -> PerformanceGuard {
        PerformanceGuard {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: String,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            let elapsed = self.start.elapsed();
            debug!(
                operation = %self.operation,
                duration_us = elapsed.as_micros() as u64,
                "operation completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = LogConfig::new()
            .with_level(Level::DEBUG)
            .with_format(LogFormat::Json)
            .with_span_events(true)
            .with_filter("dyninvoke::invoke=trace");
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.span_events);
        assert_eq!(config.filter.as_deref(), Some("dyninvoke::invoke=trace"));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("TRACE"), Some(Level::TRACE));
        assert_eq!(parse_level("warning"), Some(Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_file_output_split() {
        assert_eq!(
            LogOutput::file("/var/log/dyninvoke.log"),
            LogOutput::File { directory: "/var/log".into(), prefix: "dyninvoke.log".into() }
        );
        assert_eq!(
            LogOutput::file("calls.log"),
            LogOutput::File { directory: ".".into(), prefix: "calls.log".into() }
        );
    }

    #[test]
    fn test_init_idempotent() {
        init();
        init();
        assert!(is_initialized());
    }
}
