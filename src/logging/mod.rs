//! Logging infrastructure - structured tracing across the boundary
//!
//! Design: `tracing` events with stable `event = "..."` fields so producer and
//! consumer activity can be filtered per call:
//! - Level and filter from `RUST_LOG` or `CROSSABI_LOG_*` variables
//! - Console output (human-readable or JSON) on stderr
//! - Optional file output through a non-blocking appender
//!
//! Nothing is emitted until [`init`] or [`init_with_config`] installs a
//! subscriber; until then every helper is a no-op.

use once_cell::sync::OnceCell;
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub use tracing::{debug, error, info, trace, warn, Level};

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level when `RUST_LOG` is unset
    pub level: Level,
    /// Also write to a file
    pub file_output: bool,
    /// File path for file output
    pub log_path: Option<PathBuf>,
    /// JSON lines instead of human-readable output
    pub json_format: bool,
    /// Emit span enter/close events
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

/// Parse `trace`/`debug`/`info`/`warn`/`error`, case-insensitive
pub fn parse_level(level: &str) -> Option<Level> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|val| val.is_empty() || val == "1" || val.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // CROSSABI_LOG_LEVEL: trace, debug, info, warn, error
        if let Some(level) = std::env::var("CROSSABI_LOG_LEVEL")
            .ok()
            .as_deref()
            .and_then(parse_level)
        {
            config.level = level;
        }

        // CROSSABI_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("CROSSABI_LOG_FILE") {
            config.file_output = true;
            config.log_path = Some(PathBuf::from(path));
        }

        config.json_format = env_flag("CROSSABI_LOG_JSON");
        config.show_spans = env_flag("CROSSABI_LOG_SPANS");

        config
    }

    /// Errors only
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Everything, including span events, mirrored to `crossabi.log`
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            file_output: true,
            log_path: Some(PathBuf::from("crossabi.log")),
            json_format: false,
            show_spans: true,
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Initialize logging from the environment
pub fn init() -> Option<WorkerGuard> {
    init_with_config(LogConfig::from_env())
}

/// Install the global subscriber once. Later calls do nothing.
///
/// When file output is enabled the returned guard flushes the file writer on
/// drop; keep it alive for as long as logs should be written.
pub fn init_with_config(config: LogConfig) -> Option<WorkerGuard> {
    let mut guard = None;
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("crossabi={}", config.level.as_str().to_lowercase()))
        });

        let console = fmt::layer()
            .with_writer(io::stderr)
            .with_span_events(config.span_events())
            .with_target(true)
            .with_line_number(cfg!(debug_assertions));
        let console = if config.json_format {
            console.json().boxed()
        } else {
            console.boxed()
        };

        let file = match (&config.log_path, config.file_output) {
            (Some(path), true) => {
                let directory = path
                    .parent()
                    .filter(|dir| !dir.as_os_str().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("."));
                let file_name = path
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("crossabi.log"));
                let appender = tracing_appender::rolling::never(directory, file_name);
                let (writer, file_guard) = tracing_appender::non_blocking(appender);
                guard = Some(file_guard);
                Some(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_span_events(config.span_events())
                        .json()
                        .boxed(),
                )
            }
            _ => None,
        };

        // Another subscriber may already be installed (embedding host, tests).
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(console)
            .with(file)
            .try_init();
    });
    guard
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Boundary events
// ============================================================================

/// Log an extern entry point being called
pub fn log_ffi_call(fn_name: &str, arg_count: usize) {
    debug!(
        event = "ffi_call",
        function = fn_name,
        args = arg_count,
        "FFI function called"
    );
}

/// Log an extern entry point returning normally
pub fn log_ffi_return(fn_name: &str) {
    trace!(event = "ffi_return", function = fn_name, "FFI function returned");
}

/// Log an extern entry point failing; the caller sees null or a status code
pub fn log_ffi_error(fn_name: &str, kind: &str, error: &str) {
    error!(
        event = "ffi_error",
        function = fn_name,
        kind = kind,
        error = error,
        "FFI function error"
    );
}

/// Log a raw block handed out by an allocation strategy
#[inline]
pub fn log_allocation(strategy: &str, size: usize, ptr: *const u8) {
    trace!(
        event = "allocation",
        strategy = strategy,
        size_bytes = size,
        address = ?ptr,
        "Memory allocated"
    );
}

/// Log a paired free call and how many envelopes it released
pub fn log_release(fn_name: &str, address: usize, envelopes: usize) {
    debug!(
        event = "release",
        function = fn_name,
        address = address,
        envelopes = envelopes,
        "Envelope tree released"
    );
}

/// Log library initialization
pub fn log_library_init(abi_version: u32) {
    info!(event = "init", abi_version = abi_version, "crossabi initialized");
}

/// Log library shutdown
pub fn log_library_shutdown() {
    info!(event = "shutdown", "crossabi shutting down");
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            debug!(
                operation = self.operation,
                duration_us = self.start.elapsed().as_micros() as u64,
                "operation completed"
            );
        }
    }
}
