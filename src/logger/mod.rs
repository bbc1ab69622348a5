//! Structured logging system for swapbox
//!
//! This module provides a small, ergonomic logging API with:
//! - Standard log levels (Error/Warning/Info/Debug/Verbose)
//! - Per-subsystem debug control via --debug-<tag> flags
//! - Dual output: colored console + optional file persistence
//!
//! ## Usage
//!
//! ```rust
//! use swapbox::logger::{self, LogTag};
//!
//! logger::error(LogTag::Rpc, "sendTransaction rejected");
//! logger::warning(LogTag::Retry, "Attempt 1/3 failed, retrying in 200ms");
//! logger::info(LogTag::Swap, "Swap submitted");
//! logger::debug(LogTag::Quote, "Raw quote: ..."); // Only if --debug-quote
//! ```
//!
//! Worker processes call [`init_for_worker`] instead of [`init`] so that
//! console output goes to stderr and never corrupts the IPC channel on stdout.

mod config;
mod core;
mod file;
mod format;
mod levels;
mod tags;

pub use config::{
    enable_debug_all, get_logger_config, set_logger_config, update_logger_config, ConsoleTarget,
    LoggerConfig,
};
pub use levels::LogLevel;

#[cfg(test)]
pub(crate) use format::capture;
pub use tags::LogTag;

/// Initialize the logger for an interactive process (console on stdout)
pub fn init() {
    config::init_from_args();
    file::init_file_logging();
}

/// Initialize the logger inside a worker process (console on stderr)
pub fn init_for_worker() {
    config::init_from_args();
    update_logger_config(|config| config.console = ConsoleTarget::Stderr);
    file::init_file_logging();
}

/// Log at ERROR level (always shown, critical issues)
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level (important issues)
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level (standard operations)
pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level (detailed diagnostics)
///
/// Only shown when debug is enabled for the tag (`--debug-<tag>`, `--debug`,
/// or a `debugLogging` swap payload).
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level (very detailed tracing, `--verbose` only)
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}

/// Log at an explicit level
pub fn log(tag: LogTag, level: LogLevel, message: &str) {
    core::log_internal(tag, level, message);
}

/// Force flush pending file writes (call before process exit)
pub fn flush() {
    file::flush_file_logging();
}
