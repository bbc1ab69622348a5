/// Logger configuration and per-tag debug control
use super::levels::LogLevel;
use super::tags::LogTag;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::PathBuf;

/// Where console output goes
///
/// Worker processes must use `Stderr`: their stdout is the IPC channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleTarget {
    Stdout,
    Stderr,
    Off,
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Minimum level shown (Error is always shown)
    pub min_level: LogLevel,
    /// Tags with debug output enabled
    pub debug_tags: HashSet<String>,
    /// Enables debug output for every tag
    pub debug_all: bool,
    /// Restricts non-error output to these tags (empty = all tags)
    pub enabled_tags: HashSet<String>,
    pub console: ConsoleTarget,
    /// Plain-text copy of every emitted line
    pub file_path: Option<PathBuf>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_tags: HashSet::new(),
            debug_all: false,
            enabled_tags: HashSet::new(),
            console: ConsoleTarget::Stdout,
            file_path: None,
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> =
    Lazy::new(|| RwLock::new(LoggerConfig::default()));

pub fn get_logger_config() -> LoggerConfig {
    LOGGER_CONFIG.read().clone()
}

pub fn set_logger_config(config: LoggerConfig) {
    *LOGGER_CONFIG.write() = config;
}

pub fn update_logger_config<F>(update: F)
where
    F: FnOnce(&mut LoggerConfig),
{
    let mut config = LOGGER_CONFIG.write();
    update(&mut config);
}

/// Build configuration from command-line flags and environment
///
/// Recognized flags: `--debug` (all tags), `--debug-<tag>`, `--verbose`, `--quiet`.
/// `SWAPBOX_LOG_LEVEL` sets the minimum level, `SWAPBOX_TEST_LOG` the file copy.
pub fn init_from_args() {
    let args: Vec<String> = std::env::args().collect();
    update_logger_config(|config| apply_args(config, &args));

    if let Ok(level) = std::env::var("SWAPBOX_LOG_LEVEL") {
        if let Ok(level) = level.parse::<LogLevel>() {
            update_logger_config(|config| config.min_level = level);
        }
    }

    if let Ok(path) = std::env::var("SWAPBOX_TEST_LOG") {
        if !path.trim().is_empty() {
            update_logger_config(|config| config.file_path = Some(PathBuf::from(path)));
        }
    }
}

fn apply_args(config: &mut LoggerConfig, args: &[String]) {
    for arg in args {
        match arg.as_str() {
            "--debug" => {
                config.debug_all = true;
                if config.min_level < LogLevel::Debug {
                    config.min_level = LogLevel::Debug;
                }
            }
            "--verbose" | "-v" => config.min_level = LogLevel::Verbose,
            "--quiet" | "-q" => config.min_level = LogLevel::Warning,
            other => {
                if let Some(key) = other.strip_prefix("--debug-") {
                    config.debug_tags.insert(key.to_lowercase());
                    if config.min_level < LogLevel::Debug {
                        config.min_level = LogLevel::Debug;
                    }
                }
            }
        }
    }
}

/// Turns on debug output for every tag (used by `debugLogging` payloads)
pub fn enable_debug_all() {
    update_logger_config(|config| {
        config.debug_all = true;
        if config.min_level < LogLevel::Debug {
            config.min_level = LogLevel::Debug;
        }
    });
}

pub fn is_debug_enabled_for_tag(tag: &LogTag) -> bool {
    let config = LOGGER_CONFIG.read();
    config.debug_all || config.debug_tags.contains(&tag.to_debug_key())
}
