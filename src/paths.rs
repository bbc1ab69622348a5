//! Path resolution for swapbox
//!
//! The CLI and both worker binaries resolve locations through this module so
//! a lock taken by one process is visible to the others.
//!
//! ```text
//! <base>/
//! ├── data/
//! │ ├── config.toml
//! │ └── locks/<tag>.json
//! └── logs/
//! ```
//!
//! `<base>` is `$SWAPBOX_HOME` when set, otherwise `swapbox/` under the
//! platform data directory.

use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};

pub const ENV_HOME: &str = "SWAPBOX_HOME";

const APP_DIR: &str = "swapbox";

static BASE_DIRECTORY: Lazy<PathBuf> =
  Lazy::new(|| base_directory_from(std::env::var(ENV_HOME).ok().as_deref()));

fn base_directory_from(home_override: Option<&str>) -> PathBuf {
  if let Some(home) = home_override.map(str::trim).filter(|h| !h.is_empty()) {
    return PathBuf::from(home);
  }

  dirs::data_local_dir()
    .or_else(dirs::data_dir)
    .or_else(dirs::home_dir)
    .map(|dir| dir.join(APP_DIR))
    .unwrap_or_else(|| PathBuf::from(APP_DIR))
}

pub fn get_base_directory() -> PathBuf {
  BASE_DIRECTORY.clone()
}

/// Config file and lock directory live here
pub fn get_data_directory() -> PathBuf {
  BASE_DIRECTORY.join("data")
}

pub fn get_logs_directory() -> PathBuf {
  BASE_DIRECTORY.join("logs")
}

/// Default lock directory; `harness.lock_dir` overrides it
pub fn get_locks_directory() -> PathBuf {
  get_data_directory().join("locks")
}

pub fn get_config_path() -> PathBuf {
  get_data_directory().join("config.toml")
}

/// Create the data, logs and locks directories if missing
pub fn ensure_all_directories() -> Result<(), String> {
  [get_data_directory(), get_logs_directory(), get_locks_directory()]
    .iter()
    .try_for_each(|dir| ensure_directory(dir))
}

fn ensure_directory(dir: &Path) -> Result<(), String> {
  if dir.is_dir() {
    return Ok(());
  }
  std::fs::create_dir_all(dir)
    .map_err(|e| format!("Failed to create directory {}: {}", dir.display(), e))
}
