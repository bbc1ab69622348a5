/// Configuration utilities - loading and environment overlay
///
/// Each process builds its `Config` once at its composition root and passes it
/// down by reference:
/// - `Config::load()` reads TOML (`SWAPBOX_CONFIG` or `<data dir>/config.toml`)
/// - environment variables are overlaid on top of the file values
/// - `Config::child_env()` exports the subset a worker process needs
use super::schemas::Config;
use crate::errors::{BotError, BotResult};
use crate::logger::{self, LogTag};
use crate::paths;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "SWAPBOX_CONFIG";
pub const ENV_RPC_URL: &str = "SWAPBOX_RPC_URL";
pub const ENV_JITO_URL: &str = "SWAPBOX_JITO_URL";
pub const ENV_QUOTE_URL: &str = "SWAPBOX_QUOTE_URL";
pub const ENV_RAPTOR_URL: &str = "SWAPBOX_RAPTOR_URL";
pub const ENV_QUOTE_API_KEY: &str = "SWAPBOX_QUOTE_API_KEY";
pub const ENV_EXECUTOR: &str = "SWAPBOX_EXECUTOR";
pub const ENV_SWAP_WORKER: &str = "SWAPBOX_SWAP_WORKER";
pub const ENV_MONITOR_WORKER: &str = "SWAPBOX_MONITOR_WORKER";
pub const ENV_LOCK_DIR: &str = "SWAPBOX_LOCK_DIR";
pub const ENV_HUD: &str = "SWAPBOX_HUD";
pub const ENV_TEST_LOG: &str = "SWAPBOX_TEST_LOG";
pub const ENV_WALLET_IDS: &str = "SWAPBOX_WALLET_IDS";
/// Prefix for per-alias wallet secrets (`SWAPBOX_WALLET_MAIN=...`)
pub const ENV_WALLET_PREFIX: &str = "SWAPBOX_WALLET_";

impl Config {
    /// Load configuration from the default location and apply env overrides
    pub fn load() -> BotResult<Config> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(paths::get_config_path);

        let mut config = Config::load_from_path(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific TOML file
    ///
    /// A missing file is not an error: defaults are used.
    pub fn load_from_path(path: &Path) -> BotResult<Config> {
        if !path.exists() {
            logger::debug(
                LogTag::Config,
                &format!("Config file '{}' not found, using default values", path.display()),
            );
            return Ok(Config::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            BotError::config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        toml::from_str::<Config>(&contents).map_err(|e| {
            BotError::config(format!("Failed to parse config file '{}': {}", path.display(), e))
        })
    }

    /// Overlay environment values onto the loaded configuration
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_RPC_URL) {
            self.rpc.url = v;
        }
        if let Some(v) = get(ENV_JITO_URL) {
            self.rpc.jito_url = v;
        }
        if let Some(v) = get(ENV_QUOTE_URL) {
            self.quotes.v3_base_url = v;
        }
        if let Some(v) = get(ENV_RAPTOR_URL) {
            self.quotes.raptor_base_url = v;
        }
        if let Some(v) = get(ENV_QUOTE_API_KEY) {
            self.quotes.api_key = v;
        }
        if let Some(v) = get(ENV_EXECUTOR) {
            self.swaps.executor = v.trim().to_lowercase();
        }
        if let Some(v) = get(ENV_SWAP_WORKER) {
            self.workers.swap_worker = v;
        }
        if let Some(v) = get(ENV_MONITOR_WORKER) {
            self.workers.monitor_worker = v;
        }
        if let Some(v) = get(ENV_LOCK_DIR) {
            self.harness.lock_dir = v;
        }
        if let Some(v) = get(ENV_HUD) {
            if is_truthy(&v) {
                self.swaps.interactive = true;
            }
        }
    }

    /// Environment exported to worker processes
    ///
    /// Workers receive the parent environment plus this overlay, so values
    /// that came from a config file still reach them.
    pub fn child_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert(ENV_RPC_URL.to_string(), self.rpc.url.clone());
        env.insert(ENV_JITO_URL.to_string(), self.rpc.jito_url.clone());
        env.insert(ENV_QUOTE_URL.to_string(), self.quotes.v3_base_url.clone());
        env.insert(ENV_RAPTOR_URL.to_string(), self.quotes.raptor_base_url.clone());
        if !self.quotes.api_key.is_empty() {
            env.insert(ENV_QUOTE_API_KEY.to_string(), self.quotes.api_key.clone());
        }
        env.insert(ENV_EXECUTOR.to_string(), self.swaps.executor.clone());
        if !self.workers.monitor_worker.is_empty() {
            env.insert(ENV_MONITOR_WORKER.to_string(), self.workers.monitor_worker.clone());
        }
        if !self.harness.lock_dir.is_empty() {
            env.insert(ENV_LOCK_DIR.to_string(), self.harness.lock_dir.clone());
        }
        if self.swaps.interactive {
            env.insert(ENV_HUD.to_string(), "1".to_string());
        }
        if let Ok(path) = std::env::var(ENV_TEST_LOG) {
            env.insert(ENV_TEST_LOG.to_string(), path);
        }

        let mut ids: Vec<&str> = self.wallets.aliases.keys().map(|k| k.as_str()).collect();
        ids.sort_unstable();
        env.insert(ENV_WALLET_IDS.to_string(), ids.join(","));

        env
    }

    /// Lock directory, falling back to `<data dir>/locks`
    pub fn lock_dir(&self) -> PathBuf {
        if self.harness.lock_dir.trim().is_empty() {
            paths::get_locks_directory()
        } else {
            PathBuf::from(&self.harness.lock_dir)
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
