/// Named worker executables
///
/// Workers are addressed by name (`swap`, `monitor`) and resolved to an
/// executable at startup: an explicit path from configuration, or a binary of
/// the same package installed next to the current executable.
use crate::config::WorkersConfig;
use crate::errors::{BotError, BotResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const SWAP_WORKER: &str = "swap";
pub const MONITOR_WORKER: &str = "monitor";

const SWAP_WORKER_BIN: &str = "swap_worker";
const MONITOR_WORKER_BIN: &str = "tx_monitor_worker";

/// How to launch one worker process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(name: &str, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, WorkerCommand>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the swap and monitor workers
    pub fn from_config(config: &WorkersConfig) -> BotResult<Self> {
        let mut registry = Self::new();
        registry.register(WorkerCommand::new(
            SWAP_WORKER,
            resolve_program(&config.swap_worker, SWAP_WORKER_BIN)?,
        ));
        registry.register(WorkerCommand::new(
            MONITOR_WORKER,
            resolve_program(&config.monitor_worker, MONITOR_WORKER_BIN)?,
        ));
        Ok(registry)
    }

    pub fn register(&mut self, command: WorkerCommand) {
        self.workers.insert(command.name.clone(), command);
    }

    pub fn get(&self, name: &str) -> BotResult<&WorkerCommand> {
        self.workers
            .get(name)
            .ok_or_else(|| BotError::config(format!("unknown worker '{}'", name)))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.workers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn resolve_program(configured: &str, default_bin: &str) -> BotResult<PathBuf> {
    if !configured.trim().is_empty() {
        return Ok(PathBuf::from(configured.trim()));
    }
    sibling_executable(default_bin)
}

/// Path of a binary installed next to the current executable
///
/// Test executables live in `target/<profile>/deps`; their sibling binaries are
/// one level up, which is checked when the direct sibling does not exist.
pub fn sibling_executable(bin: &str) -> BotResult<PathBuf> {
    let exe = std::env::current_exe()
        .map_err(|e| BotError::config(format!("cannot locate current executable: {}", e)))?;
    let dir = exe
        .parent()
        .ok_or_else(|| BotError::config("current executable has no parent directory"))?;
    Ok(sibling_in(dir, bin))
}

fn sibling_in(dir: &Path, bin: &str) -> PathBuf {
    let file = format!("{}{}", bin, std::env::consts::EXE_SUFFIX);
    let direct = dir.join(&file);
    if direct.exists() {
        return direct;
    }
    if dir.file_name().map(|n| n == "deps").unwrap_or(false) {
        if let Some(parent) = dir.parent() {
            let candidate = parent.join(&file);
            if candidate.exists() {
                return candidate;
            }
        }
    }
    direct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_paths_win() {
        let config = WorkersConfig {
            swap_worker: "/opt/swapbox/swap_worker".to_string(),
            monitor_worker: " /opt/swapbox/monitor ".to_string(),
        };
        let registry = WorkerRegistry::from_config(&config).unwrap();

        assert_eq!(
            registry.get(SWAP_WORKER).unwrap().program,
            PathBuf::from("/opt/swapbox/swap_worker")
        );
        assert_eq!(
            registry.get(MONITOR_WORKER).unwrap().program,
            PathBuf::from("/opt/swapbox/monitor")
        );
        assert_eq!(registry.names(), vec!["monitor", "swap"]);
    }

    #[test]
    fn test_unknown_worker() {
        let registry = WorkerRegistry::new();
        assert!(matches!(registry.get("nope"), Err(BotError::Config(_))));
    }

    #[test]
    fn test_sibling_lookup_from_deps_dir() {
        let root = tempfile::tempdir().unwrap();
        let deps = root.path().join("deps");
        std::fs::create_dir_all(&deps).unwrap();
        let file = format!("swap_worker{}", std::env::consts::EXE_SUFFIX);
        std::fs::write(root.path().join(&file), b"").unwrap();

        assert_eq!(sibling_in(&deps, "swap_worker"), root.path().join(&file));
        assert_eq!(sibling_in(root.path(), "other"), root.path().join(format!("other{}", std::env::consts::EXE_SUFFIX)));
    }
}
