/// Advisory tag-file lock
///
/// A lock is a small JSON file `{pid, tag, ts}` at `<dir>/<tag>.json`; its
/// presence alone is the lock signal. Acquisition fails fast when the file
/// exists. This guards against accidental double invocation on one host and is
/// not a distributed lock.
use crate::errors::{BotError, BotResult};
use crate::logger::{self, LogTag};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Contents of a lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidTag {
    pub pid: u32,
    pub tag: String,
    /// Acquisition time, unix milliseconds
    pub ts: i64,
}

#[derive(Debug)]
pub struct ProcessLock {
    tag: String,
    path: PathBuf,
    held: bool,
}

impl ProcessLock {
    /// Describe a lock without acquiring it
    pub fn new(tag: &str, dir: &Path) -> Self {
        Self {
            tag: tag.to_string(),
            path: lock_file_path(tag, dir),
            held: false,
        }
    }

    /// Create the tag file, failing immediately if it already exists
    pub fn acquire(tag: &str, dir: &Path) -> BotResult<Self> {
        let mut lock = Self::new(tag, dir);
        lock.try_acquire()?;
        Ok(lock)
    }

    fn try_acquire(&mut self) -> BotResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(&self.path)
                    .unwrap_or_else(|read_err| format!("<unreadable: {}>", read_err));
                logger::warning(
                    LogTag::Lock,
                    &format!("Lock '{}' already held: {}", self.tag, holder.trim()),
                );
                return Err(BotError::Lock {
                    tag: self.tag.clone(),
                    holder: holder.trim().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let record = PidTag {
            pid: std::process::id(),
            tag: self.tag.clone(),
            ts: chrono::Utc::now().timestamp_millis(),
        };

        let written = serde_json::to_vec(&record)
            .map_err(BotError::from)
            .and_then(|bytes| file.write_all(&bytes).map_err(BotError::from));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&self.path);
            return Err(e);
        }

        self.held = true;
        logger::debug(
            LogTag::Lock,
            &format!("Acquired lock '{}' at {}", self.tag, self.path.display()),
        );
        Ok(())
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Remove the tag file
    ///
    /// No-op when this handle never acquired the lock. A file that is already
    /// gone is fine; any other removal error is returned.
    pub fn release(&mut self) -> BotResult<()> {
        if !self.held {
            return Ok(());
        }
        self.held = false;

        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                logger::debug(LogTag::Lock, &format!("Released lock '{}'", self.tag));
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            logger::warning(
                LogTag::Lock,
                &format!("Failed to release lock '{}': {}", self.tag, e),
            );
        }
    }
}

/// `<dir>/<sanitized tag>.json`
pub fn lock_file_path(tag: &str, dir: &Path) -> PathBuf {
    dir.join(format!("{}.json", sanitize_tag(tag)))
}

/// Map a tag onto a safe file stem
///
/// ASCII letters, digits, `-` and `_` pass through; every other byte is
/// percent-encoded, so distinct tags never share a file. Surrounding
/// whitespace is not part of the tag.
pub fn sanitize_tag(tag: &str) -> String {
    let tag = tag.trim();
    if tag.is_empty() {
        return "%".to_string();
    }

    let mut stem = String::with_capacity(tag.len());
    for byte in tag.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }
    stem
}

/// Read the holder of a tag file, if any
pub fn read_holder(tag: &str, dir: &Path) -> Option<PidTag> {
    let contents = std::fs::read_to_string(lock_file_path(tag, dir)).ok()?;
    serde_json::from_str(&contents).ok()
}
