/// Worker harness (parent side)
///
/// Runs one job in an isolated child process:
///
/// 1. optionally acquire a tag-file lock (fails fast on conflict)
/// 2. spawn the worker with the env overlay merged onto the current env
/// 3. send `start` with a request id (random unless supplied)
/// 4. wait for the matching terminal message, the timeout, or process exit
/// 5. in wait-for-exit mode, require the child to exit within the grace period
///
/// Progress messages are forwarded to `on_progress` as they arrive, whatever
/// their request id. The lock is released and the child reclaimed on every
/// path: a timed-out child is killed; a resolve-on-response child is handed
/// back as a [`DetachedWorker`] that kills it when dropped.
use super::envelope::{ProgressEvent, WorkerMessage};
use super::pending::PendingTable;
use super::registry::WorkerCommand;
use crate::config::HarnessConfig;
use crate::errors::{BotError, BotResult};
use crate::logger::{self, LogTag};
use crate::process_lock::ProcessLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_millis(5_000);

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

#[derive(Clone)]
pub struct RunOptions {
    pub payload: Value,
    pub request_id: Option<String>,
    pub timeout: Duration,
    /// Merged onto the current environment
    pub env: HashMap<String, String>,
    pub lock_tag: Option<String>,
    /// Overrides the harness lock directory
    pub lock_dir: Option<PathBuf>,
    pub on_progress: Option<ProgressCallback>,
    /// Defaults to false with `on_progress`, true otherwise
    pub wait_for_exit: Option<bool>,
    pub exit_grace: Duration,
}

impl RunOptions {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            request_id: None,
            timeout: DEFAULT_TIMEOUT,
            env: HashMap::new(),
            lock_tag: None,
            lock_dir: None,
            on_progress: None,
            wait_for_exit: None,
            exit_grace: DEFAULT_EXIT_GRACE,
        }
    }

    /// Timeout and grace period from configuration
    pub fn from_config(config: &HarnessConfig, payload: Value) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            exit_grace: Duration::from_millis(config.exit_grace_ms),
            ..Self::new(payload)
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_exit_grace(mut self, grace: Duration) -> Self {
        self.exit_grace = grace;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn with_lock(mut self, tag: impl Into<String>) -> Self {
        self.lock_tag = Some(tag.into());
        self
    }

    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn with_wait_for_exit(mut self, wait: bool) -> Self {
        self.wait_for_exit = Some(wait);
        self
    }

    pub fn waits_for_exit(&self) -> bool {
        self.wait_for_exit.unwrap_or(self.on_progress.is_none())
    }
}

/// Successful harness call
#[derive(Debug)]
pub struct RunOutcome {
    pub result: Value,
    pub request_id: String,
    /// The terminal message as received
    pub raw: WorkerMessage,
    /// Live child in resolve-on-response mode
    pub detached: Option<DetachedWorker>,
}

/// A worker that answered but is still running
///
/// Keeps forwarding progress; the child is killed when this is dropped.
#[derive(Debug)]
pub struct DetachedWorker {
    name: String,
    child: Child,
    stdin: Option<ChildStdin>,
    reader: JoinHandle<()>,
}

impl DetachedWorker {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the child to exit on its own
    pub async fn wait(&mut self) -> BotResult<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    /// Close the channel (the runtime treats this as disconnect) and wait up to
    /// `grace` before killing
    pub async fn shutdown(&mut self, grace: Duration) -> BotResult<()> {
        drop(self.stdin.take());
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                status?;
                Ok(())
            }
            Err(_) => {
                logger::warning(
                    LogTag::Harness,
                    &format!("{} ignored disconnect, killing", self.name),
                );
                self.kill().await
            }
        }
    }

    pub async fn kill(&mut self) -> BotResult<()> {
        match self.child.kill().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for DetachedWorker {
    fn drop(&mut self) {
        self.reader.abort();
        let _ = self.child.start_kill();
    }
}

#[derive(Debug, Clone)]
pub struct WorkerHarness {
    lock_dir: PathBuf,
}

impl WorkerHarness {
    pub fn new(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_dir: lock_dir.into(),
        }
    }

    pub fn lock_dir(&self) -> &PathBuf {
        &self.lock_dir
    }

    /// Run one job in a fresh worker process
    pub async fn run(&self, command: &WorkerCommand, options: RunOptions) -> BotResult<RunOutcome> {
        let mut lock = match &options.lock_tag {
            Some(tag) => {
                let dir = options.lock_dir.as_ref().unwrap_or(&self.lock_dir);
                Some(ProcessLock::acquire(tag, dir)?)
            }
            None => None,
        };

        let outcome = self.run_unlocked(command, options).await;

        if let Some(lock) = lock.as_mut() {
            if let Err(e) = lock.release() {
                logger::warning(
                    LogTag::Harness,
                    &format!("Failed to release lock '{}': {}", lock.tag(), e),
                );
            }
        }

        outcome
    }

    async fn run_unlocked(&self, command: &WorkerCommand, options: RunOptions) -> BotResult<RunOutcome> {
        let request_id = options
            .request_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let wait_for_exit = options.waits_for_exit();

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .envs(&options.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BotError::internal(format!(
                    "failed to spawn worker '{}' ({}): {}",
                    command.name,
                    command.program.display(),
                    e
                ))
            })?;

        logger::debug(
            LogTag::Harness,
            &format!(
                "Spawned {} pid={} requestId={}",
                command.name,
                child.id().unwrap_or_default(),
                request_id
            ),
        );

        let (mut stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill().await;
                return Err(BotError::internal("worker stdio was not captured"));
            }
        };

        let pending = Arc::new(PendingTable::new());
        let response = pending.register(&request_id);
        let reader = tokio::spawn(read_worker_output(
            command.name.clone(),
            stdout,
            pending.clone(),
            options.on_progress.clone(),
        ));

        let start = WorkerMessage::start(request_id.clone(), options.payload.clone()).encode()?;
        if let Err(e) = write_line(&mut stdin, &start).await {
            // exit is reported through the closed response channel
            logger::warning(
                LogTag::Harness,
                &format!("Failed to send start to {}: {}", command.name, e),
            );
        }

        let terminal = match tokio::time::timeout(options.timeout, response).await {
            Ok(Ok(message)) => message,
            Ok(Err(_closed)) => {
                reader.abort();
                let (code, signal) = reap(&mut child, options.exit_grace).await;
                logger::warning(
                    LogTag::Harness,
                    &format!(
                        "{} exited before responding (code={:?}, signal={:?})",
                        command.name, code, signal
                    ),
                );
                return Err(BotError::ExitedBeforeResponse { code, signal });
            }
            Err(_elapsed) => {
                pending.cancel(&request_id);
                reader.abort();
                if let Err(e) = child.kill().await {
                    logger::warning(
                        LogTag::Harness,
                        &format!("Failed to kill timed-out {}: {}", command.name, e),
                    );
                }
                logger::warning(
                    LogTag::Harness,
                    &format!(
                        "{} timed out after {}ms (requestId={}), killed",
                        command.name,
                        options.timeout.as_millis(),
                        request_id
                    ),
                );
                return Err(BotError::Timeout {
                    request_id,
                    timeout_ms: options.timeout.as_millis() as u64,
                });
            }
        };

        let result = match &terminal {
            WorkerMessage::Result { payload, .. } => Ok(payload.clone()),
            WorkerMessage::Error { error, .. } => Err(error.clone().into_error()),
            other => Err(BotError::internal(format!("unexpected terminal message {:?}", other))),
        };

        if !wait_for_exit {
            return match result {
                Ok(result) => Ok(RunOutcome {
                    result,
                    request_id,
                    raw: terminal,
                    detached: Some(DetachedWorker {
                        name: command.name.clone(),
                        child,
                        stdin: Some(stdin),
                        reader,
                    }),
                }),
                Err(err) => {
                    reader.abort();
                    let _ = child.kill().await;
                    Err(err)
                }
            };
        }

        match tokio::time::timeout(options.exit_grace, child.wait()).await {
            Ok(Ok(status)) => {
                logger::debug(
                    LogTag::Harness,
                    &format!("{} exited with {}", command.name, status),
                );
            }
            Ok(Err(e)) => {
                logger::warning(
                    LogTag::Harness,
                    &format!("Failed to wait for {}: {}", command.name, e),
                );
            }
            Err(_elapsed) => {
                reader.abort();
                let _ = child.kill().await;
                logger::warning(
                    LogTag::Harness,
                    &format!(
                        "{} responded but did not exit within {}ms, killed",
                        command.name,
                        options.exit_grace.as_millis()
                    ),
                );
                // a worker error is more informative than the lingering process
                result?;
                return Err(BotError::ExitGraceExceeded {
                    grace_ms: options.exit_grace.as_millis() as u64,
                });
            }
        }

        drop(stdin);
        reader.abort();

        Ok(RunOutcome {
            result: result?,
            request_id,
            raw: terminal,
            detached: None,
        })
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

/// Route child stdout lines: progress to the callback, terminal messages to
/// the pending table. EOF closes the table.
async fn read_worker_output(
    name: String,
    stdout: ChildStdout,
    pending: Arc<PendingTable>,
    on_progress: Option<ProgressCallback>,
) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                logger::debug(LogTag::Harness, &format!("{} stdout read failed: {}", name, e));
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match WorkerMessage::decode(&line) {
            Ok(WorkerMessage::Progress(event)) => {
                if let Some(callback) = &on_progress {
                    callback(event);
                }
            }
            Ok(message) if message.is_terminal() => {
                let id = message.request_id().unwrap_or_default().to_string();
                if !pending.complete(message) {
                    logger::debug(
                        LogTag::Harness,
                        &format!("{} ignoring terminal message for requestId={}", name, id),
                    );
                }
            }
            Ok(other) => {
                logger::debug(LogTag::Harness, &format!("{} ignoring {:?}", name, other));
            }
            Err(e) => {
                logger::debug(
                    LogTag::Harness,
                    &format!("{} non-envelope output: {} ({})", name, line.trim(), e),
                );
            }
        }
    }

    pending.close();
}

/// Wait briefly for a child that closed its output, killing it if needed
async fn reap(child: &mut Child, grace: Duration) -> (Option<i32>, Option<i32>) {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => (status.code(), exit_signal(&status)),
        Ok(Err(_)) => (None, None),
        Err(_) => {
            let _ = child.kill().await;
            (None, None)
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
