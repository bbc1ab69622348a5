/// Worker runtime (child side)
///
/// Runs inside a spawned worker process. Reads the `start` envelope from
/// stdin, invokes the registered [`JobHandler`], and writes exactly one
/// terminal message (plus any progress) to stdout.
///
/// Exit paths:
/// - handler success: `result`, release tracked resources, exit 0
///   (unless `exit_on_complete` is off)
/// - handler failure or panic: `error { message, stack }`, release, exit 1
/// - stdin EOF (parent gone) or SIGINT/SIGTERM: release, exit 0
///
/// Tracked resources are released exactly once, on whichever path fires first.
use super::envelope::{RemoteError, WorkerMessage};
use crate::errors::{BotError, BotResult};
use crate::logger::{self, LogTag};
use async_trait::async_trait;
use futures::future::{BoxFuture, OptionFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};

// =============================================================================
// RESOURCES
// =============================================================================

/// Anything that must be closed or unsubscribed before the worker exits
#[async_trait]
pub trait Releasable: Send + Sync {
    fn label(&self) -> String {
        "resource".to_string()
    }

    async fn release(&self) -> BotResult<()>;
}

#[derive(Clone, Default)]
pub struct ResourceTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Default)]
struct TrackerInner {
    resources: Mutex<Vec<Box<dyn Releasable>>>,
    released: AtomicBool,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, resource: Box<dyn Releasable>) {
        if self.inner.released.load(Ordering::SeqCst) {
            // cleanup already ran; release late registrations right away
            logger::warning(
                LogTag::Worker,
                &format!("{} tracked after cleanup, releasing now", resource.label()),
            );
            tokio::spawn(async move {
                let _ = resource.release().await;
            });
            return;
        }
        self.inner.resources.lock().push(resource);
    }

    pub fn len(&self) -> usize {
        self.inner.resources.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release everything in reverse registration order; later calls are no-ops
    pub async fn release_all(&self) -> usize {
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return 0;
        }

        let resources = std::mem::take(&mut *self.inner.resources.lock());
        let count = resources.len();
        for resource in resources.into_iter().rev() {
            if let Err(e) = resource.release().await {
                logger::warning(
                    LogTag::Worker,
                    &format!("Failed to release {}: {}", resource.label(), e),
                );
            }
        }
        count
    }
}

// =============================================================================
// LIFECYCLE LOGGING
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Start,
    Success,
    Error,
    Cleanup,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Start => "start",
            LifecyclePhase::Success => "success",
            LifecyclePhase::Error => "error",
            LifecyclePhase::Cleanup => "cleanup",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleEvent {
    pub worker: String,
    pub phase: LifecyclePhase,
    pub request_id: Option<String>,
    pub duration_ms: Option<u64>,
    pub detail: Option<String>,
}

impl LifecycleEvent {
    /// `key=value` form, one line
    pub fn to_line(&self) -> String {
        let mut line = format!("worker={} phase={}", self.worker, self.phase.as_str());
        if let Some(id) = &self.request_id {
            line.push_str(&format!(" requestId={}", id));
        }
        if let Some(ms) = self.duration_ms {
            line.push_str(&format!(" durationMs={}", ms));
        }
        if let Some(detail) = &self.detail {
            line.push_str(&format!(" detail={:?}", detail));
        }
        line
    }
}

/// Sink for structured lifecycle events
pub trait LifecycleLogger: Send + Sync {
    fn log(&self, event: &LifecycleEvent);
}

/// Writes lifecycle events through the process logger
pub struct DefaultLifecycleLogger;

impl LifecycleLogger for DefaultLifecycleLogger {
    fn log(&self, event: &LifecycleEvent) {
        match event.phase {
            LifecyclePhase::Error => logger::error(LogTag::Worker, &event.to_line()),
            _ => logger::info(LogTag::Worker, &event.to_line()),
        }
    }
}

// =============================================================================
// HANDLER AND TOOLS
// =============================================================================

enum Outbound {
    Message(WorkerMessage),
    Flush(oneshot::Sender<()>),
}

/// Capabilities handed to a job handler
#[derive(Clone)]
pub struct WorkerTools {
    request_id: String,
    tracker: ResourceTracker,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl WorkerTools {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Register a resource for release before the process exits
    pub fn track<R: Releasable + 'static>(&self, resource: R) {
        self.tracker.track(Box::new(resource));
    }

    /// Emit a non-terminal progress message
    pub fn progress(&self, event: &str, data: Value) {
        let message = WorkerMessage::progress(Some(self.request_id.clone()), event, data);
        if self.outbound.send(Outbound::Message(message)).is_err() {
            logger::debug(LogTag::Worker, &format!("Progress '{}' dropped, channel closed", event));
        }
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: Value, tools: WorkerTools) -> BotResult<Value>;
}

/// Adapts an async closure into a [`JobHandler`]
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(Value, WorkerTools) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BotResult<Value>> + Send + 'static,
{
    async fn handle(&self, payload: Value, tools: WorkerTools) -> BotResult<Value> {
        (self.0)(payload, tools).await
    }
}

// =============================================================================
// RUNTIME
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Completed,
    Failed,
    Disconnected,
    Signal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    pub code: i32,
    pub reason: ExitReason,
}

pub struct WorkerRuntime {
    name: String,
    exit_on_complete: bool,
    lifecycle: Arc<dyn LifecycleLogger>,
    tracker: ResourceTracker,
}

type HandlerFuture = BoxFuture<'static, BotResult<Value>>;

struct ActiveJob {
    request_id: String,
    started: Instant,
}

impl WorkerRuntime {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            exit_on_complete: true,
            lifecycle: Arc::new(DefaultLifecycleLogger),
            tracker: ResourceTracker::new(),
        }
    }

    pub fn with_exit_on_complete(mut self, exit_on_complete: bool) -> Self {
        self.exit_on_complete = exit_on_complete;
        self
    }

    pub fn with_lifecycle_logger(mut self, lifecycle: Arc<dyn LifecycleLogger>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    fn emit(&self, phase: LifecyclePhase, job: Option<&ActiveJob>, detail: Option<String>) {
        self.lifecycle.log(&LifecycleEvent {
            worker: self.name.clone(),
            phase,
            request_id: job.map(|j| j.request_id.clone()),
            duration_ms: job.map(|j| j.started.elapsed().as_millis() as u64),
            detail,
        });
    }

    async fn cleanup(&self, job: Option<&ActiveJob>, reason: &str) {
        let released = self.tracker.release_all().await;
        self.emit(
            LifecyclePhase::Cleanup,
            job,
            Some(format!("{} released={}", reason, released)),
        );
    }

    /// Serve on stdin/stdout until a terminal exit path fires
    pub async fn run_stdio<H: JobHandler + 'static>(&self, handler: H) -> WorkerExit {
        self.serve(
            tokio::io::stdin(),
            tokio::io::stdout(),
            wait_for_shutdown_signal(),
            Arc::new(handler),
        )
        .await
    }

    /// Serve one job over an arbitrary channel
    pub async fn serve<R, W, S>(
        &self,
        reader: R,
        writer: W,
        shutdown: S,
        handler: Arc<dyn JobHandler>,
    ) -> WorkerExit
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
        S: Future<Output = ()>,
    {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_outbound(writer, outbound_rx));

        let mut lines = BufReader::new(reader).lines();
        let mut job: Option<ActiveJob> = None;
        let mut running: Option<HandlerFuture> = None;
        tokio::pin!(shutdown);

        let exit = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    logger::debug(LogTag::Worker, &format!("{} received shutdown signal", self.name));
                    self.cleanup(job.as_ref(), "signal").await;
                    break WorkerExit { code: 0, reason: ExitReason::Signal };
                }

                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => {
                            logger::debug(LogTag::Worker, &format!("{} parent disconnected", self.name));
                            self.cleanup(job.as_ref(), "disconnect").await;
                            break WorkerExit { code: 0, reason: ExitReason::Disconnected };
                        }
                        Err(e) => {
                            logger::warning(LogTag::Worker, &format!("{} channel read failed: {}", self.name, e));
                            self.cleanup(job.as_ref(), "disconnect").await;
                            break WorkerExit { code: 0, reason: ExitReason::Disconnected };
                        }
                    };

                    if line.trim().is_empty() {
                        continue;
                    }

                    match WorkerMessage::decode(&line) {
                        Ok(WorkerMessage::Start { request_id, payload }) => {
                            if running.is_some() {
                                logger::warning(
                                    LogTag::Worker,
                                    &format!("{} ignoring start {} while a job is running", self.name, request_id),
                                );
                                continue;
                            }
                            let active = ActiveJob { request_id: request_id.clone(), started: Instant::now() };
                            self.emit(LifecyclePhase::Start, Some(&active), None);

                            let tools = WorkerTools {
                                request_id,
                                tracker: self.tracker.clone(),
                                outbound: outbound_tx.clone(),
                            };
                            let handler = handler.clone();
                            running = Some(
                                async move {
                                    match AssertUnwindSafe(handler.handle(payload, tools)).catch_unwind().await {
                                        Ok(result) => result,
                                        Err(panic) => Err(BotError::internal(format!(
                                            "handler panicked: {}",
                                            panic_message(&panic)
                                        ))),
                                    }
                                }
                                .boxed(),
                            );
                            job = Some(active);
                        }
                        Ok(other) => {
                            logger::debug(LogTag::Worker, &format!("{} ignoring {:?}", self.name, other));
                        }
                        Err(e) => {
                            logger::warning(LogTag::Worker, &format!("{} bad envelope: {}", self.name, e));
                        }
                    }
                }

                Some(result) = OptionFuture::from(running.as_mut()), if running.is_some() => {
                    running = None;
                    let active = job.take();
                    let request_id = active.as_ref().map(|j| j.request_id.clone()).unwrap_or_default();

                    match result {
                        Ok(value) => {
                            send_and_flush(&outbound_tx, WorkerMessage::result(request_id, value)).await;
                            self.emit(LifecyclePhase::Success, active.as_ref(), None);
                            if self.exit_on_complete {
                                self.cleanup(active.as_ref(), "complete").await;
                                break WorkerExit { code: 0, reason: ExitReason::Completed };
                            }
                        }
                        Err(err) => {
                            send_and_flush(
                                &outbound_tx,
                                WorkerMessage::error(request_id, RemoteError::from_error(&err)),
                            )
                            .await;
                            self.emit(LifecyclePhase::Error, active.as_ref(), Some(err.to_string()));
                            self.cleanup(active.as_ref(), "error").await;
                            break WorkerExit { code: 1, reason: ExitReason::Failed };
                        }
                    }
                }
            }
        };

        drop(outbound_tx);
        drop(running);
        writer_task.abort();
        exit
    }
}

async fn send_and_flush(outbound: &mpsc::UnboundedSender<Outbound>, message: WorkerMessage) {
    let (ack_tx, ack_rx) = oneshot::channel();
    if outbound.send(Outbound::Message(message)).is_err()
        || outbound.send(Outbound::Flush(ack_tx)).is_err()
    {
        return;
    }
    let _ = ack_rx.await;
}

async fn write_outbound<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Outbound>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Message(message) => {
                let line = match message.encode() {
                    Ok(line) => line,
                    Err(e) => {
                        logger::error(LogTag::Worker, &format!("Failed to encode message: {}", e));
                        continue;
                    }
                };
                if writer.write_all(line.as_bytes()).await.is_err()
                    || writer.write_all(b"\n").await.is_err()
                {
                    logger::debug(LogTag::Worker, "Parent channel closed while writing");
                    return;
                }
            }
            Outbound::Flush(ack) => {
                let _ = writer.flush().await;
                let _ = ack.send(());
            }
        }
    }
    let _ = writer.flush().await;
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Waits until either Ctrl-C (SIGINT) or SIGTERM is received
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c_or_never() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                logger::warning(LogTag::Worker, &format!("Failed to bind SIGTERM: {}", e));
                ctrl_c_or_never().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c_or_never().await;
    }
}

async fn ctrl_c_or_never() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    struct CountingResource {
        label: &'static str,
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Releasable for CountingResource {
        fn label(&self) -> String {
            self.label.to_string()
        }

        async fn release(&self) -> BotResult<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingLifecycle {
        events: Mutex<Vec<LifecycleEvent>>,
    }

    impl LifecycleLogger for RecordingLifecycle {
        fn log(&self, event: &LifecycleEvent) {
            self.events.lock().push(event.clone());
        }
    }

    impl RecordingLifecycle {
        fn phases(&self) -> Vec<LifecyclePhase> {
            self.events.lock().iter().map(|e| e.phase).collect()
        }
    }

    fn echo_handler(released: Arc<AtomicUsize>) -> Arc<dyn JobHandler> {
        Arc::new(FnHandler(move |payload: Value, tools: WorkerTools| {
            let released = released.clone();
            async move {
                tools.track(CountingResource {
                    label: "subscription",
                    count: released,
                });
                tools.progress("received", json!({"requestId": tools.request_id()}));
                Ok::<Value, BotError>(payload)
            }
        }))
    }

    async fn read_messages<R: AsyncRead + Unpin>(reader: R) -> Vec<WorkerMessage> {
        let mut lines = BufReader::new(reader).lines();
        let mut out = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            out.push(WorkerMessage::decode(&line).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_success_path() {
        let released = Arc::new(AtomicUsize::new(0));
        let lifecycle = Arc::new(RecordingLifecycle::default());
        let runtime = WorkerRuntime::new("echo").with_lifecycle_logger(lifecycle.clone());

        let (mut parent_in, child_in) = duplex(4096);
        let (child_out, parent_out) = duplex(4096);

        let start = WorkerMessage::start("req-7", json!({"n": 1})).encode().unwrap();
        parent_in.write_all(format!("{}\n", start).as_bytes()).await.unwrap();

        let exit = runtime
            .serve(
                child_in,
                child_out,
                std::future::pending::<()>(),
                echo_handler(released.clone()),
            )
            .await;

        assert_eq!(exit, WorkerExit { code: 0, reason: ExitReason::Completed });
        assert_eq!(released.load(Ordering::SeqCst), 1);

        let messages = read_messages(parent_out).await;
        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[0], WorkerMessage::Progress(p) if p.event == "received"));
        assert_eq!(messages[1], WorkerMessage::result("req-7", json!({"n": 1})));

        assert_eq!(
            lifecycle.phases(),
            vec![LifecyclePhase::Start, LifecyclePhase::Success, LifecyclePhase::Cleanup]
        );
        assert!(lifecycle.events.lock()[1].duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_keeps_serving_until_disconnect() {
        let released = Arc::new(AtomicUsize::new(0));
        let runtime = WorkerRuntime::new("resident").with_exit_on_complete(false);

        let (mut parent_in, child_in) = duplex(4096);
        let (child_out, parent_out) = duplex(4096);
        let start = WorkerMessage::start("req-1", json!({"n": 2})).encode().unwrap();
        parent_in.write_all(format!("{}\n", start).as_bytes()).await.unwrap();

        let serve = runtime.serve(
            child_in,
            child_out,
            std::future::pending::<()>(),
            echo_handler(released.clone()),
        );
        let parent = async move {
            let mut lines = BufReader::new(parent_out).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if WorkerMessage::decode(&line).unwrap().is_terminal() {
                    break;
                }
            }
            drop(parent_in);
        };

        let (exit, ()) = tokio::join!(serve, parent);
        assert_eq!(exit, WorkerExit { code: 0, reason: ExitReason::Disconnected });
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_sends_error_and_exits_one() {
        let released = Arc::new(AtomicUsize::new(0));
        let runtime = WorkerRuntime::new("failing");
        let count = released.clone();
        let handler: Arc<dyn JobHandler> = Arc::new(FnHandler(move |_payload: Value, tools: WorkerTools| {
            let count = count.clone();
            async move {
                tools.track(CountingResource { label: "socket", count });
                Err::<Value, _>(BotError::validation("mint", "bad address"))
            }
        }));

        let (mut parent_in, child_in) = duplex(4096);
        let (child_out, parent_out) = duplex(4096);
        let start = WorkerMessage::start("req-err", json!({})).encode().unwrap();
        parent_in.write_all(format!("{}\n", start).as_bytes()).await.unwrap();

        let exit = runtime
            .serve(child_in, child_out, std::future::pending::<()>(), handler)
            .await;
        assert_eq!(exit.code, 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);

        let messages = read_messages(parent_out).await;
        match &messages[0] {
            WorkerMessage::Error { request_id, error } => {
                assert_eq!(request_id, "req-err");
                assert_eq!(error.message, "Invalid mint: bad address");
                assert!(error.stack.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_before_start_exits_zero() {
        let lifecycle = Arc::new(RecordingLifecycle::default());
        let runtime = WorkerRuntime::new("idle").with_lifecycle_logger(lifecycle.clone());

        let (parent_in, child_in) = duplex(64);
        let (child_out, _parent_out) = duplex(64);
        drop(parent_in);

        let exit = runtime
            .serve(
                child_in,
                child_out,
                std::future::pending::<()>(),
                echo_handler(Arc::new(AtomicUsize::new(0))),
            )
            .await;

        assert_eq!(exit, WorkerExit { code: 0, reason: ExitReason::Disconnected });
        assert_eq!(lifecycle.phases(), vec![LifecyclePhase::Cleanup]);
    }

    #[tokio::test]
    async fn test_signal_releases_running_job_resources() {
        let released = Arc::new(AtomicUsize::new(0));
        let runtime = WorkerRuntime::new("slow");
        let count = released.clone();
        let handler: Arc<dyn JobHandler> = Arc::new(FnHandler(move |_payload: Value, tools: WorkerTools| {
            let count = count.clone();
            async move {
                tools.track(CountingResource { label: "stream", count });
                std::future::pending::<()>().await;
                Ok::<Value, BotError>(Value::Null)
            }
        }));

        let (mut parent_in, child_in) = duplex(4096);
        let (child_out, _parent_out) = duplex(4096);
        let start = WorkerMessage::start("req-s", json!({})).encode().unwrap();
        parent_in.write_all(format!("{}\n", start).as_bytes()).await.unwrap();

        let shutdown = tokio::time::sleep(std::time::Duration::from_millis(100));
        let exit = runtime.serve(child_in, child_out, shutdown, handler).await;

        assert_eq!(exit, WorkerExit { code: 0, reason: ExitReason::Signal });
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_all_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let tracker = ResourceTracker::new();
        tracker.track(Box::new(CountingResource { label: "a", count: count.clone() }));
        tracker.track(Box::new(CountingResource { label: "b", count: count.clone() }));

        assert_eq!(tracker.release_all().await, 2);
        assert_eq!(tracker.release_all().await, 0);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_lifecycle_line_format() {
        let event = LifecycleEvent {
            worker: "swap".to_string(),
            phase: LifecyclePhase::Success,
            request_id: Some("r1".to_string()),
            duration_ms: Some(42),
            detail: None,
        };
        assert_eq!(event.to_line(), "worker=swap phase=success requestId=r1 durationMs=42");
    }
}
