//! Isolated worker processes
//!
//! - `envelope`: typed IPC messages exchanged over stdin/stdout
//! - `pending`: request id -> completion table
//! - `harness`: parent side (spawn, correlate, time out, reclaim)
//! - `runtime`: child side (handle one job, release resources, exit)
//! - `registry`: worker name -> executable

pub mod envelope;
pub mod harness;
pub mod pending;
pub mod registry;
pub mod runtime;

pub use envelope::{ProgressEvent, RemoteError, WorkerMessage};
pub use harness::{DetachedWorker, ProgressCallback, RunOptions, RunOutcome, WorkerHarness};
pub use registry::{WorkerCommand, WorkerRegistry, MONITOR_WORKER, SWAP_WORKER};
pub use runtime::{
    FnHandler, JobHandler, LifecycleEvent, LifecycleLogger, LifecyclePhase, Releasable,
    WorkerExit, WorkerRuntime, WorkerTools,
};
