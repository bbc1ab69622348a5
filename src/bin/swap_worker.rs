//! Swap worker process
//!
//! Reads one `start` message from stdin, executes the swap and answers with a
//! single `result` or `error` message on stdout. Logs go to stderr.

use swapbox::{
    config::Config,
    logger::{self as logger, LogTag},
    swaps::SwapWorker,
    workers::WorkerRuntime,
};

#[tokio::main]
async fn main() {
    logger::init_for_worker();

    let worker = match Config::load().and_then(SwapWorker::from_config) {
        Ok(worker) => worker,
        Err(e) => {
            logger::error(LogTag::Worker, &format!("swap worker failed to start: {}", e));
            logger::flush();
            std::process::exit(1);
        }
    };

    let exit = WorkerRuntime::new("swap_worker").run_stdio(worker).await;

    logger::debug(
        LogTag::Worker,
        &format!("swap worker exiting with code {} ({:?})", exit.code, exit.reason),
    );
    logger::flush();
    std::process::exit(exit.code);
}
