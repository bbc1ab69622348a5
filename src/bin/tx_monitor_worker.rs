//! Confirmation monitor process
//!
//! Polls a submitted signature until it reaches the requested commitment,
//! fails, or times out, streaming one `progress` message per poll.

use std::sync::Arc;
use swapbox::{
    config::Config,
    logger::{self as logger, LogTag},
    rpc::SolanaRpc,
    swaps::MonitorHandler,
    workers::WorkerRuntime,
};

#[tokio::main]
async fn main() {
    logger::init_for_worker();

    let handler = match Config::load().and_then(|config| {
        let rpc = SolanaRpc::from_config(&config.rpc)?;
        Ok(MonitorHandler::new(Arc::new(rpc), config.monitor))
    }) {
        Ok(handler) => handler,
        Err(e) => {
            logger::error(LogTag::Monitor, &format!("monitor worker failed to start: {}", e));
            logger::flush();
            std::process::exit(1);
        }
    };

    let exit = WorkerRuntime::new("tx_monitor_worker").run_stdio(handler).await;
    logger::flush();
    std::process::exit(exit.code);
}
