//! Scripted worker used by the harness integration tests
//!
//! The mode comes from the first argument or `FIXTURE_MODE`:
//! - `echo`     answer with the start payload
//! - `fail`     answer with an error message
//! - `progress` stream three progress events, then answer
//! - `hang`     accept the job and never answer
//! - `crash`    exit with code 3 without answering
//! - `linger`   answer, then stay alive ignoring stdin
//!
//! When `FIXTURE_PID_FILE` is set the process writes its pid there first.

use serde_json::{json, Value};
use std::time::Duration;
use swapbox::{
    errors::{BotError, BotResult},
    logger::{self as logger, LogTag},
    workers::{FnHandler, WorkerMessage, WorkerRuntime, WorkerTools},
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const ENV_MODE: &str = "FIXTURE_MODE";
const ENV_PID_FILE: &str = "FIXTURE_PID_FILE";

#[tokio::main]
async fn main() {
    logger::init_for_worker();

    let mode = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(ENV_MODE).ok())
        .unwrap_or_else(|| "echo".to_string());

    if let Ok(path) = std::env::var(ENV_PID_FILE) {
        if let Err(e) = std::fs::write(&path, std::process::id().to_string()) {
            logger::error(LogTag::Worker, &format!("cannot write pid file {}: {}", path, e));
        }
    }

    let code = match mode.as_str() {
        "echo" => serve(|payload, _tools| async move { Ok::<Value, BotError>(payload) }).await,
        "fail" => {
            serve(|_payload, _tools| async move {
                Err::<Value, _>(BotError::validation("amount", "fixture rejected the job"))
            })
            .await
        }
        "progress" => {
            serve(|payload, tools: WorkerTools| async move {
                for step in 1..=3 {
                    tools.progress("step", json!({ "step": step }));
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Ok::<Value, BotError>(json!({ "done": true, "echo": payload }))
            })
            .await
        }
        "hang" => {
            serve(|_payload, _tools| async move {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok::<Value, BotError>(Value::Null)
            })
            .await
        }
        "crash" => {
            let _ = read_start().await;
            3
        }
        "linger" => linger().await,
        other => {
            logger::error(LogTag::Worker, &format!("unknown fixture mode '{}'", other));
            2
        }
    };

    logger::flush();
    std::process::exit(code);
}

async fn serve<F, Fut>(handler: F) -> i32
where
    F: Fn(Value, WorkerTools) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = BotResult<Value>> + Send + 'static,
{
    WorkerRuntime::new("test_worker_fixture")
        .run_stdio(FnHandler(handler))
        .await
        .code
}

async fn read_start() -> Option<(String, Value)> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Ok(WorkerMessage::Start { request_id, payload }) = WorkerMessage::decode(&line) {
            return Some((request_id, payload));
        }
    }
    None
}

async fn linger() -> i32 {
    let Some((request_id, payload)) = read_start().await else {
        return 1;
    };

    let line = match WorkerMessage::result(request_id, payload).encode() {
        Ok(line) => line,
        Err(e) => {
            logger::error(LogTag::Worker, &format!("encode failed: {}", e));
            return 1;
        }
    };

    let mut stdout = tokio::io::stdout();
    let written = stdout.write_all(format!("{}\n", line).as_bytes()).await;
    if written.is_err() || stdout.flush().await.is_err() {
        return 1;
    }

    tokio::time::sleep(Duration::from_secs(3_600)).await;
    0
}
