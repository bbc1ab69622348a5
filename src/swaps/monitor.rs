/// Transaction confirmation monitor
///
/// Runs in its own worker process after a swap was submitted. It polls the
/// signature status until the target commitment is reached, the transaction
/// fails on-chain, or the deadline passes, emitting one progress event per
/// poll. A timeout is reported as a status, not an error: the outcome is
/// simply unknown.
use crate::config::MonitorConfig;
use crate::errors::{BotError, BotResult};
use crate::logger::{self, LogTag};
use crate::rpc::{commitment_reached, SignatureStatusSource};
use crate::workers::{JobHandler, WorkerTools};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const STATUS_FAILED: &str = "failed";
pub const STATUS_TIMEOUT: &str = "timeout";

/// Job payload of the monitor worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorRequest {
    pub txid: String,
    #[serde(default)]
    pub commitment: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    /// Swap context echoed back in the report
    #[serde(default)]
    pub context: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorReport {
    pub txid: String,
    /// Reached commitment level, `failed` or `timeout`
    pub status: String,
    pub slot: Option<u64>,
    pub err: Option<Value>,
    pub polls: u32,
    #[serde(default)]
    pub context: Value,
}

impl MonitorReport {
    pub fn is_confirmed(&self) -> bool {
        self.status != STATUS_FAILED && self.status != STATUS_TIMEOUT
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub commitment: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl MonitorSettings {
    pub fn resolve(request: &MonitorRequest, defaults: &MonitorConfig) -> Self {
        Self {
            commitment: request
                .commitment
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| defaults.commitment.clone())
                .to_lowercase(),
            timeout: Duration::from_millis(request.timeout_ms.unwrap_or(defaults.timeout_ms)),
            poll_interval: Duration::from_millis(
                request
                    .poll_interval_ms
                    .unwrap_or(defaults.poll_interval_ms)
                    .max(1),
            ),
        }
    }
}

/// Poll until confirmed, failed or timed out
pub async fn watch_signature<P>(
    source: &dyn SignatureStatusSource,
    request: &MonitorRequest,
    settings: &MonitorSettings,
    on_poll: P,
) -> MonitorReport
where
    P: Fn(u32, Option<&str>),
{
    let deadline = Instant::now() + settings.timeout;
    let mut polls: u32 = 0;
    let mut last_slot = None;

    let report = |status: &str, slot: Option<u64>, err: Option<Value>, polls: u32| MonitorReport {
        txid: request.txid.clone(),
        status: status.to_string(),
        slot,
        err,
        polls,
        context: request.context.clone(),
    };

    loop {
        polls += 1;
        match source.signature_status(&request.txid).await {
            Ok(Some(status)) => {
                last_slot = Some(status.slot);
                on_poll(polls, status.confirmation_status.as_deref());

                if let Some(err) = status.err.filter(|e| !e.is_null()) {
                    logger::warning(
                        LogTag::Monitor,
                        &format!("❌ {} failed on-chain: {}", request.txid, err),
                    );
                    return report(STATUS_FAILED, Some(status.slot), Some(err), polls);
                }

                if let Some(level) = status.confirmation_status.as_deref() {
                    if commitment_reached(level, &settings.commitment) {
                        logger::info(
                            LogTag::Monitor,
                            &format!("✅ {} {} at slot {}", request.txid, level, status.slot),
                        );
                        return report(level, Some(status.slot), None, polls);
                    }
                }
            }
            Ok(None) => on_poll(polls, None),
            Err(e) => {
                // Node hiccups do not end the watch
                logger::debug(LogTag::Monitor, &format!("status poll {} failed: {}", polls, e));
                on_poll(polls, None);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            logger::warning(
                LogTag::Monitor,
                &format!(
                    "⏰ {} not {} within {}ms",
                    request.txid,
                    settings.commitment,
                    settings.timeout.as_millis()
                ),
            );
            return report(STATUS_TIMEOUT, last_slot, None, polls);
        }
        tokio::time::sleep(settings.poll_interval.min(deadline - now)).await;
    }
}

/// Job handler of the `tx_monitor_worker` binary
pub struct MonitorHandler {
    source: Arc<dyn SignatureStatusSource>,
    defaults: MonitorConfig,
}

impl MonitorHandler {
    pub fn new(source: Arc<dyn SignatureStatusSource>, defaults: MonitorConfig) -> Self {
        Self { source, defaults }
    }
}

#[async_trait]
impl JobHandler for MonitorHandler {
    async fn handle(&self, payload: Value, tools: WorkerTools) -> BotResult<Value> {
        let request: MonitorRequest = serde_json::from_value(payload)
            .map_err(|e| BotError::validation("monitor payload", e.to_string()))?;
        if request.txid.trim().is_empty() {
            return Err(BotError::validation("txid", "is required"));
        }

        let settings = MonitorSettings::resolve(&request, &self.defaults);
        logger::debug(
            LogTag::Monitor,
            &format!(
                "watching {} for {} (timeout {}ms)",
                request.txid,
                settings.commitment,
                settings.timeout.as_millis()
            ),
        );

        let report = watch_signature(self.source.as_ref(), &request, &settings, |poll, level| {
            tools.progress("poll", json!({ "poll": poll, "confirmationStatus": level }));
        })
        .await;

        Ok(serde_json::to_value(report)?)
    }
}
