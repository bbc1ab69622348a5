/// Swap worker
///
/// Job handler of the `swap_worker` binary:
/// validate → resolve wallet → build keypair → execute → (monitor).
/// The confirmation monitor runs in a separate worker process; its failure is
/// logged and never fails a swap that already reached the chain.
use super::monitor::MonitorRequest;
use super::router::{ExecutorDeps, ExecutorRegistry, SwapExecutor, SwapRequest};
use super::types::{ExecutionResult, Timing};
use super::validator::{validate_raw, RawSwapPayload, SwapInstruction};
use crate::config::Config;
use crate::errors::{BotError, BotResult};
use crate::logger::{self, LogTag};
use crate::rpc::{JitoSubmitter, SolanaRpc, TransactionSubmitter};
use crate::wallets::{self, ConfigWalletResolver, WalletResolver};
use crate::workers::{JobHandler, RunOptions, WorkerHarness, WorkerRegistry, WorkerTools, MONITOR_WORKER};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use solana_sdk::signature::Keypair;
use std::sync::Arc;
use std::time::Duration;

/// Hands a submitted transaction to the confirmation monitor
#[async_trait]
pub trait MonitorLauncher: Send + Sync {
    async fn launch(&self, request: MonitorRequest) -> BotResult<Value>;
}

/// Runs the monitor worker through the harness with a bounded timeout
pub struct HarnessMonitorLauncher {
    harness: WorkerHarness,
    workers: WorkerRegistry,
    config: Config,
}

impl HarnessMonitorLauncher {
    pub fn new(harness: WorkerHarness, workers: WorkerRegistry, config: Config) -> Self {
        Self {
            harness,
            workers,
            config,
        }
    }
}

#[async_trait]
impl MonitorLauncher for HarnessMonitorLauncher {
    async fn launch(&self, request: MonitorRequest) -> BotResult<Value> {
        let command = self.workers.get(MONITOR_WORKER)?;
        let timeout_ms = request.timeout_ms.unwrap_or(self.config.monitor.timeout_ms);
        let payload = serde_json::to_value(&request)?;

        // Leave the monitor room to report its own timeout
        let options = RunOptions::from_config(&self.config.harness, payload)
            .with_timeout(Duration::from_millis(timeout_ms + self.config.harness.exit_grace_ms))
            .with_env(self.config.child_env());

        let outcome = self.harness.run(command, options).await?;
        Ok(outcome.result)
    }
}

pub struct SwapWorker {
    config: Config,
    resolver: Arc<dyn WalletResolver>,
    executor: Arc<dyn SwapExecutor>,
    rpc: Arc<SolanaRpc>,
    jito: Option<Arc<JitoSubmitter>>,
    monitor: Option<Arc<dyn MonitorLauncher>>,
}

impl SwapWorker {
    pub fn new(
        config: Config,
        resolver: Arc<dyn WalletResolver>,
        executor: Arc<dyn SwapExecutor>,
        rpc: Arc<SolanaRpc>,
    ) -> Self {
        Self {
            config,
            resolver,
            executor,
            rpc,
            jito: None,
            monitor: None,
        }
    }

    pub fn with_jito(mut self, jito: Arc<JitoSubmitter>) -> Self {
        self.jito = Some(jito);
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn MonitorLauncher>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Composition root of the swap worker process
    pub fn from_config(config: Config) -> BotResult<Self> {
        let rpc = Arc::new(SolanaRpc::from_config(&config.rpc)?);
        let deps = ExecutorDeps {
            config: config.clone(),
            ledger: rpc.clone(),
        };
        let executor = ExecutorRegistry::with_defaults().select(&deps)?;
        let resolver = Arc::new(ConfigWalletResolver::new(&config.wallets));

        let mut worker = Self::new(config.clone(), resolver, executor, rpc);

        match JitoSubmitter::from_config(&config.rpc) {
            Ok(jito) => worker = worker.with_jito(Arc::new(jito)),
            Err(e) => logger::debug(LogTag::Swap, &format!("Jito submitter unavailable: {}", e)),
        }

        if config.monitor.enabled {
            let workers = WorkerRegistry::from_config(&config.workers)?;
            let harness = WorkerHarness::new(config.lock_dir());
            worker = worker.with_monitor(Arc::new(HarnessMonitorLauncher::new(harness, workers, config)));
        }

        Ok(worker)
    }

    fn keypair_for(&self, instruction: &SwapInstruction) -> BotResult<Keypair> {
        let secret = match (&instruction.wallet.alias, &instruction.wallet.private_key) {
            (Some(alias), provided) => match self.resolver.resolve(alias) {
                Ok(secret) => secret,
                Err(e) => match provided {
                    Some(secret) => {
                        logger::debug(
                            LogTag::Wallet,
                            &format!("alias '{}' unresolved ({}), using provided key", alias, e),
                        );
                        secret.clone()
                    }
                    None => return Err(e),
                },
            },
            (None, Some(secret)) => secret.clone(),
            (None, None) => {
                return Err(BotError::validation(
                    "wallet",
                    "either walletAlias or walletPrivateKey is required",
                ))
            }
        };
        wallets::parse_keypair(&secret)
    }

    fn submitter_for(&self, instruction: &SwapInstruction) -> BotResult<&dyn TransactionSubmitter> {
        if !instruction.use_jito {
            return Ok(self.rpc.as_ref());
        }
        match &self.jito {
            Some(jito) => Ok(jito.as_ref()),
            None => Err(BotError::config("useJito requested but no Jito endpoint is configured")),
        }
    }

    /// Validate and execute one swap payload
    pub async fn run_swap(&self, payload: Value, tools: Option<&WorkerTools>) -> BotResult<ExecutionResult> {
        let started_at = Utc::now();

        if !payload.is_object() {
            return Err(BotError::validation("payload", "expected a JSON object"));
        }
        let raw: RawSwapPayload = serde_json::from_value(payload)
            .map_err(|e| BotError::validation("payload", e.to_string()))?;
        let instruction = validate_raw(raw, self.config.swaps.default_slippage_pct)?;

        if instruction.debug_logging {
            logger::enable_debug_all();
        }

        let signer = self.keypair_for(&instruction)?;
        let submitter = self.submitter_for(&instruction)?;

        logger::info(
            LogTag::Swap,
            &format!(
                "🔄 {} {} {} via {} (wallet {}{})",
                instruction.side,
                instruction.amount,
                instruction.mint,
                self.executor.name(),
                wallets::describe(&signer),
                if instruction.dry_run { ", dry run" } else { "" }
            ),
        );
        if let Some(tools) = tools {
            tools.progress(
                "swap:start",
                json!({ "side": instruction.side, "mint": instruction.mint, "amount": instruction.amount }),
            );
        }

        let mut result = self
            .executor
            .execute(SwapRequest {
                instruction: &instruction,
                signer: &signer,
                submitter,
            })
            .await?;

        if let (Some(tools), Some(txid)) = (tools, result.txid.as_ref()) {
            tools.progress("swap:submitted", json!({ "txid": txid }));
        }

        if !result.dry_run {
            if let (Some(monitor), Some(txid)) = (&self.monitor, result.txid.clone()) {
                result.monitor = self.run_monitor(monitor.as_ref(), &instruction, txid).await;
                if let Some(slot) = result.monitor.as_ref().and_then(|report| report["slot"].as_u64()) {
                    result.slot = Some(slot);
                }
            }
        }

        result.timing = Some(Timing::between(started_at, Utc::now()));
        Ok(result)
    }

    async fn run_monitor(
        &self,
        monitor: &dyn MonitorLauncher,
        instruction: &SwapInstruction,
        txid: String,
    ) -> Option<Value> {
        let request = MonitorRequest {
            txid: txid.clone(),
            commitment: Some(self.config.monitor.commitment.clone()),
            timeout_ms: Some(self.config.monitor.timeout_ms),
            poll_interval_ms: Some(self.config.monitor.poll_interval_ms),
            context: json!({
                "side": instruction.side,
                "mint": instruction.mint,
                "amount": instruction.amount,
                "executor": self.executor.id(),
            }),
        };

        match monitor.launch(request).await {
            Ok(report) => Some(report),
            Err(e) => {
                logger::warning(
                    LogTag::Monitor,
                    &format!("Monitor for {} failed (swap already submitted): {}", txid, e),
                );
                None
            }
        }
    }
}

#[async_trait]
impl JobHandler for SwapWorker {
    async fn handle(&self, payload: Value, tools: WorkerTools) -> BotResult<Value> {
        let result = self.run_swap(payload, Some(&tools)).await?;
        Ok(serde_json::to_value(result)?)
    }
}
