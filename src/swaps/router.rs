/// Executor selection
///
/// Executors are named implementations of [`SwapExecutor`], registered once at
/// the composition root and picked by `swaps.executor`.
use super::pipeline::PipelineSettings;
use super::raptor::{RaptorClient, RaptorExecutor};
use super::types::ExecutionResult;
use super::v3::{V3Client, V3Executor};
use super::validator::SwapInstruction;
use crate::config::Config;
use crate::errors::{BotError, BotResult};
use crate::rpc::{TokenLedger, TransactionSubmitter};
use async_trait::async_trait;
use solana_sdk::signature::Keypair;
use std::collections::HashMap;
use std::sync::Arc;

pub const EXECUTOR_V3: &str = "v3";
pub const EXECUTOR_RAPTOR: &str = "raptor";

/// Everything an executor needs for one swap
pub struct SwapRequest<'a> {
    pub instruction: &'a SwapInstruction,
    pub signer: &'a Keypair,
    pub submitter: &'a dyn TransactionSubmitter,
}

#[async_trait]
pub trait SwapExecutor: Send + Sync {
    /// Registry name
    fn id(&self) -> &str;

    /// Human-readable name for log lines
    fn name(&self) -> &str;

    async fn execute(&self, request: SwapRequest<'_>) -> BotResult<ExecutionResult>;
}

/// Shared collaborators handed to executor constructors
#[derive(Clone)]
pub struct ExecutorDeps {
    pub config: Config,
    pub ledger: Arc<dyn TokenLedger>,
}

pub type ExecutorFactory = Arc<dyn Fn(&ExecutorDeps) -> BotResult<Arc<dyn SwapExecutor>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    factories: HashMap<String, ExecutorFactory>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in V3 and Raptor executors
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(EXECUTOR_V3, |deps: &ExecutorDeps| {
            let client = V3Client::from_config(&deps.config.quotes)?;
            let settings = PipelineSettings::from_config(&deps.config.swaps);
            Ok(Arc::new(V3Executor::new(Arc::new(client), settings)) as Arc<dyn SwapExecutor>)
        });
        registry.register(EXECUTOR_RAPTOR, |deps: &ExecutorDeps| {
            let client = RaptorClient::from_config(&deps.config.quotes)?;
            let settings = PipelineSettings::from_config(&deps.config.swaps);
            Ok(Arc::new(RaptorExecutor::new(
                Arc::new(client),
                deps.ledger.clone(),
                settings,
            )) as Arc<dyn SwapExecutor>)
        });
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ExecutorDeps) -> BotResult<Arc<dyn SwapExecutor>> + Send + Sync + 'static,
    {
        self.factories
            .insert(name.trim().to_lowercase(), Arc::new(factory));
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn build(&self, name: &str, deps: &ExecutorDeps) -> BotResult<Arc<dyn SwapExecutor>> {
        let key = name.trim().to_lowercase();
        match self.factories.get(&key) {
            Some(factory) => factory(deps),
            None => Err(BotError::config(format!(
                "unknown swap executor '{}' (available: {})",
                name,
                self.names().join(", ")
            ))),
        }
    }

    /// Executor named by `swaps.executor`
    pub fn select(&self, deps: &ExecutorDeps) -> BotResult<Arc<dyn SwapExecutor>> {
        self.build(&deps.config.swaps.executor, deps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::SolanaRpc;

    fn deps(executor: &str) -> ExecutorDeps {
        let mut config = Config::default();
        config.swaps.executor = executor.to_string();
        let ledger = SolanaRpc::from_config(&config.rpc).unwrap();
        ExecutorDeps {
            config,
            ledger: Arc::new(ledger),
        }
    }

    #[test]
    fn test_default_executors() {
        let registry = ExecutorRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["raptor", "v3"]);

        assert_eq!(registry.select(&deps("v3")).unwrap().id(), EXECUTOR_V3);
        assert_eq!(registry.select(&deps("Raptor")).unwrap().id(), EXECUTOR_RAPTOR);
    }

    #[test]
    fn test_unknown_executor() {
        let registry = ExecutorRegistry::with_defaults();
        match registry.select(&deps("jupiter")) {
            Err(BotError::Config(message)) => assert!(message.contains("available: raptor, v3")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("unknown executor accepted"),
        }
    }
}
