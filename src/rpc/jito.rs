/// Block-engine submission
///
/// The block engine accepts `sendTransaction` only; it cannot simulate, so a
/// preflight request is skipped by the pipeline rather than failing.
use super::client::RpcClient;
use super::{SimulationOutcome, TransactionSubmitter};
use crate::config::RpcConfig;
use crate::errors::{BotError, BotResult, SwapStage};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct JitoSubmitter {
    client: RpcClient,
}

impl JitoSubmitter {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &RpcConfig) -> BotResult<Self> {
        if config.jito_url.trim().is_empty() {
            return Err(BotError::config("rpc.jito_url is empty but useJito was requested"));
        }
        let client = RpcClient::new(
            config.jito_url.trim().to_string(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl TransactionSubmitter for JitoSubmitter {
    fn name(&self) -> &str {
        "jito"
    }

    fn supports_simulation(&self) -> bool {
        false
    }

    async fn simulate(&self, _wire_b64: &str) -> BotResult<SimulationOutcome> {
        Err(BotError::stage(
            SwapStage::Simulate,
            "block engine does not support simulation",
        ))
    }

    async fn send(&self, wire_b64: &str) -> BotResult<Value> {
        let params = json!([wire_b64, { "encoding": "base64" }]);
        self.client.call("sendTransaction", params).await
    }
}
