use super::{SignatureStatus, SignatureStatusSource, SimulationOutcome, TokenLedger, TransactionSubmitter};
use crate::config::RpcConfig;
use crate::errors::{BotError, BotResult, NetworkError};
use crate::logger::{self, LogTag};
use crate::swaps::normalize::{SOL_DECIMALS, SOL_MINT};
use async_trait::async_trait;
use serde_json::{json, Value};
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;

/// Minimal JSON-RPC 2.0 client over HTTP
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> BotResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BotError::internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one JSON-RPC call and return its `result`
    pub async fn call(&self, method: &str, params: Value) -> BotResult<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        logger::verbose(LogTag::Rpc, &format!("→ {} {}", method, self.url));

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(&self.url, &e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| NetworkError::from_reqwest(&self.url, &e))?;

        if !status.is_success() {
            return Err(NetworkError::http_status(&self.url, status.as_u16(), &text).into());
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| BotError::parse(format!("{} returned invalid JSON: {}", method, e)))?;

        extract_result(method, value)
    }
}

/// Split a JSON-RPC response into its result or error object
pub(crate) fn extract_result(method: &str, mut value: Value) -> BotResult<Value> {
    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error")
            .to_string();
        return Err(BotError::Rpc { code, message });
    }

    match value.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(BotError::parse(format!("{} response has no result", method))),
    }
}

/// Node-backed implementation of the submission, ledger and status traits
#[derive(Debug, Clone)]
pub struct SolanaRpc {
    client: RpcClient,
}

impl SolanaRpc {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &RpcConfig) -> BotResult<Self> {
        let client = RpcClient::new(
            config.url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }
}

#[async_trait]
impl TransactionSubmitter for SolanaRpc {
    fn name(&self) -> &str {
        "rpc"
    }

    fn supports_simulation(&self) -> bool {
        true
    }

    async fn simulate(&self, wire_b64: &str) -> BotResult<SimulationOutcome> {
        let params = json!([
            wire_b64,
            {
                "encoding": "base64",
                "commitment": "confirmed",
                "replaceRecentBlockhash": false,
                "sigVerify": true
            }
        ]);
        let result = self.client.call("simulateTransaction", params).await?;
        let value = result.get("value").cloned().unwrap_or(Value::Null);
        Ok(SimulationOutcome::from_value(&value))
    }

    async fn send(&self, wire_b64: &str) -> BotResult<Value> {
        // Preflight is a separate, optional stage; the node must not repeat it
        let params = json!([
            wire_b64,
            {
                "encoding": "base64",
                "skipPreflight": true,
                "preflightCommitment": "confirmed",
                "maxRetries": 3
            }
        ]);
        self.client.call("sendTransaction", params).await
    }
}

#[async_trait]
impl TokenLedger for SolanaRpc {
    async fn token_decimals(&self, mint: &str) -> BotResult<u8> {
        if mint == SOL_MINT {
            return Ok(SOL_DECIMALS);
        }

        let result = self.client.call("getTokenSupply", json!([mint])).await?;
        result
            .get("value")
            .and_then(|v| v.get("decimals"))
            .and_then(|d| d.as_u64())
            .and_then(|d| u8::try_from(d).ok())
            .ok_or_else(|| BotError::parse(format!("getTokenSupply for {} has no decimals", mint)))
    }

    async fn sol_balance(&self, owner: &Pubkey) -> BotResult<u64> {
        let params = json!([owner.to_string(), { "commitment": "confirmed" }]);
        let result = self.client.call("getBalance", params).await?;
        result
            .get("value")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| BotError::parse("getBalance response has no value"))
    }

    async fn token_balance(&self, owner: &Pubkey, mint: &str) -> BotResult<u64> {
        let params = json!([
            owner.to_string(),
            { "mint": mint },
            { "encoding": "jsonParsed", "commitment": "confirmed" }
        ]);
        let result = self.client.call("getTokenAccountsByOwner", params).await?;
        sum_token_amounts(&result)
    }
}

/// Sum `tokenAmount.amount` over every parsed account in the response
fn sum_token_amounts(result: &Value) -> BotResult<u64> {
    let accounts = match result.get("value").and_then(|v| v.as_array()) {
        Some(accounts) => accounts,
        None => return Ok(0),
    };

    let mut total: u64 = 0;
    for account in accounts {
        let amount = account
            .pointer("/account/data/parsed/info/tokenAmount/amount")
            .and_then(|a| a.as_str());
        if let Some(amount) = amount {
            let units = amount
                .parse::<u64>()
                .map_err(|e| BotError::parse(format!("Failed to parse token amount: {}", e)))?;
            total = total.saturating_add(units);
        }
    }
    Ok(total)
}

#[async_trait]
impl SignatureStatusSource for SolanaRpc {
    async fn signature_status(&self, signature: &str) -> BotResult<Option<SignatureStatus>> {
        let params = json!([[signature], { "searchTransactionHistory": true }]);
        let result = self.client.call("getSignatureStatuses", params).await?;

        match result
            .get("value")
            .and_then(|v| v.as_array())
            .and_then(|v| v.first())
        {
            Some(status) if !status.is_null() => Ok(Some(serde_json::from_value(status.clone())?)),
            _ => Ok(None),
        }
    }
}
