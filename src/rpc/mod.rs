/// RPC access for swap execution
///
/// The swap pipeline only needs three capabilities from a node, each behind
/// its own trait so executors and the monitor can be driven by stubs:
/// - [`TransactionSubmitter`]: simulate and send a signed wire transaction
/// - [`TokenLedger`]: token decimals and wallet balances
/// - [`SignatureStatusSource`]: confirmation status of a signature
pub mod client;
pub mod jito;

pub use client::{RpcClient, SolanaRpc};
pub use jito::JitoSubmitter;

use crate::errors::BotResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;

/// Result of `simulateTransaction`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationOutcome {
    /// Non-null when the transaction would fail
    pub err: Option<Value>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

impl SimulationOutcome {
    pub fn from_value(value: &Value) -> Self {
        let err = value.get("err").filter(|e| !e.is_null()).cloned();
        let logs = value
            .get("logs")
            .and_then(|l| l.as_array())
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|l| l.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let units_consumed = value.get("unitsConsumed").and_then(|u| u.as_u64());

        Self {
            err,
            logs,
            units_consumed,
        }
    }

    pub fn failed(&self) -> bool {
        self.err.is_some()
    }
}

/// One entry of `getSignatureStatuses`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    pub slot: u64,
    pub confirmations: Option<u64>,
    #[serde(default)]
    pub err: Option<Value>,
    pub confirmation_status: Option<String>,
}

#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    fn name(&self) -> &str;

    fn supports_simulation(&self) -> bool;

    /// Simulate a base64 wire transaction
    async fn simulate(&self, wire_b64: &str) -> BotResult<SimulationOutcome>;

    /// Send a base64 wire transaction; returns the raw response value
    async fn send(&self, wire_b64: &str) -> BotResult<Value>;
}

#[async_trait]
pub trait TokenLedger: Send + Sync {
    async fn token_decimals(&self, mint: &str) -> BotResult<u8>;

    /// Native balance in lamports
    async fn sol_balance(&self, owner: &Pubkey) -> BotResult<u64>;

    /// Raw balance in base units, summed over the owner's accounts for `mint`
    async fn token_balance(&self, owner: &Pubkey, mint: &str) -> BotResult<u64>;
}

#[async_trait]
pub trait SignatureStatusSource: Send + Sync {
    /// `None` while the node has not seen the signature
    async fn signature_status(&self, signature: &str) -> BotResult<Option<SignatureStatus>>;
}

/// Rank of a commitment level; unknown names rank lowest
fn commitment_rank(level: &str) -> u8 {
    match level {
        "processed" => 1,
        "confirmed" => 2,
        "finalized" => 3,
        _ => 0,
    }
}

/// True when `status` is at or beyond the `target` commitment
pub fn commitment_reached(status: &str, target: &str) -> bool {
    let target = commitment_rank(target);
    target > 0 && commitment_rank(status) >= target
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_commitment_ordering() {
        assert!(commitment_reached("finalized", "confirmed"));
        assert!(commitment_reached("confirmed", "confirmed"));
        assert!(commitment_reached("confirmed", "processed"));
        assert!(!commitment_reached("processed", "confirmed"));
        assert!(!commitment_reached("confirmed", "finalized"));
        assert!(!commitment_reached("finalized", "bogus"));
    }

    #[test]
    fn test_simulation_outcome_parsing() {
        let ok = SimulationOutcome::from_value(&json!({
            "err": null,
            "logs": ["Program log: ok"],
            "unitsConsumed": 4200
        }));
        assert!(!ok.failed());
        assert_eq!(ok.logs, vec!["Program log: ok".to_string()]);
        assert_eq!(ok.units_consumed, Some(4200));

        let failed = SimulationOutcome::from_value(&json!({
            "err": {"InstructionError": [2, {"Custom": 6001}]},
            "logs": null
        }));
        assert!(failed.failed());
        assert!(failed.logs.is_empty());
    }

    #[test]
    fn test_signature_status_deserializes() {
        let status: SignatureStatus = serde_json::from_value(json!({
            "slot": 321,
            "confirmations": null,
            "err": null,
            "confirmationStatus": "finalized"
        }))
        .unwrap();
        assert_eq!(status.slot, 321);
        assert_eq!(status.err, None);
        assert_eq!(status.confirmation_status.as_deref(), Some("finalized"));
    }
}
