/// Stages shared by every swap executor
///
/// `decode → sign → assert sendable → encode → (preflight) → submit`. Each
/// stage maps its failures onto the [`SwapStage`] it belongs to, so a failed
/// swap always names the stage that broke.
use crate::config::SwapsConfig;
use crate::errors::{BotError, BotResult, SwapStage};
use crate::logger::{self, LogTag};
use crate::rpc::{SimulationOutcome, TransactionSubmitter};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::VersionedTransaction;

/// Execution knobs taken from `[swaps]`
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub preflight: bool,
    pub price_impact_warn_pct: f64,
    pub max_price_impact_pct: Option<f64>,
    pub interactive: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&SwapsConfig::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &SwapsConfig) -> Self {
        Self {
            preflight: config.preflight,
            price_impact_warn_pct: config.price_impact_warn_pct,
            max_price_impact_pct: config.max_price_impact_pct,
            interactive: config.interactive,
        }
    }
}

/// Price-impact guard, run after quoting and before any signature is produced
pub fn check_price_impact(impact_pct: Option<f64>, settings: &PipelineSettings) -> BotResult<()> {
    let impact = match impact_pct {
        Some(impact) => impact,
        None => return Ok(()),
    };

    if let Some(max_pct) = settings.max_price_impact_pct {
        if impact > max_pct {
            return Err(BotError::PriceImpact {
                impact_pct: impact,
                max_pct,
            });
        }
    }

    if impact > settings.price_impact_warn_pct {
        let message = format!(
            "High price impact: {:.2}% (warn threshold {:.2}%)",
            impact, settings.price_impact_warn_pct
        );
        if settings.interactive {
            logger::debug(LogTag::Swap, &message);
        } else {
            logger::warning(LogTag::Swap, &message);
        }
    }
    Ok(())
}

pub fn decode_transaction(wire_b64: &str) -> BotResult<VersionedTransaction> {
    let bytes = STANDARD
        .decode(wire_b64.trim())
        .map_err(|e| BotError::stage(SwapStage::Build, format!("transaction is not base64: {}", e)))?;
    bincode::deserialize::<VersionedTransaction>(&bytes).map_err(|e| {
        BotError::stage(
            SwapStage::Build,
            format!("failed to deserialize transaction: {}", e),
        )
    })
}

pub fn encode_transaction(transaction: &VersionedTransaction) -> BotResult<String> {
    let bytes = bincode::serialize(transaction)
        .map_err(|e| BotError::stage(SwapStage::Sign, format!("failed to serialize transaction: {}", e)))?;
    Ok(STANDARD.encode(bytes))
}

/// Sign with `signer` at its position among the required signers
pub fn sign_transaction(transaction: &mut VersionedTransaction, signer: &Keypair) -> BotResult<Signature> {
    let required = usize::from(transaction.message.header().num_required_signatures);
    let pubkey = signer.pubkey();

    let index = transaction
        .message
        .static_account_keys()
        .iter()
        .take(required)
        .position(|key| *key == pubkey)
        .ok_or_else(|| {
            BotError::stage(
                SwapStage::Sign,
                format!("wallet {} is not a required signer of this transaction", pubkey),
            )
        })?;

    if transaction.signatures.len() < required {
        transaction.signatures.resize(required, Signature::default());
    }

    let signature = signer.sign_message(&transaction.message.serialize());
    transaction.signatures[index] = signature;
    Ok(signature)
}

/// Every required signature must be present before submission
pub fn assert_sendable(transaction: &VersionedTransaction) -> BotResult<()> {
    let required = usize::from(transaction.message.header().num_required_signatures);
    let missing = transaction
        .signatures
        .iter()
        .take(required)
        .filter(|sig| **sig == Signature::default())
        .count()
        + required.saturating_sub(transaction.signatures.len());

    if missing > 0 {
        return Err(BotError::stage(
            SwapStage::Sign,
            format!("{} of {} required signatures missing", missing, required),
        ));
    }
    Ok(())
}

/// Extract a transaction id from whatever shape a submitter returns
pub fn normalize_txid(response: &Value) -> Option<String> {
    match response {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => ["signature", "result", "value", "txid"]
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(normalize_txid),
        _ => None,
    }
}

/// A transaction signed and ready to submit
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub wire_b64: String,
    pub signature: Signature,
}

pub fn prepare_signed(wire_b64: &str, signer: &Keypair) -> BotResult<SignedTransaction> {
    let mut transaction = decode_transaction(wire_b64)?;
    let signature = sign_transaction(&mut transaction, signer)?;
    assert_sendable(&transaction)?;
    Ok(SignedTransaction {
        wire_b64: encode_transaction(&transaction)?,
        signature,
    })
}

/// Simulate when enabled and supported
///
/// A simulation error is fatal and carries the program logs.
pub async fn preflight(
    signed: &SignedTransaction,
    submitter: &dyn TransactionSubmitter,
    settings: &PipelineSettings,
) -> BotResult<Option<SimulationOutcome>> {
    if !settings.preflight {
        return Ok(None);
    }
    if !submitter.supports_simulation() {
        logger::info(
            LogTag::Swap,
            &format!("preflight skipped: {} does not support simulation", submitter.name()),
        );
        return Ok(None);
    }

    let outcome = submitter
        .simulate(&signed.wire_b64)
        .await
        .map_err(|e| e.at_stage(SwapStage::Simulate))?;

    if let Some(err) = &outcome.err {
        return Err(BotError::Simulation {
            error: err.to_string(),
            logs: outcome.logs.clone(),
        });
    }

    logger::debug(
        LogTag::Swap,
        &format!(
            "preflight ok ({} units)",
            outcome
                .units_consumed
                .map(|u| u.to_string())
                .unwrap_or_else(|| "?".to_string())
        ),
    );
    Ok(Some(outcome))
}

pub async fn submit(signed: &SignedTransaction, submitter: &dyn TransactionSubmitter) -> BotResult<String> {
    let response = submitter
        .send(&signed.wire_b64)
        .await
        .map_err(|e| e.at_stage(SwapStage::Send))?;

    normalize_txid(&response).ok_or_else(|| {
        BotError::stage(
            SwapStage::Send,
            format!("{} returned no transaction id: {}", submitter.name(), response),
        )
    })
}

/// Sign, optionally simulate, and submit a wire transaction
pub async fn sign_and_submit(
    wire_b64: &str,
    signer: &Keypair,
    submitter: &dyn TransactionSubmitter,
    settings: &PipelineSettings,
) -> BotResult<String> {
    let signed = prepare_signed(wire_b64, signer)?;
    preflight(&signed, submitter, settings).await?;

    let txid = submit(&signed, submitter).await?;
    logger::info(
        LogTag::Swap,
        &format!("submitted via {}: {}", submitter.name(), txid),
    );
    Ok(txid)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use solana_sdk::hash::Hash;
    use solana_sdk::instruction::{AccountMeta, Instruction};
    use solana_sdk::message::{Message, VersionedMessage};
    use solana_sdk::pubkey::Pubkey;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Unsigned wire transaction with `payer` as the only signer
    pub fn unsigned_wire(payer: &Pubkey) -> String {
        let instruction = Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[1, 2, 3],
            vec![AccountMeta::new(*payer, true), AccountMeta::new(Pubkey::new_unique(), false)],
        );
        let message = Message::new_with_blockhash(&[instruction], Some(payer), &Hash::new_unique());
        let transaction = VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::Legacy(message),
        };
        encode_transaction(&transaction).unwrap()
    }

    /// Submitter double recording every call
    #[derive(Default)]
    pub struct StubSubmitter {
        pub simulation_support: bool,
        pub simulation_err: Option<Value>,
        pub simulate_calls: AtomicUsize,
        pub send_calls: AtomicUsize,
    }

    impl StubSubmitter {
        pub fn simulating() -> Self {
            Self {
                simulation_support: true,
                ..Self::default()
            }
        }

        pub fn sends(&self) -> usize {
            self.send_calls.load(Ordering::SeqCst)
        }

        pub fn simulations(&self) -> usize {
            self.simulate_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TransactionSubmitter for StubSubmitter {
        fn name(&self) -> &str {
            "stub"
        }

        fn supports_simulation(&self) -> bool {
            self.simulation_support
        }

        async fn simulate(&self, wire_b64: &str) -> BotResult<SimulationOutcome> {
            self.simulate_calls.fetch_add(1, Ordering::SeqCst);
            assert_sendable(&decode_transaction(wire_b64)?)?;
            Ok(SimulationOutcome {
                err: self.simulation_err.clone(),
                logs: vec!["Program log: stub".to_string()],
                units_consumed: Some(1000),
            })
        }

        async fn send(&self, wire_b64: &str) -> BotResult<Value> {
            self.send_calls.fetch_add(1, Ordering::SeqCst);
            let transaction = decode_transaction(wire_b64)?;
            Ok(json!({ "result": transaction.signatures[0].to_string() }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_txid_shapes() {
        assert_eq!(normalize_txid(&json!("abc")), Some("abc".to_string()));
        assert_eq!(normalize_txid(&json!({"signature": "s1"})), Some("s1".to_string()));
        assert_eq!(normalize_txid(&json!({"result": "r1"})), Some("r1".to_string()));
        assert_eq!(normalize_txid(&json!({"value": {"txid": "t1"}})), Some("t1".to_string()));
        assert_eq!(normalize_txid(&json!({"other": "x"})), None);
        assert_eq!(normalize_txid(&json!("  ")), None);
        assert_eq!(normalize_txid(&Value::Null), None);
    }

    #[test]
    fn test_sign_fills_required_signature() {
        let signer = Keypair::new();
        let signed = prepare_signed(&unsigned_wire(&signer.pubkey()), &signer).unwrap();

        let transaction = decode_transaction(&signed.wire_b64).unwrap();
        assert_eq!(transaction.signatures[0], signed.signature);
        assert!(assert_sendable(&transaction).is_ok());
    }

    #[test]
    fn test_foreign_signer_rejected() {
        let payer = Keypair::new();
        let other = Keypair::new();
        let err = prepare_signed(&unsigned_wire(&payer.pubkey()), &other).unwrap_err();
        assert_eq!(err.swap_stage(), Some(SwapStage::Sign));
    }

    #[test]
    fn test_unsigned_not_sendable() {
        let payer = Keypair::new();
        let transaction = decode_transaction(&unsigned_wire(&payer.pubkey())).unwrap();
        assert!(assert_sendable(&transaction).is_err());
    }

    #[test]
    fn test_garbage_is_build_failure() {
        let err = decode_transaction("not base64!").unwrap_err();
        assert_eq!(err.swap_stage(), Some(SwapStage::Build));
    }

    #[test]
    fn test_price_impact_guard() {
        let mut settings = PipelineSettings::default();
        assert!(check_price_impact(Some(5.0), &settings).is_ok());
        assert!(check_price_impact(None, &settings).is_ok());

        settings.max_price_impact_pct = Some(3.0);
        assert!(matches!(
            check_price_impact(Some(5.0), &settings),
            Err(BotError::PriceImpact { .. })
        ));
        assert!(check_price_impact(Some(2.5), &settings).is_ok());
    }

    #[tokio::test]
    async fn test_simulation_error_is_fatal() {
        let signer = Keypair::new();
        let submitter = StubSubmitter {
            simulation_err: Some(json!({"InstructionError": [0, "Custom"]})),
            ..StubSubmitter::simulating()
        };

        let err = sign_and_submit(
            &unsigned_wire(&signer.pubkey()),
            &signer,
            &submitter,
            &PipelineSettings::default(),
        )
        .await
        .unwrap_err();

        match err {
            BotError::Simulation { logs, .. } => assert_eq!(logs, vec!["Program log: stub".to_string()]),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(submitter.sends(), 0);
    }

    #[tokio::test]
    async fn test_submit_without_simulation_support() {
        let signer = Keypair::new();
        let submitter = StubSubmitter::default();

        let txid = sign_and_submit(
            &unsigned_wire(&signer.pubkey()),
            &signer,
            &submitter,
            &PipelineSettings::default(),
        )
        .await
        .unwrap();

        assert_eq!(submitter.simulations(), 0);
        assert_eq!(submitter.sends(), 1);
        assert!(!txid.is_empty());
    }
}
