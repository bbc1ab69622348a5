/// V3 swap transport
///
/// One GET request returns a ready-to-sign wire transaction together with the
/// rate it was priced at. Amounts travel as the canonical UI string, so
/// percentages and `auto` are resolved by the service.
use super::normalize::{normalize_price_impact, Side, SOL_MINT};
use super::pipeline::{self, PipelineSettings};
use super::router::{SwapExecutor, SwapRequest, EXECUTOR_V3};
use super::types::{deserialize_optional_f64, ExecutionResult, QuoteSummary};
use super::validator::SwapInstruction;
use crate::config::QuotesConfig;
use crate::errors::{body_snippet, BotError, BotResult, NetworkError, SwapStage};
use crate::logger::{self, LogTag};
use crate::retry::{with_retry, RetryOptions};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solana_sdk::signer::Signer;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// API TYPES
// ============================================================================

/// Query string of `GET /swap`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct V3SwapQuery {
    pub from: String,
    pub to: String,
    #[serde(rename = "fromAmount")]
    pub from_amount: String,
    pub slippage: f64,
    pub payer: String,
    #[serde(rename = "priorityFee", skip_serializing_if = "Option::is_none")]
    pub priority_fee: Option<String>,
    #[serde(rename = "priorityFeeLevel", skip_serializing_if = "Option::is_none")]
    pub priority_fee_level: Option<String>,
    #[serde(rename = "txVersion", skip_serializing_if = "Option::is_none")]
    pub tx_version: Option<String>,
}

impl V3SwapQuery {
    pub fn for_instruction(instruction: &SwapInstruction, payer: String) -> Self {
        let (from, to) = match instruction.side {
            Side::Buy => (SOL_MINT.to_string(), instruction.mint.clone()),
            Side::Sell => (instruction.mint.clone(), SOL_MINT.to_string()),
        };
        Self {
            from,
            to,
            from_amount: instruction.amount.canonical(),
            slippage: instruction.slippage_percent,
            payer,
            priority_fee: instruction.priority_fee.map(|fee| fee.to_param()),
            priority_fee_level: instruction
                .priority_fee_level
                .map(|level| level.as_str().to_string()),
            tx_version: instruction.tx_version.map(|v| v.as_str().to_string()),
        }
    }
}

/// Rate object returned next to the transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V3Rate {
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub amount_in: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub amount_out: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub min_amount_out: Option<f64>,
    #[serde(default)]
    pub price_impact: Option<Value>,
    /// Network fee in SOL
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub fee: Option<f64>,
    /// Platform fee in SOL
    #[serde(default, rename = "platformFeeUI", deserialize_with = "deserialize_optional_f64")]
    pub platform_fee_ui: Option<f64>,
}

impl V3Rate {
    pub fn summary(&self) -> QuoteSummary {
        let fee_total = match (self.fee, self.platform_fee_ui) {
            (None, None) => None,
            (fee, platform) => Some(fee.unwrap_or(0.0) + platform.unwrap_or(0.0)),
        };
        QuoteSummary {
            amount_in: self.amount_in,
            amount_out: self.amount_out,
            fee_total,
            price_impact_percent: normalize_price_impact(self.price_impact.as_ref()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct V3SwapResponse {
    /// Base64 wire transaction
    pub txn: String,
    pub rate: V3Rate,
    pub raw: Value,
}

/// Parse a `GET /swap` response
///
/// Non-2xx statuses become network errors (retryable for 5xx/429); a 2xx body
/// without `txn` is a fatal build failure.
pub fn decode_swap_response(endpoint: &str, status: u16, body: &str) -> BotResult<V3SwapResponse> {
    if !(200..300).contains(&status) {
        return Err(NetworkError::http_status(endpoint, status, body).into());
    }

    let raw: Value = serde_json::from_str(body).map_err(|e| {
        BotError::api(
            SwapStage::Build,
            format!("invalid JSON in response (status {}): {}, body: {}", status, e, body_snippet(body)),
        )
    })?;

    let txn = match raw.get("txn").and_then(|t| t.as_str()) {
        Some(txn) if !txn.trim().is_empty() => txn.trim().to_string(),
        _ => {
            return Err(BotError::api(
                SwapStage::Build,
                format!(
                    "missing `txn` in response (status {}, body: {})",
                    status,
                    body_snippet(body)
                ),
            ))
        }
    };

    let rate = match raw.get("rate") {
        Some(rate) if rate.is_object() => serde_json::from_value(rate.clone()).unwrap_or_default(),
        _ => V3Rate::default(),
    };

    Ok(V3SwapResponse { txn, rate, raw })
}

// ============================================================================
// CLIENT
// ============================================================================

#[async_trait]
pub trait V3Api: Send + Sync {
    async fn swap(&self, query: &V3SwapQuery) -> BotResult<V3SwapResponse>;
}

pub struct V3Client {
    http: Client,
    base_url: String,
    api_key: String,
    retry: RetryOptions,
}

impl V3Client {
    pub fn from_config(config: &QuotesConfig) -> BotResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BotError::internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.v3_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry: RetryOptions::from_quotes_config(config).with_label("v3 swap quote"),
        })
    }

    async fn fetch(&self, query: &V3SwapQuery) -> BotResult<V3SwapResponse> {
        let url = format!("{}/swap", self.base_url);
        let mut request = self.http.get(&url).query(query);
        if !self.api_key.is_empty() {
            request = request.header("x-api-key", &self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(&url, &e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| NetworkError::from_reqwest(&url, &e))?;

        decode_swap_response(&url, status, &body)
    }
}

#[async_trait]
impl V3Api for V3Client {
    async fn swap(&self, query: &V3SwapQuery) -> BotResult<V3SwapResponse> {
        with_retry(|| self.fetch(query), &self.retry).await
    }
}

// ============================================================================
// EXECUTOR
// ============================================================================

pub struct V3Executor {
    api: Arc<dyn V3Api>,
    settings: PipelineSettings,
}

impl V3Executor {
    pub fn new(api: Arc<dyn V3Api>, settings: PipelineSettings) -> Self {
        Self { api, settings }
    }
}

#[async_trait]
impl SwapExecutor for V3Executor {
    fn id(&self) -> &str {
        EXECUTOR_V3
    }

    fn name(&self) -> &str {
        "SolanaTracker V3"
    }

    async fn execute(&self, request: SwapRequest<'_>) -> BotResult<ExecutionResult> {
        let instruction = request.instruction;
        let query = V3SwapQuery::for_instruction(instruction, request.signer.pubkey().to_string());

        logger::debug(
            LogTag::Quote,
            &format!(
                "V3 quote {} {} {} (slippage {}%)",
                instruction.side, query.from_amount, instruction.mint, instruction.slippage_percent
            ),
        );

        let response = self
            .api
            .swap(&query)
            .await
            .map_err(|e| e.at_stage(SwapStage::Build))?;

        let summary = response.rate.summary();
        if instruction.show_quote_details {
            logger::info(
                LogTag::Quote,
                &format!(
                    "📊 V3 quote: in={:?} out={:?} fees={:?} impact={:?}%",
                    summary.amount_in, summary.amount_out, summary.fee_total, summary.price_impact_percent
                ),
            );
        }
        pipeline::check_price_impact(summary.price_impact_percent, &self.settings)?;

        let raw = json!({ "rate": response.rate, "response": response.raw });
        let result = ExecutionResult::new(
            EXECUTOR_V3,
            instruction.dry_run,
            summary.economics(instruction.side),
            raw,
        );

        if instruction.dry_run {
            // Checked for well-formedness only; a dry run never signs
            pipeline::decode_transaction(&response.txn)?;
            logger::info(LogTag::Swap, "Dry run: V3 transaction built, not signed or sent");
            return Ok(result);
        }

        let txid = pipeline::sign_and_submit(
            &response.txn,
            request.signer,
            request.submitter,
            &self.settings,
        )
        .await?;

        Ok(result.with_txid(txid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swaps::pipeline::test_support::{unsigned_wire, StubSubmitter};
    use crate::swaps::validator::validate_swap_payload;
    use solana_sdk::signature::Keypair;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    struct StubApi {
        status: u16,
        body: String,
        calls: AtomicUsize,
    }

    impl StubApi {
        fn new(status: u16, body: String) -> Self {
            Self {
                status,
                body,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl V3Api for StubApi {
        async fn swap(&self, _query: &V3SwapQuery) -> BotResult<V3SwapResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            decode_swap_response("https://stub/swap", self.status, &self.body)
        }
    }

    fn instruction(side: &str, amount: &str, dry_run: bool) -> SwapInstruction {
        validate_swap_payload(&json!({
            "side": side,
            "mint": BONK,
            "amount": amount,
            "walletAlias": "main",
            "dryRun": dry_run,
            "priorityFeeLevel": "high"
        }))
        .unwrap()
    }

    #[test]
    fn test_query_for_sell() {
        let query = V3SwapQuery::for_instruction(&instruction("sell", "50%", false), "payer".to_string());
        assert_eq!(query.from, BONK);
        assert_eq!(query.to, SOL_MINT);
        assert_eq!(query.from_amount, "50%");
        assert_eq!(query.priority_fee_level.as_deref(), Some("high"));
        assert_eq!(query.tx_version, None);
    }

    #[test]
    fn test_non_2xx_carries_status_and_snippet() {
        let err = decode_swap_response("https://stub/swap", 400, "bad amount").unwrap_err();
        assert!(!err.is_transient());
        let message = err.to_string();
        assert!(message.contains("400"));
        assert!(message.contains("bad amount"));

        assert!(decode_swap_response("https://stub/swap", 503, "busy").unwrap_err().is_transient());
    }

    #[test]
    fn test_rate_summary() {
        let response = decode_swap_response(
            "https://stub/swap",
            200,
            r#"{"txn":"AAAA","rate":{"amountIn":"0.5","amountOut":1000,"priceImpact":0.012,"fee":0.000005,"platformFeeUI":0.001}}"#,
        )
        .unwrap();
        let summary = response.rate.summary();
        assert_eq!(summary.amount_in, Some(0.5));
        assert_eq!(summary.amount_out, Some(1000.0));
        assert!((summary.price_impact_percent.unwrap() - 1.2).abs() < 1e-9);
        assert!((summary.fee_total.unwrap() - 0.001005).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_missing_txn_stops_pipeline() {
        let api = Arc::new(StubApi::new(200, r#"{"rate":{"amountIn":1}}"#.to_string()));
        let executor = V3Executor::new(api.clone(), PipelineSettings::default());
        let submitter = StubSubmitter::simulating();
        let signer = Keypair::new();
        let instruction = instruction("buy", "0.1", false);

        let err = executor
            .execute(SwapRequest {
                instruction: &instruction,
                signer: &signer,
                submitter: &submitter,
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("missing `txn` in response"));
        assert_eq!(err.swap_stage(), Some(SwapStage::Build));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert_eq!(submitter.simulations(), 0);
        assert_eq!(submitter.sends(), 0);
    }

    #[tokio::test]
    async fn test_live_swap_signs_and_submits() {
        let signer = Keypair::new();
        let body = json!({
            "txn": unsigned_wire(&signer.pubkey()),
            "rate": {"amountIn": 0.1, "amountOut": 5000, "priceImpact": 0.5}
        });
        let api = Arc::new(StubApi::new(200, body.to_string()));
        let executor = V3Executor::new(api, PipelineSettings::default());
        let submitter = StubSubmitter::simulating();
        let instruction = instruction("buy", "0.1", false);

        let result = executor
            .execute(SwapRequest {
                instruction: &instruction,
                signer: &signer,
                submitter: &submitter,
            })
            .await
            .unwrap();

        assert!(result.txid.is_some());
        assert_eq!(result.sol_received_decimal, Some(-0.1));
        assert_eq!(result.tokens_received_decimal, Some(5000.0));
        assert_eq!(result.price_impact_percent, Some(50.0));
        assert_eq!(submitter.simulations(), 1);
        assert_eq!(submitter.sends(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_never_submits() {
        let signer = Keypair::new();
        let body = json!({"txn": unsigned_wire(&signer.pubkey()), "rate": {"amountIn": 100, "amountOut": 0.2}});
        let executor = V3Executor::new(Arc::new(StubApi::new(200, body.to_string())), PipelineSettings::default());
        let submitter = StubSubmitter::simulating();
        let instruction = instruction("sell", "100", true);

        let result = executor
            .execute(SwapRequest {
                instruction: &instruction,
                signer: &signer,
                submitter: &submitter,
            })
            .await
            .unwrap();

        assert!(result.dry_run);
        assert_eq!(result.txid, None);
        assert_eq!(result.sol_received_decimal, Some(0.2));
        assert_eq!(submitter.sends(), 0);
    }

    #[tokio::test]
    async fn test_price_impact_ceiling_blocks_signing() {
        let signer = Keypair::new();
        let body = json!({"txn": unsigned_wire(&signer.pubkey()), "rate": {"priceImpact": 12}});
        let settings = PipelineSettings {
            max_price_impact_pct: Some(10.0),
            ..PipelineSettings::default()
        };
        let executor = V3Executor::new(Arc::new(StubApi::new(200, body.to_string())), settings);
        let submitter = StubSubmitter::simulating();
        let instruction = instruction("buy", "1", false);

        let err = executor
            .execute(SwapRequest {
                instruction: &instruction,
                signer: &signer,
                submitter: &submitter,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BotError::PriceImpact { .. }));
        assert_eq!(submitter.simulations() + submitter.sends(), 0);
    }
}
