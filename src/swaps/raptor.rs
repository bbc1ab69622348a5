/// Raptor swap transport
///
/// Quote and transaction building are separate calls: `GET /quote` prices a
/// swap without producing anything signable (used for dry runs), while
/// `POST /quote-and-swap` returns the quote together with a wire transaction.
/// All amounts are integer base units.
use super::normalize::{
    from_base_units, normalize_price_impact, percent_of_units, to_base_units, Amount, Side,
    SOL_DECIMALS, SOL_MINT,
};
use super::pipeline::{self, PipelineSettings};
use super::router::{SwapExecutor, SwapRequest, EXECUTOR_RAPTOR};
use super::types::{ExecutionResult, QuoteSummary};
use super::validator::SwapInstruction;
use crate::config::QuotesConfig;
use crate::errors::{body_snippet, BotError, BotResult, NetworkError, SwapStage};
use crate::logger::{self, LogTag};
use crate::retry::{with_retry, RetryOptions};
use crate::rpc::TokenLedger;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signer::Signer;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// API TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaptorQuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u64,
    pub slippage_bps: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaptorSwapRequest {
    pub user_public_key: String,
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u64,
    pub slippage_bps: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_fee: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RaptorSwapResponse {
    pub swap_transaction: String,
    pub quote: Value,
    pub last_valid_block_height: Option<u64>,
}

/// Parse a `POST /quote-and-swap` body
pub fn decode_swap_response(status: u16, body: &str) -> BotResult<RaptorSwapResponse> {
    let raw: Value = serde_json::from_str(body).map_err(|e| {
        BotError::api(
            SwapStage::Build,
            format!("invalid JSON in response (status {}): {}, body: {}", status, e, body_snippet(body)),
        )
    })?;

    let swap_transaction = match raw.get("swapTransaction").and_then(|t| t.as_str()) {
        Some(tx) if !tx.trim().is_empty() => tx.trim().to_string(),
        _ => {
            return Err(BotError::api(
                SwapStage::Build,
                format!(
                    "missing `swapTransaction` in response (status {}, body: {})",
                    status,
                    body_snippet(body)
                ),
            ))
        }
    };

    Ok(RaptorSwapResponse {
        swap_transaction,
        quote: raw.get("quote").cloned().unwrap_or(Value::Null),
        last_valid_block_height: raw.get("lastValidBlockHeight").and_then(|h| h.as_u64()),
    })
}

/// Base-unit amount field of a quote (`inAmount`/`outAmount`), string or number
fn quote_units(quote: &Value, field: &str) -> Option<u64> {
    match quote.get(field)? {
        Value::String(s) => s.trim().parse::<u64>().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// Normalize a Raptor quote into UI units
pub fn summarize_quote(quote: &Value, in_decimals: u8, out_decimals: u8) -> QuoteSummary {
    let ui = |units: Option<u64>, decimals: u8| {
        units.and_then(|u| from_base_units(u, decimals).to_f64())
    };

    let impact = quote
        .get("priceImpactPct")
        .or_else(|| quote.get("priceImpact"));

    let fee_total = quote_units(quote, "feeLamports")
        .or_else(|| quote.get("fee").and_then(|f| quote_units(f, "amount")))
        .and_then(|lamports| from_base_units(lamports, SOL_DECIMALS).to_f64());

    QuoteSummary {
        amount_in: ui(quote_units(quote, "inAmount"), in_decimals),
        amount_out: ui(quote_units(quote, "outAmount"), out_decimals),
        fee_total,
        price_impact_percent: normalize_price_impact(impact),
    }
}

// ============================================================================
// CLIENT
// ============================================================================

#[async_trait]
pub trait RaptorApi: Send + Sync {
    async fn quote(&self, request: &RaptorQuoteRequest) -> BotResult<Value>;

    async fn quote_and_swap(&self, request: &RaptorSwapRequest) -> BotResult<RaptorSwapResponse>;
}

pub struct RaptorClient {
    http: Client,
    base_url: String,
    api_key: String,
    retry: RetryOptions,
}

impl RaptorClient {
    pub fn from_config(config: &QuotesConfig) -> BotResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BotError::internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.raptor_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry: RetryOptions::from_quotes_config(config),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.header("x-api-key", &self.api_key)
        }
    }

    /// Send and return `(status, body)`; non-2xx becomes a network error
    async fn send(&self, url: &str, request: reqwest::RequestBuilder) -> BotResult<(u16, String)> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(url, &e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| NetworkError::from_reqwest(url, &e))?;

        if !(200..300).contains(&status) {
            return Err(NetworkError::http_status(url, status, &body).into());
        }
        Ok((status, body))
    }

    async fn fetch_quote(&self, request: &RaptorQuoteRequest) -> BotResult<Value> {
        let url = format!("{}/quote", self.base_url);
        let (status, body) = self.send(&url, self.http.get(&url).query(request)).await?;
        serde_json::from_str(&body).map_err(|e| {
            BotError::api(
                SwapStage::Build,
                format!("invalid quote JSON (status {}): {}, body: {}", status, e, body_snippet(&body)),
            )
        })
    }

    async fn fetch_swap(&self, request: &RaptorSwapRequest) -> BotResult<RaptorSwapResponse> {
        let url = format!("{}/quote-and-swap", self.base_url);
        let (status, body) = self.send(&url, self.http.post(&url).json(request)).await?;
        decode_swap_response(status, &body)
    }
}

#[async_trait]
impl RaptorApi for RaptorClient {
    async fn quote(&self, request: &RaptorQuoteRequest) -> BotResult<Value> {
        let options = self.retry.clone().with_label("raptor quote");
        with_retry(|| self.fetch_quote(request), &options).await
    }

    async fn quote_and_swap(&self, request: &RaptorSwapRequest) -> BotResult<RaptorSwapResponse> {
        let options = self.retry.clone().with_label("raptor quote-and-swap");
        with_retry(|| self.fetch_swap(request), &options).await
    }
}

// ============================================================================
// EXECUTOR
// ============================================================================

pub struct RaptorExecutor {
    api: Arc<dyn RaptorApi>,
    ledger: Arc<dyn TokenLedger>,
    settings: PipelineSettings,
}

/// Mints and base-unit amount of one swap
#[derive(Debug, Clone, PartialEq)]
pub struct RaptorLeg {
    pub input_mint: String,
    pub output_mint: String,
    pub in_decimals: u8,
    pub out_decimals: u8,
    pub amount: u64,
}

impl RaptorExecutor {
    pub fn new(api: Arc<dyn RaptorApi>, ledger: Arc<dyn TokenLedger>, settings: PipelineSettings) -> Self {
        Self {
            api,
            ledger,
            settings,
        }
    }

    /// Resolve mints, decimals and the integer input amount
    pub async fn plan(&self, instruction: &SwapInstruction, owner: &Pubkey) -> BotResult<RaptorLeg> {
        let (input_mint, output_mint) = match instruction.side {
            Side::Buy => (SOL_MINT.to_string(), instruction.mint.clone()),
            Side::Sell => (instruction.mint.clone(), SOL_MINT.to_string()),
        };

        let in_decimals = self
            .ledger
            .token_decimals(&input_mint)
            .await
            .map_err(|e| e.at_stage(SwapStage::Build))?;
        let out_decimals = self
            .ledger
            .token_decimals(&output_mint)
            .await
            .map_err(|e| e.at_stage(SwapStage::Build))?;

        let amount = match &instruction.amount {
            Amount::Decimal(amount) => to_base_units(*amount, in_decimals)?,
            Amount::Percent(pct) => {
                let balance = self.input_balance(instruction.side, owner, &input_mint).await?;
                nonzero_share(percent_of_units(balance, *pct), &instruction.amount)?
            }
            Amount::Auto => {
                let balance = self.input_balance(instruction.side, owner, &input_mint).await?;
                nonzero_share(balance, &instruction.amount)?
            }
        };

        Ok(RaptorLeg {
            input_mint,
            output_mint,
            in_decimals,
            out_decimals,
            amount,
        })
    }

    async fn input_balance(&self, side: Side, owner: &Pubkey, input_mint: &str) -> BotResult<u64> {
        let balance = match side {
            Side::Buy => self.ledger.sol_balance(owner).await,
            Side::Sell => self.ledger.token_balance(owner, input_mint).await,
        };
        balance.map_err(|e| e.at_stage(SwapStage::Build))
    }
}

fn nonzero_share(units: u64, amount: &Amount) -> BotResult<u64> {
    if units == 0 {
        return Err(BotError::validation(
            "amount",
            format!("{} of the wallet balance is zero base units", amount),
        ));
    }
    Ok(units)
}

#[async_trait]
impl SwapExecutor for RaptorExecutor {
    fn id(&self) -> &str {
        EXECUTOR_RAPTOR
    }

    fn name(&self) -> &str {
        "Raptor"
    }

    async fn execute(&self, request: SwapRequest<'_>) -> BotResult<ExecutionResult> {
        let instruction = request.instruction;
        let owner = request.signer.pubkey();
        let leg = self.plan(instruction, &owner).await?;

        logger::debug(
            LogTag::Quote,
            &format!(
                "Raptor {} {} → {} amount={} ({} units) slippage={}bps",
                instruction.side,
                leg.input_mint,
                leg.output_mint,
                describe_units(leg.amount, leg.in_decimals),
                leg.amount,
                instruction.slippage_bps()
            ),
        );

        let (quote, transaction) = if instruction.dry_run {
            let quote = self
                .api
                .quote(&RaptorQuoteRequest {
                    input_mint: leg.input_mint.clone(),
                    output_mint: leg.output_mint.clone(),
                    amount: leg.amount,
                    slippage_bps: instruction.slippage_bps(),
                })
                .await
                .map_err(|e| e.at_stage(SwapStage::Build))?;
            (quote, None)
        } else {
            let response = self
                .api
                .quote_and_swap(&RaptorSwapRequest {
                    user_public_key: owner.to_string(),
                    input_mint: leg.input_mint.clone(),
                    output_mint: leg.output_mint.clone(),
                    amount: leg.amount,
                    slippage_bps: instruction.slippage_bps(),
                    priority_fee: instruction
                        .priority_fee
                        .and_then(|fee| serde_json::to_value(fee).ok()),
                    tx_version: instruction.tx_version.map(|v| v.as_str().to_string()),
                })
                .await
                .map_err(|e| e.at_stage(SwapStage::Build))?;
            (response.quote.clone(), Some(response))
        };

        let summary = summarize_quote(&quote, leg.in_decimals, leg.out_decimals);
        if instruction.show_quote_details {
            logger::info(
                LogTag::Quote,
                &format!(
                    "📊 Raptor quote: in={:?} out={:?} fees={:?} impact={:?}%",
                    summary.amount_in, summary.amount_out, summary.fee_total, summary.price_impact_percent
                ),
            );
        }
        pipeline::check_price_impact(summary.price_impact_percent, &self.settings)?;

        let raw = json!({
            "quote": quote,
            "amountUnits": leg.amount.to_string(),
            "lastValidBlockHeight": transaction.as_ref().and_then(|t| t.last_valid_block_height),
        });
        let result = ExecutionResult::new(
            EXECUTOR_RAPTOR,
            instruction.dry_run,
            summary.economics(instruction.side),
            raw,
        );

        let transaction = match transaction {
            Some(transaction) => transaction,
            None => {
                logger::info(LogTag::Swap, "Dry run: Raptor quote only, no transaction built");
                return Ok(result);
            }
        };

        let txid = pipeline::sign_and_submit(
            &transaction.swap_transaction,
            request.signer,
            request.submitter,
            &self.settings,
        )
        .await?;

        Ok(result.with_txid(txid))
    }
}

/// Exact UI amount of a base-unit quantity, for log lines
pub fn describe_units(units: u64, decimals: u8) -> Decimal {
    from_base_units(units, decimals).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swaps::pipeline::test_support::{unsigned_wire, StubSubmitter};
    use crate::swaps::validator::validate_swap_payload;
    use parking_lot::Mutex;
    use solana_sdk::signature::Keypair;

    const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    struct StubLedger {
        token_balance: u64,
        sol_balance: u64,
    }

    #[async_trait]
    impl TokenLedger for StubLedger {
        async fn token_decimals(&self, mint: &str) -> BotResult<u8> {
            Ok(if mint == SOL_MINT { SOL_DECIMALS } else { 5 })
        }

        async fn sol_balance(&self, _owner: &Pubkey) -> BotResult<u64> {
            Ok(self.sol_balance)
        }

        async fn token_balance(&self, _owner: &Pubkey, _mint: &str) -> BotResult<u64> {
            Ok(self.token_balance)
        }
    }

    #[derive(Default)]
    struct StubApi {
        wire: String,
        quotes: Mutex<Vec<RaptorQuoteRequest>>,
        swaps: Mutex<Vec<RaptorSwapRequest>>,
    }

    #[async_trait]
    impl RaptorApi for StubApi {
        async fn quote(&self, request: &RaptorQuoteRequest) -> BotResult<Value> {
            self.quotes.lock().push(request.clone());
            Ok(json!({
                "inAmount": request.amount.to_string(),
                "outAmount": "250000000",
                "priceImpactPct": "0.004"
            }))
        }

        async fn quote_and_swap(&self, request: &RaptorSwapRequest) -> BotResult<RaptorSwapResponse> {
            self.swaps.lock().push(request.clone());
            Ok(RaptorSwapResponse {
                swap_transaction: self.wire.clone(),
                quote: json!({"inAmount": request.amount, "outAmount": 1_000_000u64}),
                last_valid_block_height: Some(99),
            })
        }
    }

    fn instruction(side: &str, amount: &str, dry_run: bool) -> SwapInstruction {
        validate_swap_payload(&json!({
            "side": side,
            "mint": BONK,
            "amount": amount,
            "slippagePercent": 1.5,
            "walletAlias": "main",
            "dryRun": dry_run
        }))
        .unwrap()
    }

    fn executor(api: Arc<StubApi>, token_balance: u64) -> RaptorExecutor {
        RaptorExecutor::new(
            api,
            Arc::new(StubLedger {
                token_balance,
                sol_balance: 2_000_000_000,
            }),
            PipelineSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_buy_amount_in_lamports() {
        let exec = executor(Arc::new(StubApi::default()), 0);
        let leg = exec
            .plan(&instruction("buy", "0.123456789", false), &Pubkey::new_unique())
            .await
            .unwrap();
        assert_eq!(leg.input_mint, SOL_MINT);
        assert_eq!(leg.amount, 123_456_789);
        assert_eq!(leg.out_decimals, 5);
    }

    #[tokio::test]
    async fn test_percent_and_auto_sells_use_balance() {
        let exec = executor(Arc::new(StubApi::default()), 1_000_001);
        let owner = Pubkey::new_unique();

        let half = exec.plan(&instruction("sell", "50%", false), &owner).await.unwrap();
        assert_eq!(half.amount, 500_000);

        let all = exec.plan(&instruction("sell", "auto", false), &owner).await.unwrap();
        assert_eq!(all.amount, 1_000_001);

        let empty = executor(Arc::new(StubApi::default()), 0);
        assert!(empty.plan(&instruction("sell", "auto", false), &owner).await.is_err());
    }

    #[tokio::test]
    async fn test_dry_run_only_quotes() {
        let api = Arc::new(StubApi::default());
        let exec = executor(api.clone(), 0);
        let signer = Keypair::new();
        let submitter = StubSubmitter::simulating();
        let instruction = instruction("buy", "0.5", true);

        let result = exec
            .execute(SwapRequest {
                instruction: &instruction,
                signer: &signer,
                submitter: &submitter,
            })
            .await
            .unwrap();

        assert!(result.dry_run);
        assert_eq!(result.txid, None);
        assert!((result.sol_received_decimal.unwrap() + 0.5).abs() < 1e-12);
        assert_eq!(result.tokens_received_decimal, Some(2500.0));
        assert!((result.price_impact_percent.unwrap() - 0.4).abs() < 1e-9);

        let quotes = api.quotes.lock();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].slippage_bps, 150);
        assert!(api.swaps.lock().is_empty());
        assert_eq!(submitter.sends(), 0);
    }

    #[tokio::test]
    async fn test_live_sell_builds_signs_and_sends() {
        let signer = Keypair::new();
        let api = Arc::new(StubApi {
            wire: unsigned_wire(&signer.pubkey()),
            ..StubApi::default()
        });
        let exec = executor(api.clone(), 4_200_000);
        let submitter = StubSubmitter::simulating();
        let instruction = instruction("sell", "10", false);

        let result = exec
            .execute(SwapRequest {
                instruction: &instruction,
                signer: &signer,
                submitter: &submitter,
            })
            .await
            .unwrap();

        assert!(result.txid.is_some());
        assert_eq!(result.tokens_received_decimal, Some(-10.0));
        assert!((result.sol_received_decimal.unwrap() - 0.001).abs() < 1e-12);
        assert_eq!(result.raw["lastValidBlockHeight"], json!(99));

        let swaps = api.swaps.lock();
        assert_eq!(swaps[0].amount, 1_000_000);
        assert_eq!(swaps[0].user_public_key, signer.pubkey().to_string());
        assert!(api.quotes.lock().is_empty());
        assert_eq!(submitter.sends(), 1);
    }

    #[test]
    fn test_missing_swap_transaction() {
        let err = decode_swap_response(200, r#"{"quote":{}}"#).unwrap_err();
        assert!(err.to_string().contains("missing `swapTransaction` in response"));
        assert_eq!(err.swap_stage(), Some(SwapStage::Build));
    }

    #[test]
    fn test_describe_units() {
        assert_eq!(describe_units(1_500_000_000, 9).to_string(), "1.5");
    }
}
