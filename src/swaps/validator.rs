/// Swap payload validation
///
/// Turns the loosely-typed payload received over IPC or from the CLI into a
/// [`SwapInstruction`] whose fields are all canonical. Downstream code never
/// re-validates: everything that can be rejected is rejected here, before any
/// I/O happens.
use super::normalize::{
    normalize_amount, validate_mint, Amount, PriorityFee, PriorityFeeLevel, Side, TxVersion,
};
use crate::errors::{BotError, BotResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_SLIPPAGE_PERCENT: f64 = 15.0;

/// Payload as received; every field is checked by [`validate_swap_payload`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSwapPayload {
    pub side: Option<String>,
    pub mint: Option<String>,
    pub amount: Option<Value>,
    pub slippage_percent: Option<Value>,
    pub priority_fee: Option<Value>,
    pub priority_fee_level: Option<Value>,
    pub tx_version: Option<Value>,
    pub use_jito: Option<Value>,
    pub dry_run: Option<Value>,
    pub show_quote_details: Option<Value>,
    pub debug_logging: Option<Value>,
    pub wallet_alias: Option<String>,
    pub wallet_private_key: Option<String>,
}

/// Wallet reference; at least one side is always set after validation
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRef {
    pub alias: Option<String>,
    #[serde(skip_serializing)]
    pub private_key: Option<String>,
}

impl std::fmt::Debug for WalletRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletRef")
            .field("alias", &self.alias)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A validated swap instruction
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInstruction {
    pub side: Side,
    pub mint: String,
    pub amount: Amount,
    pub slippage_percent: f64,
    pub priority_fee: Option<PriorityFee>,
    pub priority_fee_level: Option<PriorityFeeLevel>,
    pub tx_version: Option<TxVersion>,
    pub use_jito: bool,
    pub dry_run: bool,
    pub show_quote_details: bool,
    pub debug_logging: bool,
    pub wallet: WalletRef,
}

impl SwapInstruction {
    /// Slippage in basis points, as the Raptor API expects
    pub fn slippage_bps(&self) -> u64 {
        (self.slippage_percent * 100.0).round().max(0.0) as u64
    }
}

/// Validate a JSON payload
pub fn validate_swap_payload(payload: &Value) -> BotResult<SwapInstruction> {
    if !payload.is_object() {
        return Err(BotError::validation("payload", "expected a JSON object"));
    }
    let raw: RawSwapPayload = serde_json::from_value(payload.clone())
        .map_err(|e| BotError::validation("payload", e.to_string()))?;
    validate_raw(raw, DEFAULT_SLIPPAGE_PERCENT)
}

/// Validate an already-deserialized payload with a caller-chosen default slippage
pub fn validate_raw(raw: RawSwapPayload, default_slippage: f64) -> BotResult<SwapInstruction> {
    let side = Side::parse(required(raw.side.as_deref(), "side")?)?;
    let mint = validate_mint(required(raw.mint.as_deref(), "mint")?)?;

    let amount = match raw.amount.as_ref() {
        None | Some(Value::Null) => return Err(BotError::validation("amount", "is required")),
        Some(Value::String(s)) => normalize_amount(s, side)?,
        Some(Value::Number(n)) => normalize_amount(&n.to_string(), side)?,
        Some(other) => {
            return Err(BotError::validation(
                "amount",
                format!("expected a number or string, got {}", other),
            ))
        }
    };

    let slippage_percent = match raw.slippage_percent.as_ref() {
        None | Some(Value::Null) => default_slippage,
        Some(value) => parse_slippage(value)?,
    };

    let priority_fee = match raw.priority_fee.as_ref() {
        None | Some(Value::Null) => None,
        Some(value) => Some(PriorityFee::parse(value)?),
    };

    let priority_fee_level = optional_enum(raw.priority_fee_level.as_ref(), "priorityFeeLevel")?
        .map(PriorityFeeLevel::parse)
        .transpose()?;

    let tx_version = optional_enum(raw.tx_version.as_ref(), "txVersion")?
        .map(TxVersion::parse)
        .transpose()?;

    let wallet = WalletRef {
        alias: non_empty(raw.wallet_alias),
        private_key: non_empty(raw.wallet_private_key),
    };
    if wallet.alias.is_none() && wallet.private_key.is_none() {
        return Err(BotError::validation(
            "wallet",
            "either walletAlias or walletPrivateKey is required",
        ));
    }

    Ok(SwapInstruction {
        side,
        mint,
        amount,
        slippage_percent,
        priority_fee,
        priority_fee_level,
        tx_version,
        use_jito: flag(raw.use_jito.as_ref(), "useJito")?,
        dry_run: flag(raw.dry_run.as_ref(), "dryRun")?,
        show_quote_details: flag(raw.show_quote_details.as_ref(), "showQuoteDetails")?,
        debug_logging: flag(raw.debug_logging.as_ref(), "debugLogging")?,
        wallet,
    })
}

fn required<'a>(value: Option<&'a str>, field: &str) -> BotResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(BotError::validation(field, "is required")),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_slippage(value: &Value) -> BotResult<f64> {
    let slippage = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };

    match slippage {
        Some(s) if s.is_finite() && s > 0.0 && s <= 100.0 => Ok(s),
        _ => Err(BotError::validation(
            "slippagePercent",
            format!("expected a number in (0, 100], got {}", value),
        )),
    }
}

fn optional_enum<'a>(value: Option<&'a Value>, field: &str) -> BotResult<Option<&'a str>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(BotError::validation(
            field,
            format!("expected a string, got {}", other),
        )),
    }
}

/// Booleans are strict: `true`/`false` only
fn flag(value: Option<&Value>, field: &str) -> BotResult<bool> {
    match value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(BotError::validation(
            field,
            format!("expected true or false, got {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swaps::normalize::SOL_MINT;
    use serde_json::json;

    const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    #[test]
    fn test_dry_run_sell_example() {
        let payload = json!({
            "side": "sell",
            "mint": SOL_MINT,
            "amount": "50%",
            "walletAlias": "main",
            "dryRun": true
        });
        let instruction = validate_swap_payload(&payload).unwrap();

        assert_eq!(instruction.side, Side::Sell);
        assert_eq!(instruction.amount.canonical(), "50%");
        assert_eq!(instruction.slippage_percent, DEFAULT_SLIPPAGE_PERCENT);
        assert_eq!(instruction.wallet.alias.as_deref(), Some("main"));
        assert!(instruction.dry_run);
        assert!(!instruction.use_jito);
    }

    #[test]
    fn test_numeric_amount_and_options() {
        let payload = json!({
            "side": "BUY",
            "mint": format!("  {}  ", BONK),
            "amount": 0.25,
            "slippagePercent": "3",
            "priorityFee": "auto",
            "priorityFeeLevel": "veryhigh",
            "txVersion": "V0",
            "useJito": true,
            "walletPrivateKey": "abc"
        });
        let instruction = validate_swap_payload(&payload).unwrap();

        assert_eq!(instruction.side, Side::Buy);
        assert_eq!(instruction.mint, BONK);
        assert_eq!(instruction.amount.canonical(), "0.25");
        assert_eq!(instruction.slippage_percent, 3.0);
        assert_eq!(instruction.slippage_bps(), 300);
        assert_eq!(instruction.priority_fee, Some(PriorityFee::Auto));
        assert_eq!(instruction.priority_fee_level, Some(PriorityFeeLevel::VeryHigh));
        assert_eq!(instruction.tx_version, Some(TxVersion::V0));
        assert!(instruction.use_jito);
        assert_eq!(instruction.wallet.private_key.as_deref(), Some("abc"));
    }

    #[test]
    fn test_wallet_reference_required() {
        let payload = json!({"side": "sell", "mint": BONK, "amount": "1", "walletAlias": "  "});
        match validate_swap_payload(&payload) {
            Err(BotError::Validation { field, .. }) => assert_eq!(field, "wallet"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_auto_buy_rejected() {
        let payload = json!({"side": "buy", "mint": BONK, "amount": "auto", "walletAlias": "main"});
        let err = validate_swap_payload(&payload).unwrap_err();
        assert!(err.to_string().contains("only valid for sells"));
    }

    #[test]
    fn test_strict_booleans() {
        let payload = json!({
            "side": "sell", "mint": BONK, "amount": "1", "walletAlias": "main", "dryRun": "yes"
        });
        match validate_swap_payload(&payload) {
            Err(BotError::Validation { field, .. }) => assert_eq!(field, "dryRun"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_bad_fields_rejected() {
        let base = json!({"side": "sell", "mint": BONK, "amount": "1", "walletAlias": "main"});
        let with = |key: &str, value: Value| {
            let mut payload = base.clone();
            payload[key] = value;
            validate_swap_payload(&payload)
        };

        assert!(with("side", json!("hold")).is_err());
        assert!(with("mint", json!("0xdeadbeef")).is_err());
        assert!(with("amount", json!(true)).is_err());
        assert!(with("amount", json!("-1")).is_err());
        assert!(with("slippagePercent", json!(0)).is_err());
        assert!(with("slippagePercent", json!(100.5)).is_err());
        assert_eq!(with("slippagePercent", json!("100%")).unwrap().slippage_bps(), 10_000);
        assert!(with("priorityFee", json!(-0.1)).is_err());
        assert!(with("priorityFeeLevel", json!("ludicrous")).is_err());
        assert!(with("txVersion", json!("v1")).is_err());
        assert!(validate_swap_payload(&json!("sell")).is_err());
    }

    #[test]
    fn test_private_key_not_serialized() {
        let payload = json!({"side": "sell", "mint": BONK, "amount": "auto", "walletPrivateKey": "secret"});
        let instruction = validate_swap_payload(&payload).unwrap();
        let value = serde_json::to_value(&instruction).unwrap();
        assert!(!value.to_string().contains("secret"));
        assert!(!format!("{:?}", instruction).contains("secret"));
        assert_eq!(value["amount"], json!("auto"));
    }
}
