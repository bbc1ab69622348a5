/// Amount & field normalization
///
/// Pure functions turning loosely-typed user input into canonical values.
/// Nothing here coerces silently: anything outside the accepted shapes is a
/// `BotError::Validation`.
use crate::errors::{BotError, BotResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Wrapped SOL mint
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const SOL_DECIMALS: u8 = 9;

/// Base58 alphabet without `0 O I l`, 32-44 characters
static MINT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").expect("static mint pattern")
});

// =============================================================================
// SIDE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn parse(raw: &str) -> BotResult<Side> {
        match raw.trim().to_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(BotError::validation(
                "side",
                format!("expected \"buy\" or \"sell\", got \"{}\"", other),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// AMOUNT
// =============================================================================

/// Canonical swap amount
///
/// Buys are denominated in SOL, sells in the token being sold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Amount {
    /// Strictly positive decimal amount
    Decimal(Decimal),
    /// Percentage of the current balance, in (0, 100]
    Percent(Decimal),
    /// Entire balance (sells only)
    Auto,
}

impl Amount {
    /// Canonical string form: `"1.25"`, `"50%"`, `"auto"`
    pub fn canonical(&self) -> String {
        match self {
            Amount::Decimal(d) => d.normalize().to_string(),
            Amount::Percent(p) => format!("{}%", p.normalize()),
            Amount::Auto => "auto".to_string(),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical())
    }
}

/// Parse a raw amount for the given side
pub fn normalize_amount(raw: &str, side: Side) -> BotResult<Amount> {
    let value = raw.trim().to_lowercase();

    if value.is_empty() {
        return Err(BotError::validation("amount", "is required"));
    }

    if value == "auto" {
        return match side {
            Side::Sell => Ok(Amount::Auto),
            Side::Buy => Err(BotError::validation(
                "amount",
                "\"auto\" is only valid for sells",
            )),
        };
    }

    if let Some(pct) = value.strip_suffix('%') {
        let pct = parse_decimal(pct.trim())
            .ok_or_else(|| BotError::validation("amount", format!("\"{}\" is not a percentage", raw.trim())))?;
        if pct <= Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
            return Err(BotError::validation(
                "amount",
                format!("percentage must be in (0, 100], got {}%", pct.normalize()),
            ));
        }
        return Ok(Amount::Percent(pct));
    }

    let amount = parse_decimal(&value)
        .ok_or_else(|| BotError::validation("amount", format!("\"{}\" is not a number", raw.trim())))?;
    if amount <= Decimal::ZERO {
        return Err(BotError::validation(
            "amount",
            format!("must be greater than zero, got {}", amount.normalize()),
        ));
    }
    Ok(Amount::Decimal(amount))
}

/// Plain or scientific decimal notation
fn parse_decimal(raw: &str) -> Option<Decimal> {
    if raw.is_empty() {
        return None;
    }
    Decimal::from_str(raw)
        .ok()
        .or_else(|| Decimal::from_scientific(raw).ok())
}

// =============================================================================
// MINT
// =============================================================================

/// Validate a token mint address and return it trimmed
pub fn validate_mint(raw: &str) -> BotResult<String> {
    let mint = raw.trim();
    if MINT_PATTERN.is_match(mint) {
        Ok(mint.to_string())
    } else {
        Err(BotError::validation(
            "mint",
            format!("\"{}\" is not a base58 address of 32-44 characters", mint),
        ))
    }
}

// =============================================================================
// PRIORITY FEE / LEVEL / TX VERSION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriorityFee {
    Auto,
    /// Fee in SOL
    Sol(f64),
}

impl PriorityFee {
    pub fn parse(raw: &Value) -> BotResult<PriorityFee> {
        let invalid = || {
            BotError::validation(
                "priorityFee",
                format!("expected a non-negative number or \"auto\", got {}", raw),
            )
        };

        let fee = match raw {
            Value::String(s) if s.trim().eq_ignore_ascii_case("auto") => {
                return Ok(PriorityFee::Auto)
            }
            Value::String(s) => s.trim().parse::<f64>().map_err(|_| invalid())?,
            Value::Number(n) => n.as_f64().ok_or_else(invalid)?,
            _ => return Err(invalid()),
        };

        if fee.is_finite() && fee >= 0.0 {
            Ok(PriorityFee::Sol(fee))
        } else {
            Err(invalid())
        }
    }

    /// Query/body representation
    pub fn to_param(&self) -> String {
        match self {
            PriorityFee::Auto => "auto".to_string(),
            PriorityFee::Sol(fee) => fee.to_string(),
        }
    }
}

impl Serialize for PriorityFee {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PriorityFee::Auto => serializer.serialize_str("auto"),
            PriorityFee::Sol(fee) => serializer.serialize_f64(*fee),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriorityFeeLevel {
    #[serde(rename = "min")]
    Min,
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "high")]
    High,
    #[serde(rename = "veryHigh")]
    VeryHigh,
    #[serde(rename = "unsafeMax")]
    UnsafeMax,
}

impl PriorityFeeLevel {
    /// Case-insensitive parse (`veryhigh` -> `veryHigh`)
    pub fn parse(raw: &str) -> BotResult<PriorityFeeLevel> {
        match raw.trim().to_lowercase().as_str() {
            "min" => Ok(PriorityFeeLevel::Min),
            "low" => Ok(PriorityFeeLevel::Low),
            "medium" => Ok(PriorityFeeLevel::Medium),
            "high" => Ok(PriorityFeeLevel::High),
            "veryhigh" => Ok(PriorityFeeLevel::VeryHigh),
            "unsafemax" => Ok(PriorityFeeLevel::UnsafeMax),
            _ => Err(BotError::validation(
                "priorityFeeLevel",
                format!(
                    "\"{}\" is not one of min, low, medium, high, veryHigh, unsafeMax",
                    raw.trim()
                ),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityFeeLevel::Min => "min",
            PriorityFeeLevel::Low => "low",
            PriorityFeeLevel::Medium => "medium",
            PriorityFeeLevel::High => "high",
            PriorityFeeLevel::VeryHigh => "veryHigh",
            PriorityFeeLevel::UnsafeMax => "unsafeMax",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxVersion {
    V0,
    Legacy,
}

impl TxVersion {
    pub fn parse(raw: &str) -> BotResult<TxVersion> {
        match raw.trim().to_lowercase().as_str() {
            "v0" => Ok(TxVersion::V0),
            "legacy" => Ok(TxVersion::Legacy),
            _ => Err(BotError::validation(
                "txVersion",
                format!("expected \"v0\" or \"legacy\", got \"{}\"", raw.trim()),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxVersion::V0 => "v0",
            TxVersion::Legacy => "legacy",
        }
    }
}

// =============================================================================
// BASE UNITS
// =============================================================================

/// `amount × 10^decimals`, truncated to whole base units
pub fn to_base_units(amount: Decimal, decimals: u8) -> BotResult<u64> {
    let scale = 10u64
        .checked_pow(u32::from(decimals))
        .map(Decimal::from)
        .ok_or_else(|| BotError::validation("decimals", format!("{} is out of range", decimals)))?;

    let units = amount
        .checked_mul(scale)
        .ok_or_else(|| BotError::validation("amount", "overflows base units"))?
        .trunc();

    let units = units
        .to_u64()
        .ok_or_else(|| BotError::validation("amount", format!("{} does not fit in base units", amount)))?;

    if units == 0 {
        return Err(BotError::validation(
            "amount",
            format!("{} is below the smallest unit (decimals {})", amount.normalize(), decimals),
        ));
    }
    Ok(units)
}

/// Base units back to a decimal amount
pub fn from_base_units(units: u64, decimals: u8) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(units), u32::from(decimals).min(28))
}

/// `balance × pct / 100`, truncated
pub fn percent_of_units(balance: u64, pct: Decimal) -> u64 {
    (Decimal::from(balance) * pct / Decimal::ONE_HUNDRED)
        .trunc()
        .to_u64()
        .unwrap_or(0)
}

// =============================================================================
// PRICE IMPACT
// =============================================================================

/// Normalize a raw price-impact value to a percentage
///
/// Values in `(0, 1]` are fractions and get multiplied by 100; anything else
/// numeric is already a percentage. Missing or non-numeric input gives `None`.
pub fn normalize_price_impact(raw: Option<&Value>) -> Option<f64> {
    let value = match raw? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if !value.is_finite() {
        return None;
    }
    if value > 0.0 && value <= 1.0 {
        Some(value * 100.0)
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_auto_only_for_sells() {
        let err = normalize_amount("auto", Side::Buy).unwrap_err();
        assert!(err.to_string().contains("only valid for sells"));

        assert_eq!(normalize_amount(" AUTO ", Side::Sell).unwrap(), Amount::Auto);
    }

    #[test]
    fn test_percent_amounts() {
        let amount = normalize_amount("50%", Side::Sell).unwrap();
        assert_eq!(amount, Amount::Percent(dec("50")));
        assert_eq!(amount.canonical(), "50%");

        assert_eq!(normalize_amount("100%", Side::Sell).unwrap().canonical(), "100%");
        assert!(normalize_amount("0%", Side::Sell).is_err());
        assert!(normalize_amount("100.5%", Side::Sell).is_err());
        assert!(normalize_amount("-5%", Side::Sell).is_err());
        assert!(normalize_amount("abc%", Side::Sell).is_err());
    }

    #[test]
    fn test_decimal_amounts() {
        assert_eq!(normalize_amount("1.25", Side::Buy).unwrap().canonical(), "1.25");
        assert_eq!(normalize_amount("0.500", Side::Buy).unwrap().canonical(), "0.5");
        assert_eq!(normalize_amount("1e-3", Side::Buy).unwrap().canonical(), "0.001");
        assert!(normalize_amount("0", Side::Buy).is_err());
        assert!(normalize_amount("-1", Side::Buy).is_err());
        assert!(normalize_amount("NaN", Side::Buy).is_err());
        assert!(normalize_amount("inf", Side::Buy).is_err());
        assert!(normalize_amount("", Side::Buy).is_err());
    }

    #[test]
    fn test_mint_validation() {
        assert_eq!(validate_mint(&format!("  {}  ", SOL_MINT)).unwrap(), SOL_MINT);
        assert!(validate_mint("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v").is_ok());

        // too short, forbidden characters, too long
        assert!(validate_mint("So1111").is_err());
        assert!(validate_mint("0o11111111111111111111111111111111111111112").is_err());
        assert!(validate_mint("Il11111111111111111111111111111111111111112").is_err());
        assert!(validate_mint(&"1".repeat(45)).is_err());
        assert!(validate_mint("").is_err());
    }

    #[test]
    fn test_enum_normalization() {
        assert_eq!(PriorityFeeLevel::parse("veryhigh").unwrap().as_str(), "veryHigh");
        assert_eq!(PriorityFeeLevel::parse("UNSAFEMAX").unwrap(), PriorityFeeLevel::UnsafeMax);
        assert!(PriorityFeeLevel::parse("ludicrous").is_err());

        assert_eq!(TxVersion::parse("V0").unwrap(), TxVersion::V0);
        assert_eq!(TxVersion::parse("legacy").unwrap(), TxVersion::Legacy);
        assert!(TxVersion::parse("v1").is_err());
    }

    #[test]
    fn test_priority_fee() {
        assert_eq!(PriorityFee::parse(&json!("auto")).unwrap(), PriorityFee::Auto);
        assert_eq!(PriorityFee::parse(&json!(0.0005)).unwrap(), PriorityFee::Sol(0.0005));
        assert_eq!(PriorityFee::parse(&json!("0.001")).unwrap(), PriorityFee::Sol(0.001));
        assert_eq!(PriorityFee::parse(&json!(0)).unwrap(), PriorityFee::Sol(0.0));
        assert!(PriorityFee::parse(&json!(-1)).is_err());
        assert!(PriorityFee::parse(&json!(true)).is_err());
        assert!(PriorityFee::parse(&json!("fast")).is_err());
    }

    #[test]
    fn test_base_units_exact() {
        // 0.1 + 0.2 style float errors must not leak into base units
        assert_eq!(to_base_units(dec("0.3"), 9).unwrap(), 300_000_000);
        assert_eq!(to_base_units(dec("1.000000001"), 9).unwrap(), 1_000_000_001);
        assert_eq!(to_base_units(dec("123.456789"), 6).unwrap(), 123_456_789);
        assert_eq!(to_base_units(dec("1.9999999"), 6).unwrap(), 1_999_999);
        assert!(to_base_units(dec("0.0000001"), 6).is_err());

        assert_eq!(from_base_units(1_500_000, 6), dec("1.5"));
        assert_eq!(percent_of_units(1_000_001, dec("50")), 500_000);
        assert_eq!(percent_of_units(777, dec("100")), 777);
    }

    #[test]
    fn test_price_impact_normalization() {
        assert_eq!(normalize_price_impact(Some(&json!(0.5))), Some(50.0));
        assert_eq!(normalize_price_impact(Some(&json!(5))), Some(5.0));
        assert_eq!(normalize_price_impact(Some(&json!(1))), Some(100.0));
        assert_eq!(normalize_price_impact(Some(&json!("0.25"))), Some(25.0));
        assert_eq!(normalize_price_impact(Some(&json!(0))), Some(0.0));
        assert_eq!(normalize_price_impact(Some(&Value::Null)), None);
        assert_eq!(normalize_price_impact(Some(&json!("n/a"))), None);
        assert_eq!(normalize_price_impact(None), None);
    }
}
