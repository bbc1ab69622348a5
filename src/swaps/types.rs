/// Common swap structures shared by the executors and the swap worker
use super::normalize::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Custom deserializer for optional numeric fields that services send either
/// as numbers or as numeric strings
pub fn deserialize_optional_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct OptionalLenientF64;

    impl<'de> Visitor<'de> for OptionalLenientF64 {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an optional number or numeric string")
        }

        fn visit_none<E>(self) -> Result<Option<f64>, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Option<f64>, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Option<f64>, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(OptionalLenientF64)
        }

        fn visit_str<E>(self, value: &str) -> Result<Option<f64>, E>
        where
            E: de::Error,
        {
            Ok(value.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Option<f64>, E>
        where
            E: de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Option<f64>, E>
        where
            E: de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_f64<E>(self, value: f64) -> Result<Option<f64>, E>
        where
            E: de::Error,
        {
            Ok(Some(value).filter(|v| v.is_finite()))
        }
    }

    deserializer.deserialize_option(OptionalLenientF64)
}

/// Transport-independent view of a quote
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSummary {
    /// Amount given up, in UI units of the input asset
    pub amount_in: Option<f64>,
    /// Amount received, in UI units of the output asset
    pub amount_out: Option<f64>,
    /// Aggregate fees in SOL
    pub fee_total: Option<f64>,
    pub price_impact_percent: Option<f64>,
}

/// Signed economic forecast of a swap
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwapEconomics {
    pub tokens_received_decimal: Option<f64>,
    pub sol_received_decimal: Option<f64>,
    pub total_fees_sol: Option<f64>,
    pub price_impact_percent: Option<f64>,
}

impl QuoteSummary {
    /// The side given up is negative, the side received positive
    pub fn economics(&self, side: Side) -> SwapEconomics {
        let spent = self.amount_in.map(|v| -v.abs());
        let received = self.amount_out;

        let (tokens, sol) = match side {
            Side::Buy => (received, spent),
            Side::Sell => (spent, received),
        };

        SwapEconomics {
            tokens_received_decimal: tokens,
            sol_received_decimal: sol,
            total_fees_sol: self.fee_total,
            price_impact_percent: self.price_impact_percent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl Timing {
    pub fn between(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> Self {
        let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            started_at,
            ended_at,
            duration_ms,
        }
    }
}

/// Outcome of one swap execution
///
/// `txid` is `None` only for dry runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub executor: String,
    pub txid: Option<String>,
    pub signature: Option<String>,
    pub slot: Option<u64>,
    pub dry_run: bool,
    pub tokens_received_decimal: Option<f64>,
    pub sol_received_decimal: Option<f64>,
    pub total_fees_sol: Option<f64>,
    pub price_impact_percent: Option<f64>,
    /// Raw transport response (quote/rate objects)
    pub raw: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
    /// Confirmation monitor output, when a monitor ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<Value>,
}

impl ExecutionResult {
    pub fn new(executor: &str, dry_run: bool, economics: SwapEconomics, raw: Value) -> Self {
        Self {
            executor: executor.to_string(),
            txid: None,
            signature: None,
            slot: None,
            dry_run,
            tokens_received_decimal: economics.tokens_received_decimal,
            sol_received_decimal: economics.sol_received_decimal,
            total_fees_sol: economics.total_fees_sol,
            price_impact_percent: economics.price_impact_percent,
            raw,
            timing: None,
            monitor: None,
        }
    }

    pub fn with_txid(mut self, txid: String) -> Self {
        self.signature = Some(txid.clone());
        self.txid = Some(txid);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Rate {
        #[serde(default, deserialize_with = "deserialize_optional_f64")]
        value: Option<f64>,
    }

    #[test]
    fn test_lenient_numbers() {
        let parse = |v: Value| serde_json::from_value::<Rate>(json!({ "value": v })).unwrap().value;
        assert_eq!(parse(json!(1.5)), Some(1.5));
        assert_eq!(parse(json!("2.25")), Some(2.25));
        assert_eq!(parse(json!(7)), Some(7.0));
        assert_eq!(parse(json!(null)), None);
        assert_eq!(parse(json!("n/a")), None);

        let missing: Rate = serde_json::from_value(json!({})).unwrap();
        assert_eq!(missing.value, None);
    }

    #[test]
    fn test_buy_economics() {
        let quote = QuoteSummary {
            amount_in: Some(0.1),
            amount_out: Some(12_345.0),
            fee_total: Some(0.0005),
            price_impact_percent: Some(1.2),
        };
        let econ = quote.economics(Side::Buy);
        assert_eq!(econ.sol_received_decimal, Some(-0.1));
        assert_eq!(econ.tokens_received_decimal, Some(12_345.0));
        assert_eq!(econ.total_fees_sol, Some(0.0005));
    }

    #[test]
    fn test_sell_economics() {
        let quote = QuoteSummary {
            amount_in: Some(500.0),
            amount_out: Some(0.04),
            fee_total: None,
            price_impact_percent: None,
        };
        let econ = quote.economics(Side::Sell);
        assert_eq!(econ.tokens_received_decimal, Some(-500.0));
        assert_eq!(econ.sol_received_decimal, Some(0.04));
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = ExecutionResult::new("v3", true, SwapEconomics::default(), json!({}));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["dryRun"], json!(true));
        assert_eq!(value["txid"], Value::Null);
        assert!(value.get("timing").is_none());
    }
}
