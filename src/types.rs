use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

/// A trader whose activity is monitored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedWallet {
    /// Proxy wallet address, lowercased.
    pub address: String,
    pub display_name: String,
    /// Estimated total capital of the trader, used as the sizing denominator.
    pub reference_bankroll: Decimal,
}

impl WatchedWallet {
    pub fn new(address: &str, display_name: &str, reference_bankroll: Decimal) -> Self {
        Self {
            address: address.trim().to_lowercase(),
            display_name: display_name.to_string(),
            reference_bankroll: reference_bankroll.max(Decimal::ZERO),
        }
    }

    /// First 6 + last 4 chars of the address, used as a log prefix.
    pub fn short_id(&self) -> String {
        let addr = &self.address;
        if addr.len() > 10 && addr.is_ascii() {
            format!("{}..{}", &addr[..6], &addr[addr.len() - 4..])
        } else {
            addr.clone()
        }
    }
}

/// Trade direction as reported by the activity API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
    Other(String),
}

impl TradeSide {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" => TradeSide::Buy,
            "SELL" => TradeSide::Sell,
            _ => TradeSide::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
            TradeSide::Other(s) => s,
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One trade from the `/activity` endpoint, reduced to the fields the tracker
/// consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub transaction_hash: String,
    /// Unix seconds. `None` when the API omitted it or sent garbage.
    pub timestamp: Option<i64>,
    pub condition_id: String,
    pub side: TradeSide,
    pub outcome: String,
    pub price: Decimal,
    pub size_tokens: Decimal,
    pub size_usd: Decimal,
    pub title: String,
    pub slug: String,
    pub event_slug: String,
}

/// Wire shape of an activity entry. Fields are kept as raw JSON so a field of
/// the wrong type degrades to its default instead of dropping the trade.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawActivity {
    transaction_hash: Option<Value>,
    timestamp: Option<Value>,
    condition_id: Option<Value>,
    side: Option<Value>,
    outcome: Option<Value>,
    price: Option<Value>,
    size: Option<Value>,
    usdc_size: Option<Value>,
    title: Option<Value>,
    slug: Option<Value>,
    event_slug: Option<Value>,
}

impl TradeRecord {
    /// Build a record from one element of the activity payload.
    ///
    /// Returns `None` when the element is not a JSON object; missing or
    /// mistyped fields are defaulted.
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let raw: RawActivity = serde_json::from_value(value).ok()?;
        Some(Self {
            transaction_hash: string_field(raw.transaction_hash).unwrap_or_default(),
            timestamp: raw.timestamp.as_ref().and_then(unix_seconds),
            condition_id: string_field(raw.condition_id).unwrap_or_default(),
            side: TradeSide::parse(string_field(raw.side).as_deref().unwrap_or("UNKNOWN")),
            outcome: non_empty(string_field(raw.outcome)).unwrap_or_else(|| "?".to_string()),
            price: decimal_or_zero(raw.price.as_ref()),
            size_tokens: decimal_or_zero(raw.size.as_ref()),
            size_usd: decimal_or_zero(raw.usdc_size.as_ref()),
            title: non_empty(string_field(raw.title))
                .unwrap_or_else(|| "Unknown Market".to_string()),
            slug: string_field(raw.slug).unwrap_or_default(),
            event_slug: string_field(raw.event_slug).unwrap_or_default(),
        })
    }
}

/// The string content of a JSON string; anything else counts as absent.
fn string_field(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

/// Parse a JSON number or numeric string into a `Decimal`.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()
        }
        Value::String(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .ok()
        }
        _ => None,
    }
}

fn decimal_or_zero(value: Option<&Value>) -> Decimal {
    value.and_then(decimal_from_value).unwrap_or(Decimal::ZERO)
}

fn unix_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
