use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical market update. Serializes with the same field names the
/// normalizer reads first, so a canonical tick normalizes to itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Event time, seconds or milliseconds. See `aggregator::bucket::timestamp_secs`.
    pub timestamp: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub symbol: String,
    pub interval: String,
}

/// Fallbacks for fields a payload may omit.
#[derive(Debug, Clone)]
pub struct TickDefaults {
    pub symbol: String,
    pub interval: String,
}

impl Default for TickDefaults {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            interval: "1s".to_string(),
        }
    }
}

const OPEN_KEYS: &[&str] = &["open", "o", "close", "c"];
const HIGH_KEYS: &[&str] = &["high", "h", "close", "c"];
const LOW_KEYS: &[&str] = &["low", "l", "close", "c"];
const CLOSE_KEYS: &[&str] = &["close", "c"];
const VOLUME_KEYS: &[&str] = &["volume", "v"];
/// `time` is the candle-open second and wins over the event-time `timestamp`.
const TIMESTAMP_KEYS: &[&str] = &["time", "timestamp", "t"];
const SYMBOL_KEYS: &[&str] = &["symbol", "s"];
const INTERVAL_KEYS: &[&str] = &["interval", "i"];

impl Tick {
    /// Resolve an arbitrary payload into a tick. Never fails: numeric fields
    /// that are missing, zero, or unparseable fall through the key list and
    /// finally resolve to 0; `now_ms` stands in for a missing timestamp.
    pub fn normalize(payload: &Value, defaults: &TickDefaults, now_ms: u64) -> Self {
        let timestamp = TIMESTAMP_KEYS
            .iter()
            .filter_map(|key| payload.get(key).and_then(value_as_f64))
            .find(|t| *t > 0.0)
            .map(|t| t as u64)
            .unwrap_or(now_ms);

        Self {
            timestamp,
            open: first_number(payload, OPEN_KEYS),
            high: first_number(payload, HIGH_KEYS),
            low: first_number(payload, LOW_KEYS),
            close: first_number(payload, CLOSE_KEYS),
            volume: first_number(payload, VOLUME_KEYS).max(0.0),
            symbol: first_string(payload, SYMBOL_KEYS).unwrap_or_else(|| defaults.symbol.clone()),
            interval: first_string(payload, INTERVAL_KEYS)
                .unwrap_or_else(|| defaults.interval.clone()),
        }
    }

    /// Create a synthetic tick from a single trade price.
    pub fn from_price(price: f64, timestamp: u64) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
            symbol: TickDefaults::default().symbol,
            interval: TickDefaults::default().interval,
        }
    }
}

/// Read a JSON number or numeric string as a finite f64.
pub fn value_as_f64(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn first_number(payload: &Value, keys: &[&str]) -> f64 {
    keys.iter()
        .filter_map(|key| payload.get(key).and_then(value_as_f64))
        .find(|n| *n != 0.0)
        .unwrap_or(0.0)
}

fn first_string(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| payload.get(key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
