use serde::Deserialize;

use crate::model::candle::Candle;

/// Accept a JSON number, numeric string, or null (→ 0.0).
pub fn string_or_number_to_f64_default<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    match v {
        serde_json::Value::Null => Ok(0.0),
        serde_json::Value::String(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("invalid number")),
        _ => Err(serde::de::Error::custom("invalid numeric value")),
    }
}

pub fn string_or_number_to_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    match v {
        serde_json::Value::String(s) => s.trim().parse::<u64>().map_err(serde::de::Error::custom),
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .ok_or_else(|| serde::de::Error::custom("invalid timestamp")),
        _ => Err(serde::de::Error::custom("invalid timestamp value")),
    }
}

/// One row of `GET /candles` (also the item shape of history socket events).
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryCandle {
    #[serde(alias = "timestamp", alias = "t", deserialize_with = "string_or_number_to_u64")]
    pub time: u64,
    #[serde(alias = "o", deserialize_with = "string_or_number_to_f64_default")]
    pub open: f64,
    #[serde(alias = "h", deserialize_with = "string_or_number_to_f64_default")]
    pub high: f64,
    #[serde(alias = "l", deserialize_with = "string_or_number_to_f64_default")]
    pub low: f64,
    #[serde(alias = "c", deserialize_with = "string_or_number_to_f64_default")]
    pub close: f64,
    #[serde(default, alias = "v", deserialize_with = "string_or_number_to_f64_default")]
    pub volume: f64,
}

impl HistoryCandle {
    /// `bucket_start` carries the raw row time; the aggregator realigns it.
    pub fn into_candle(self, now_ms: u64) -> Candle {
        Candle {
            bucket_start: self.time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume.max(0.0),
            last_updated_ms: now_ms,
        }
    }
}

/// Backend error body, when it bothers to send one.
#[derive(Debug, Deserialize)]
pub struct BackendErrorResponse {
    #[serde(alias = "error")]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_history_rows() {
        let json = r#"[
            {"time": 1700000010, "open": 42000.5, "high": "42010", "low": 41990, "close": 42005},
            {"t": 1700000040000, "o": "1", "h": "2", "l": "0.5", "c": "1.5", "v": "3"}
        ]"#;
        let rows: Vec<HistoryCandle> = serde_json::from_str(json).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].time, 1_700_000_010);
        assert!((rows[0].high - 42010.0).abs() < f64::EPSILON);
        assert!((rows[0].volume - 0.0).abs() < f64::EPSILON);
        assert_eq!(rows[1].time, 1_700_000_040_000);
        assert!((rows[1].volume - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_row_without_time() {
        let json = r#"{"open": 1, "high": 1, "low": 1, "close": 1}"#;
        assert!(serde_json::from_str::<HistoryCandle>(json).is_err());
    }
}
