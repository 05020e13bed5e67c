use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::aggregator::StaleBucketPolicy;
use crate::model::tick::TickDefaults;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    pub chart: ChartConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    pub ui: UiConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Socket.IO endpoint; the URL path is the namespace, e.g. `http://localhost:3001/crypto`.
    pub stream_url: String,
    pub rest_base_url: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartConfig {
    pub symbol: String,
    /// Candle width label, e.g. "30s".
    pub interval: String,
    /// Interval tag of the upstream feed, e.g. "1s".
    pub source_interval: String,
    pub max_candles: usize,
    #[serde(default)]
    pub stale_bucket_policy: StaleBucketPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Event names that all carry one live candle/tick payload.
    pub live_events: Vec<String>,
    /// Event names that carry an array of history candles.
    pub history_events: Vec<String>,
    pub subscribe_events: Vec<String>,
    pub join_room_event: Option<String>,
    pub initial_data_events: Vec<String>,
    pub initial_data_limit: usize,
    pub data_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            live_events: vec![
                "candlestick-live".to_string(),
                "candlestick-update".to_string(),
                "kline".to_string(),
            ],
            history_events: vec!["initial-data".to_string(), "candlesticks".to_string()],
            subscribe_events: vec!["subscribe-symbol".to_string(), "subscribe".to_string()],
            join_room_event: Some("join-room".to_string()),
            initial_data_events: vec![
                "get-initial-data".to_string(),
                "get-candlesticks".to_string(),
            ],
            initial_data_limit: 200,
            data_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UiConfig {
    pub refresh_rate_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_connect_timeout_ms() -> u64 {
    20_000
}

fn default_log_file() -> String {
    "candle-stream.log".to_string()
}

/// Parse an interval label (e.g. "1s", "30s", "1m", "4h", "1d", "1w") into seconds.
pub fn parse_interval_secs(s: &str) -> Result<u64> {
    if s.len() < 2 {
        bail!("invalid interval '{}': expected format like '30s'", s);
    }

    let (num_str, suffix) = s.split_at(s.len() - 1);
    let n: u64 = num_str.parse().with_context(|| {
        format!(
            "invalid interval '{}': quantity must be a positive integer",
            s
        )
    })?;
    if n == 0 {
        bail!("invalid interval '{}': quantity must be > 0", s);
    }

    let unit_secs = match suffix {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 7 * 86_400,
        _ => bail!(
            "invalid interval '{}': unsupported suffix '{}', expected one of s/m/h/d/w",
            s,
            suffix
        ),
    };

    n.checked_mul(unit_secs)
        .with_context(|| format!("invalid interval '{}': value is too large", s))
}

impl ChartConfig {
    pub fn bucket_width_secs(&self) -> Result<u64> {
        parse_interval_secs(&self.interval)
    }

    pub fn normalized_symbol(&self) -> String {
        self.symbol.trim().to_ascii_uppercase()
    }

    pub fn tick_defaults(&self) -> TickDefaults {
        TickDefaults {
            symbol: self.normalized_symbol(),
            interval: self.source_interval.clone(),
        }
    }
}

impl Config {
    /// Load `config/default.toml` (or `$CANDLE_CONFIG`), then apply `.env`
    /// and environment overrides.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = std::env::var("CANDLE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut config = Self::from_file(&config_path)?;

        if let Ok(url) = std::env::var("CANDLE_STREAM_URL") {
            config.backend.stream_url = url;
        }
        if let Ok(url) = std::env::var("CANDLE_REST_URL") {
            config.backend.rest_base_url = url;
        }
        if let Ok(symbol) = std::env::var("CANDLE_SYMBOL") {
            config.chart.symbol = symbol;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&config_str).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.chart
            .bucket_width_secs()
            .context("chart.interval is invalid")?;
        if self.chart.max_candles == 0 {
            bail!("chart.max_candles must be > 0");
        }
        if self.chart.normalized_symbol().is_empty() {
            bail!("chart.symbol must not be empty");
        }
        if self.stream.live_events.is_empty() {
            bail!("stream.live_events must name at least one event");
        }
        url::Url::parse(&self.backend.stream_url).context("backend.stream_url is not a valid URL")?;
        url::Url::parse(&self.backend.rest_base_url)
            .context("backend.rest_base_url is not a valid URL")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_toml_uses_stream_defaults() {
        let toml_str = r#"
[backend]
stream_url = "http://localhost:3001/crypto"
rest_base_url = "http://localhost:3001"

[chart]
symbol = "btcusdt"
interval = "30s"
source_interval = "1s"
max_candles = 100

[ui]
refresh_rate_ms = 100

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.chart.normalized_symbol(), "BTCUSDT");
        assert_eq!(config.chart.bucket_width_secs().unwrap(), 30);
        assert_eq!(config.chart.stale_bucket_policy, StaleBucketPolicy::Reject);
        assert_eq!(config.stream.live_events.len(), 3);
        assert_eq!(config.backend.connect_timeout_ms, 20_000);
        assert_eq!(config.logging.file, "candle-stream.log");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_interval_valid() {
        assert_eq!(parse_interval_secs("30s").unwrap(), 30);
        assert_eq!(parse_interval_secs("1m").unwrap(), 60);
        assert_eq!(parse_interval_secs("2h").unwrap(), 7_200);
    }

    #[test]
    fn parse_interval_rejects_invalid_inputs() {
        assert!(parse_interval_secs("").is_err());
        assert!(parse_interval_secs("s").is_err());
        assert!(parse_interval_secs("0s").is_err());
        assert!(parse_interval_secs("1M").is_err());
        assert!(parse_interval_secs("-1s").is_err());
    }
}
