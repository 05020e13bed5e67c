use crate::model::candle::Candle;
use crate::model::tick::Tick;

#[derive(Debug, Clone, PartialEq)]
pub enum WsConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    /// Connect attempt or live session failed; carries the reason.
    Failed(String),
    Reconnecting { attempt: u32, delay_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistorySource {
    Rest,
    Socket { event: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    MarketTick(Tick),
    HistoricalCandles {
        candles: Vec<Candle>,
        source: HistorySource,
    },
    WsStatus(WsConnectionStatus),
    StreamStalled { idle_ms: u64 },
    LogMessage(String),
    Error(String),
}

impl AppEvent {
    /// Outcome of the REST history preload. A failure is surfaced but the
    /// series simply starts empty.
    pub fn from_history_fetch(result: anyhow::Result<Vec<Candle>>) -> Self {
        match result {
            Ok(candles) => Self::HistoricalCandles {
                candles,
                source: HistorySource::Rest,
            },
            Err(e) => Self::Error(format!("History fetch failed: {:#}", e)),
        }
    }
}
