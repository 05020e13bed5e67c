pub mod chart;
pub mod dashboard;

use anyhow::Result;
use chrono::{DateTime, Local};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::Frame;

use crate::aggregator::{CandleAggregator, IngestOutcome, SeriesSnapshot};
use crate::config::Config;
use crate::event::{AppEvent, HistorySource, WsConnectionStatus};
use crate::model::candle::Candle;

use chart::CandleChart;
use dashboard::{KeybindBar, LogPanel, StatsPanel, StatusBar};

const MAX_LOG_MESSAGES: usize = 200;

/// Latest candle against the one before it.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleStats {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub change: f64,
    pub change_pct: f64,
}

impl CandleStats {
    pub fn from_candles(candles: &[Candle]) -> Option<Self> {
        let latest = candles.last()?;
        let previous = candles.len().checked_sub(2).and_then(|i| candles.get(i));
        let change = previous.map_or(0.0, |p| latest.close - p.close);
        let change_pct = match previous {
            Some(p) if p.close != 0.0 => change / p.close * 100.0,
            _ => 0.0,
        };
        Some(Self {
            open: latest.open,
            high: latest.high,
            low: latest.low,
            close: latest.close,
            change,
            change_pct,
        })
    }

    pub fn is_positive(&self) -> bool {
        self.change >= 0.0
    }
}

pub struct AppState {
    pub symbol: String,
    pub timeframe: String,
    pub aggregator: CandleAggregator,
    pub connection: WsConnectionStatus,
    pub error: Option<String>,
    pub stalled: bool,
    pub update_count: u64,
    pub rejected_count: u64,
    pub last_update: Option<DateTime<Local>>,
    pub last_outcome: Option<IngestOutcome>,
    pub log_messages: Vec<String>,
}

impl AppState {
    pub fn new(symbol: &str, timeframe: &str, aggregator: CandleAggregator) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            aggregator,
            connection: WsConnectionStatus::Disconnected,
            error: None,
            stalled: false,
            update_count: 0,
            rejected_count: 0,
            last_update: None,
            last_outcome: None,
            log_messages: Vec::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let aggregator = CandleAggregator::new(
            config.chart.bucket_width_secs()?,
            config.chart.max_candles,
            config.chart.stale_bucket_policy,
        )?;
        Ok(Self::new(
            &config.chart.normalized_symbol(),
            &config.chart.interval,
            aggregator,
        ))
    }

    pub fn candles(&self) -> &[Candle] {
        self.aggregator.candles()
    }

    pub fn current_price(&self) -> Option<f64> {
        self.aggregator.current_price()
    }

    pub fn ws_connected(&self) -> bool {
        self.connection == WsConnectionStatus::Connected
    }

    pub fn stats(&self) -> Option<CandleStats> {
        CandleStats::from_candles(self.candles())
    }

    pub fn push_log(&mut self, msg: String) {
        self.log_messages.push(msg);
        if self.log_messages.len() > MAX_LOG_MESSAGES {
            self.log_messages.remove(0);
        }
    }

    /// Drop everything tied to the previous subscription.
    pub fn reset_session(&mut self) {
        self.aggregator.reset();
        self.connection = WsConnectionStatus::Disconnected;
        self.error = None;
        self.stalled = false;
        self.update_count = 0;
        self.rejected_count = 0;
        self.last_update = None;
        self.last_outcome = None;
        self.push_log("Reconnecting with a fresh series".to_string());
    }

    fn on_snapshot(&mut self, snapshot: SeriesSnapshot) {
        if let IngestOutcome::Rejected { bucket_start } = snapshot.outcome {
            self.rejected_count += 1;
            tracing::debug!(bucket_start, "stale tick rejected");
        } else {
            self.update_count += 1;
            self.last_update = Some(Local::now());
        }
        self.last_outcome = Some(snapshot.outcome);
    }

    pub fn apply(&mut self, event: AppEvent) {
        match event {
            AppEvent::MarketTick(tick) => {
                self.stalled = false;
                let snapshot = self.aggregator.ingest(&tick);
                self.on_snapshot(snapshot);
            }
            AppEvent::HistoricalCandles { candles, source } => {
                let received = candles.len();
                self.aggregator.replace_history(candles);
                let origin = match source {
                    HistorySource::Rest => "REST".to_string(),
                    HistorySource::Socket { event } => format!("socket '{}'", event),
                };
                self.push_log(format!(
                    "Loaded {} history rows from {} ({} candles kept)",
                    received,
                    origin,
                    self.candles().len()
                ));
            }
            AppEvent::WsStatus(status) => {
                match &status {
                    WsConnectionStatus::Connecting => {}
                    WsConnectionStatus::Connected => {
                        self.error = None;
                        self.push_log("Connected to backend".to_string());
                    }
                    WsConnectionStatus::Disconnected => {
                        self.push_log("[WARN] Disconnected from backend".to_string());
                    }
                    WsConnectionStatus::Failed(reason) => {
                        self.error = Some(format!("Connection failed: {}", reason));
                        self.push_log(format!("[ERR] Connection failed: {}", reason));
                    }
                    WsConnectionStatus::Reconnecting { attempt, delay_ms } => {
                        self.push_log(format!(
                            "[WARN] Reconnecting (attempt {}, wait {}ms)",
                            attempt, delay_ms
                        ));
                    }
                }
                self.connection = status;
            }
            AppEvent::StreamStalled { idle_ms } => {
                self.stalled = true;
                self.push_log(format!("[WARN] No live data for {}ms", idle_ms));
            }
            AppEvent::LogMessage(msg) => {
                self.push_log(msg);
            }
            AppEvent::Error(msg) => {
                self.push_log(format!("[ERR] {}", msg));
                self.error = Some(msg);
            }
        }
    }
}

pub fn render(frame: &mut Frame, state: &AppState) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // status bar
            Constraint::Min(8),    // chart + stats
            Constraint::Length(6), // system log
            Constraint::Length(1), // keybinds
        ])
        .split(frame.area());

    frame.render_widget(
        StatusBar {
            symbol: &state.symbol,
            timeframe: &state.timeframe,
            connection: &state.connection,
            stalled: state.stalled,
            current_price: state.current_price(),
            update_count: state.update_count,
            error: state.error.as_deref(),
        },
        outer[0],
    );

    let main_area = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(40), Constraint::Length(26)])
        .split(outer[1]);

    frame.render_widget(
        CandleChart::new(state.candles(), &state.symbol, &state.timeframe),
        main_area[0],
    );

    frame.render_widget(
        StatsPanel {
            stats: state.stats(),
            candle_count: state.candles().len(),
            max_candles: state.aggregator.series().max_len(),
            rejected: state.rejected_count,
            last_update: state.last_update,
        },
        main_area[1],
    );

    frame.render_widget(LogPanel::new(&state.log_messages), outer[2]);
    frame.render_widget(KeybindBar, outer[3]);
}
