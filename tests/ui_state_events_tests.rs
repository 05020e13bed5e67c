use candle_stream::aggregator::{CandleAggregator, IngestOutcome, StaleBucketPolicy};
use candle_stream::event::{AppEvent, HistorySource, WsConnectionStatus};
use candle_stream::model::candle::Candle;
use candle_stream::model::tick::Tick;
use candle_stream::ui::{AppState, CandleStats};

fn state(max_candles: usize) -> AppState {
    let aggregator = CandleAggregator::new(30, max_candles, StaleBucketPolicy::Reject).unwrap();
    AppState::new("BTCUSDT", "30s", aggregator)
}

#[test]
/// Live ticks flow through the aggregator and bump the update counter.
fn market_ticks_build_candles() {
    let mut s = state(10);
    s.apply(AppEvent::MarketTick(Tick::from_price(10.0, 100)));
    s.apply(AppEvent::MarketTick(Tick::from_price(12.0, 105)));
    s.apply(AppEvent::MarketTick(Tick::from_price(8.0, 135)));

    assert_eq!(s.candles().len(), 2);
    assert_eq!(s.current_price(), Some(8.0));
    assert_eq!(s.update_count, 3);
    assert!(s.last_update.is_some());
    assert!(matches!(
        s.last_outcome,
        Some(IngestOutcome::Inserted { bucket_start: 120, .. })
    ));
}

#[test]
/// Ticks for evicted buckets are counted but leave the series alone.
fn stale_ticks_are_counted_not_applied() {
    let mut s = state(2);
    for ts in [0, 30, 60] {
        s.apply(AppEvent::MarketTick(Tick::from_price(1.0, ts)));
    }
    s.apply(AppEvent::MarketTick(Tick::from_price(99.0, 5)));

    assert_eq!(s.rejected_count, 1);
    assert_eq!(s.update_count, 3);
    assert_eq!(s.current_price(), Some(1.0));
    assert_eq!(s.candles().len(), 2);
}

#[test]
/// History replaces the series and leaves a log line naming its origin.
fn history_seeds_series() {
    let mut s = state(10);
    s.apply(AppEvent::HistoricalCandles {
        candles: vec![
            Candle::open_bucket(60, 1.0, 1.5, 0.0, 0),
            Candle::open_bucket(90, 1.5, 2.0, 0.0, 0),
        ],
        source: HistorySource::Rest,
    });
    assert_eq!(s.candles().len(), 2);
    assert_eq!(s.current_price(), Some(2.0));
    assert!(s.log_messages.last().unwrap().contains("REST"));

    s.apply(AppEvent::HistoricalCandles {
        candles: vec![Candle::open_bucket(120, 3.0, 3.0, 0.0, 0)],
        source: HistorySource::Socket {
            event: "initial-data".to_string(),
        },
    });
    assert_eq!(s.candles().len(), 1);
    assert!(s.log_messages.last().unwrap().contains("initial-data"));
}

#[test]
/// Connection lifecycle drives the status and error fields.
fn connection_status_transitions() {
    let mut s = state(10);
    assert!(!s.ws_connected());

    s.apply(AppEvent::WsStatus(WsConnectionStatus::Connecting));
    assert_eq!(s.connection, WsConnectionStatus::Connecting);

    s.apply(AppEvent::WsStatus(WsConnectionStatus::Failed(
        "refused".to_string(),
    )));
    assert_eq!(s.error.as_deref(), Some("Connection failed: refused"));

    s.apply(AppEvent::WsStatus(WsConnectionStatus::Reconnecting {
        attempt: 2,
        delay_ms: 2_000,
    }));
    assert!(s.log_messages.last().unwrap().contains("attempt 2"));

    s.apply(AppEvent::WsStatus(WsConnectionStatus::Connected));
    assert!(s.ws_connected());
    assert!(s.error.is_none());
}

#[test]
/// A stall flag is raised by the watchdog and cleared by the next tick.
fn stall_is_cleared_by_live_data() {
    let mut s = state(10);
    s.apply(AppEvent::StreamStalled { idle_ms: 31_000 });
    assert!(s.stalled);
    s.apply(AppEvent::MarketTick(Tick::from_price(1.0, 0)));
    assert!(!s.stalled);
}

#[test]
fn log_buffer_is_bounded() {
    let mut s = state(10);
    for i in 0..250 {
        s.apply(AppEvent::LogMessage(format!("line {}", i)));
    }
    assert_eq!(s.log_messages.len(), 200);
    assert_eq!(s.log_messages.first().map(String::as_str), Some("line 50"));

    s.apply(AppEvent::Error("boom".to_string()));
    assert_eq!(s.error.as_deref(), Some("boom"));
    assert_eq!(s.log_messages.last().map(String::as_str), Some("[ERR] boom"));
}

#[test]
/// Reconnect starts from an empty series and clean counters.
fn reset_session_clears_series() {
    let mut s = state(10);
    s.apply(AppEvent::MarketTick(Tick::from_price(1.0, 0)));
    s.apply(AppEvent::WsStatus(WsConnectionStatus::Connected));
    s.reset_session();

    assert!(s.candles().is_empty());
    assert_eq!(s.current_price(), None);
    assert_eq!(s.update_count, 0);
    assert_eq!(s.connection, WsConnectionStatus::Disconnected);
}

#[test]
fn stats_compare_latest_with_previous_close() {
    assert!(CandleStats::from_candles(&[]).is_none());

    let candles = vec![
        Candle::open_bucket(0, 100.0, 100.0, 0.0, 0),
        Candle::open_bucket(30, 100.0, 110.0, 0.0, 0),
    ];
    let stats = CandleStats::from_candles(&candles).unwrap();
    assert!((stats.change - 10.0).abs() < 1e-9);
    assert!((stats.change_pct - 10.0).abs() < 1e-9);
    assert!(stats.is_positive());

    let single = CandleStats::from_candles(&candles[..1]).unwrap();
    assert_eq!(single.change, 0.0);
}

#[test]
/// A failed history preload shows up as an error while the series stays empty.
fn history_fetch_failure_sets_error() {
    let mut s = state(10);
    s.apply(AppEvent::from_history_fetch(Err(anyhow::anyhow!(
        "connection refused"
    ))));
    assert!(s.candles().is_empty());
    assert_eq!(
        s.error.as_deref(),
        Some("History fetch failed: connection refused")
    );
    assert_eq!(
        s.log_messages.last().map(String::as_str),
        Some("[ERR] History fetch failed: connection refused")
    );

    s.apply(AppEvent::from_history_fetch(Ok(vec![Candle::open_bucket(
        0, 1.0, 1.0, 0.0, 0,
    )])));
    assert_eq!(s.candles().len(), 1);
}
