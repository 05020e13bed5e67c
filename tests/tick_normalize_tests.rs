use candle_stream::aggregator::{CandleAggregator, IngestOutcome, StaleBucketPolicy};
use candle_stream::model::tick::{Tick, TickDefaults};
use serde_json::json;

fn defaults() -> TickDefaults {
    TickDefaults {
        symbol: "BTCUSDT".to_string(),
        interval: "1s".to_string(),
    }
}

#[test]
fn full_names_take_precedence_over_abbreviations() {
    let t = Tick::normalize(
        &json!({
            "timestamp": 1_700_000_001_000u64, "t": 5,
            "open": 1.0, "o": 9.0,
            "high": 3.0, "h": 9.0,
            "low": 0.5, "l": 9.0,
            "close": 2.0, "c": 9.0,
            "volume": 4.0, "v": 9.0,
            "symbol": "ETHUSDT", "s": "XRPUSDT",
            "interval": "1m", "i": "5m"
        }),
        &defaults(),
        0,
    );
    assert_eq!(t.timestamp, 1_700_000_001_000);
    assert!((t.open - 1.0).abs() < f64::EPSILON);
    assert!((t.high - 3.0).abs() < f64::EPSILON);
    assert!((t.low - 0.5).abs() < f64::EPSILON);
    assert!((t.close - 2.0).abs() < f64::EPSILON);
    assert!((t.volume - 4.0).abs() < f64::EPSILON);
    assert_eq!(t.symbol, "ETHUSDT");
    assert_eq!(t.interval, "1m");
}

#[test]
fn time_key_wins_over_timestamp_and_t() {
    let t = Tick::normalize(&json!({"time": 1234, "t": 99, "c": 1}), &defaults(), 0);
    assert_eq!(t.timestamp, 1234);

    let t = Tick::normalize(
        &json!({"timestamp": 1_700_000_045_000u64, "time": 1_700_000_010, "c": 1}),
        &defaults(),
        0,
    );
    assert_eq!(t.timestamp, 1_700_000_010);
}

#[test]
/// A candle-open `time` decides the bucket even when the event-time
/// `timestamp` already sits in the next one.
fn candle_open_time_decides_bucket() {
    let tick = Tick::normalize(
        &json!({"time": 1_700_000_010, "timestamp": 1_700_000_045_000u64, "close": 5}),
        &defaults(),
        0,
    );
    let mut agg = CandleAggregator::new(30, 10, StaleBucketPolicy::Reject).unwrap();
    let snap = agg.ingest_at(&tick, 0);
    assert_eq!(
        snap.outcome,
        IngestOutcome::Inserted {
            bucket_start: 1_700_000_010,
            evicted: 0
        }
    );
}

#[test]
fn zero_time_falls_back_to_timestamp() {
    let t = Tick::normalize(
        &json!({"time": 0, "timestamp": 1_700_000_045_000u64, "c": 1}),
        &defaults(),
        0,
    );
    assert_eq!(t.timestamp, 1_700_000_045_000);
}

#[test]
fn close_only_payload_fills_ohl_from_close() {
    let t = Tick::normalize(&json!({"c": "42000.25", "t": 10}), &defaults(), 0);
    assert!((t.open - 42000.25).abs() < f64::EPSILON);
    assert!((t.high - 42000.25).abs() < f64::EPSILON);
    assert!((t.low - 42000.25).abs() < f64::EPSILON);
    assert!((t.close - 42000.25).abs() < f64::EPSILON);
    assert_eq!(t.volume, 0.0);
}

#[test]
fn zero_values_fall_through_to_next_key() {
    let t = Tick::normalize(
        &json!({"timestamp": 0, "t": 77, "open": 0, "o": "5.5", "close": 0, "c": 6.0}),
        &defaults(),
        0,
    );
    assert_eq!(t.timestamp, 77);
    assert!((t.open - 5.5).abs() < f64::EPSILON);
    assert!((t.close - 6.0).abs() < f64::EPSILON);
}

#[test]
fn unparseable_strings_count_as_missing() {
    let t = Tick::normalize(
        &json!({"close": "n/a", "c": "101", "volume": "lots"}),
        &defaults(),
        5,
    );
    assert!((t.close - 101.0).abs() < f64::EPSILON);
    assert_eq!(t.volume, 0.0);
    assert_eq!(t.timestamp, 5);
}

#[test]
fn missing_fields_use_defaults_and_clock() {
    let t = Tick::normalize(&json!({}), &defaults(), 1_700_000_000_123);
    assert_eq!(t.timestamp, 1_700_000_000_123);
    assert_eq!(t.close, 0.0);
    assert_eq!(t.open, 0.0);
    assert_eq!(t.symbol, "BTCUSDT");
    assert_eq!(t.interval, "1s");
}

#[test]
fn non_object_payloads_do_not_fail() {
    for payload in [json!(null), json!(42), json!("kline"), json!([1, 2, 3])] {
        let t = Tick::normalize(&payload, &defaults(), 9);
        assert_eq!(t.timestamp, 9);
        assert_eq!(t.close, 0.0);
        assert_eq!(t.symbol, "BTCUSDT");
    }
}

#[test]
fn blank_symbol_uses_default() {
    let t = Tick::normalize(&json!({"symbol": "  ", "s": "", "c": 1}), &defaults(), 0);
    assert_eq!(t.symbol, "BTCUSDT");
}

#[test]
fn negative_volume_is_clamped() {
    let t = Tick::normalize(&json!({"c": 1, "v": -3.0}), &defaults(), 0);
    assert_eq!(t.volume, 0.0);
}

#[test]
fn canonical_tick_normalizes_to_itself() {
    let tick = Tick {
        timestamp: 1_700_000_000_500,
        open: 42000.0,
        high: 42100.5,
        low: 41950.25,
        close: 42050.0,
        volume: 1.75,
        symbol: "BTCUSDT".to_string(),
        interval: "1s".to_string(),
    };
    let value = serde_json::to_value(&tick).unwrap();
    let again = Tick::normalize(&value, &TickDefaults::default(), 0);
    assert_eq!(again, tick);
}
