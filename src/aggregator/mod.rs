pub mod bucket;
pub mod series;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::model::candle::Candle;
use crate::model::tick::Tick;

use bucket::bucket_start;
use series::Series;

/// What to do with a tick whose bucket is missing and older than every
/// retained candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StaleBucketPolicy {
    /// Drop the tick. The series only grows forward or fills interior gaps.
    #[default]
    Reject,
    /// Insert and let the window sort it into place (it may be evicted at once).
    Accept,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Updated { bucket_start: u64 },
    Inserted { bucket_start: u64, evicted: usize },
    Rejected { bucket_start: u64 },
}

/// State handed to the rendering side after each ingest.
#[derive(Debug, Clone)]
pub struct SeriesSnapshot {
    pub candles: Vec<Candle>,
    pub current_price: Option<f64>,
    pub outcome: IngestOutcome,
}

/// Folds live ticks into a bounded, time-ordered OHLCV series.
///
/// One aggregator serves one symbol/interval subscription; a reconnect
/// gets a fresh one.
#[derive(Debug, Clone)]
pub struct CandleAggregator {
    width_secs: u64,
    stale_policy: StaleBucketPolicy,
    series: Series,
    current_price: Option<f64>,
}

impl CandleAggregator {
    pub fn new(width_secs: u64, max_candles: usize, stale_policy: StaleBucketPolicy) -> Result<Self> {
        if width_secs == 0 {
            bail!("bucket width must be > 0");
        }
        if max_candles == 0 {
            bail!("max_candles must be > 0");
        }
        Ok(Self {
            width_secs,
            stale_policy,
            series: Series::new(max_candles),
            current_price: None,
        })
    }

    pub fn width_secs(&self) -> u64 {
        self.width_secs
    }

    pub fn candles(&self) -> &[Candle] {
        self.series.candles()
    }

    pub fn series(&self) -> &Series {
        &self.series
    }

    pub fn current_price(&self) -> Option<f64> {
        self.current_price
    }

    pub fn ingest(&mut self, tick: &Tick) -> SeriesSnapshot {
        let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.ingest_at(tick, now_ms)
    }

    /// Same as [`ingest`](Self::ingest) with an explicit wall clock.
    pub fn ingest_at(&mut self, tick: &Tick, now_ms: u64) -> SeriesSnapshot {
        let outcome = self.apply(tick, now_ms);
        if !matches!(outcome, IngestOutcome::Rejected { .. }) {
            self.current_price = Some(tick.close);
        }
        self.snapshot(outcome)
    }

    fn apply(&mut self, tick: &Tick, now_ms: u64) -> IngestOutcome {
        let bucket = bucket_start(tick.timestamp, self.width_secs);

        if let Some(index) = self.series.find(bucket) {
            if let Some(candle) = self.series.get_mut(index) {
                candle.update(tick.close, tick.volume, now_ms);
                tracing::trace!(bucket_start = bucket, close = tick.close, "candle updated");
            }
            return IngestOutcome::Updated { bucket_start: bucket };
        }

        let predates_window = self
            .series
            .first()
            .is_some_and(|oldest| bucket < oldest.bucket_start);
        if predates_window && self.stale_policy == StaleBucketPolicy::Reject {
            tracing::debug!(
                bucket_start = bucket,
                oldest = ?self.series.first().map(|c| c.bucket_start),
                "rejecting tick older than retained window"
            );
            return IngestOutcome::Rejected { bucket_start: bucket };
        }

        let candle = Candle::open_bucket(bucket, tick.open, tick.close, tick.volume, now_ms);
        let evicted = self.series.insert(candle);
        tracing::debug!(bucket_start = bucket, open = tick.close, evicted, "candle opened");
        IngestOutcome::Inserted {
            bucket_start: bucket,
            evicted,
        }
    }

    /// Replace the whole series with history. `bucket_start` of each row may
    /// be any timestamp in the bucket, in seconds or milliseconds; it is
    /// realigned to the bucket width.
    pub fn replace_history(&mut self, rows: Vec<Candle>) -> usize {
        let width = self.width_secs;
        let aligned: Vec<Candle> = rows
            .into_iter()
            .map(|mut c| {
                c.bucket_start = bucket_start(c.bucket_start, width);
                c
            })
            .collect();
        let evicted = self.series.replace_all(aligned);
        self.current_price = self.series.last().map(|c| c.close);
        tracing::info!(
            count = self.series.len(),
            evicted,
            "series seeded from history"
        );
        evicted
    }

    pub fn reset(&mut self) {
        self.series.clear();
        self.current_price = None;
    }

    fn snapshot(&self, outcome: IngestOutcome) -> SeriesSnapshot {
        SeriesSnapshot {
            candles: self.series.candles().to_vec(),
            current_price: self.current_price,
            outcome,
        }
    }
}
