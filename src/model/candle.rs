use serde::Serialize;

/// One OHLCV bucket of the live series. `bucket_start` is in seconds and
/// aligned to the aggregator's bucket width.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    pub bucket_start: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub last_updated_ms: u64,
}

impl Candle {
    /// Open a new bucket from the first observed tick.
    ///
    /// The open is pinned to `close`; `first_open` only widens the initial
    /// high/low envelope.
    pub fn open_bucket(
        bucket_start: u64,
        first_open: f64,
        close: f64,
        volume: f64,
        now_ms: u64,
    ) -> Self {
        Self {
            bucket_start,
            open: close,
            high: first_open.max(close),
            low: first_open.min(close),
            close,
            volume,
            last_updated_ms: now_ms,
        }
    }

    /// Fold a later tick into this bucket. `open` is never touched.
    pub fn update(&mut self, close: f64, volume: f64, now_ms: u64) {
        self.high = self.high.max(close);
        self.low = self.low.min(close);
        self.close = close;
        self.volume += volume;
        self.last_updated_ms = now_ms;
    }

    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }

    /// `low <= open, close <= high`
    pub fn envelope_holds(&self) -> bool {
        self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
    }

    /// Widen high/low so the envelope covers open and close. History rows
    /// from the backend are not guaranteed to be consistent.
    pub fn repair_envelope(&mut self) {
        self.high = self.high.max(self.open).max(self.close);
        self.low = self.low.min(self.open).min(self.close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candle_lifecycle_basics() {
        let mut c = Candle::open_bucket(90, 100.0, 100.0, 1.0, 1);
        c.update(105.0, 0.5, 2);
        c.update(95.0, 0.5, 3);
        c.update(102.0, 1.0, 4);

        assert!((c.open - 100.0).abs() < f64::EPSILON);
        assert!((c.high - 105.0).abs() < f64::EPSILON);
        assert!((c.low - 95.0).abs() < f64::EPSILON);
        assert!((c.close - 102.0).abs() < f64::EPSILON);
        assert!((c.volume - 3.0).abs() < f64::EPSILON);
        assert_eq!(c.last_updated_ms, 4);
        assert!(c.is_bullish());
        assert!(c.envelope_holds());
    }

    #[test]
    fn open_bucket_uses_first_open_for_envelope_only() {
        let c = Candle::open_bucket(0, 110.0, 100.0, 0.0, 0);
        assert!((c.open - 100.0).abs() < f64::EPSILON);
        assert!((c.high - 110.0).abs() < f64::EPSILON);
        assert!((c.low - 100.0).abs() < f64::EPSILON);
        assert!(c.is_bullish());
        assert!(c.envelope_holds());
    }

    #[test]
    fn repair_envelope_widens_inconsistent_rows() {
        let mut c = Candle {
            bucket_start: 0,
            open: 10.0,
            high: 9.0,
            low: 11.0,
            close: 12.0,
            volume: 0.0,
            last_updated_ms: 0,
        };
        assert!(!c.envelope_holds());
        c.repair_envelope();
        assert!(c.envelope_holds());
        assert!((c.high - 12.0).abs() < f64::EPSILON);
        assert!((c.low - 10.0).abs() < f64::EPSILON);
    }
}
