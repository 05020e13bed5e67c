use crate::model::candle::Candle;

/// Bounded candle window, strictly increasing by `bucket_start`.
#[derive(Debug, Clone)]
pub struct Series {
    candles: Vec<Candle>,
    max_len: usize,
}

impl Series {
    pub fn new(max_len: usize) -> Self {
        assert!(max_len > 0, "max_len must be > 0");
        Self {
            candles: Vec::with_capacity(max_len + 1),
            max_len,
        }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn is_full(&self) -> bool {
        self.candles.len() >= self.max_len
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Index of the candle for `bucket_start`, if retained.
    pub fn find(&self, bucket_start: u64) -> Option<usize> {
        self.candles
            .binary_search_by_key(&bucket_start, |c| c.bucket_start)
            .ok()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Candle> {
        self.candles.get_mut(index)
    }

    /// Add a candle for a bucket not yet present, re-sort, and trim the
    /// oldest candles past `max_len`. Returns how many were evicted.
    pub fn insert(&mut self, candle: Candle) -> usize {
        debug_assert!(self.find(candle.bucket_start).is_none());
        self.candles.push(candle);
        self.candles.sort_by_key(|c| c.bucket_start);
        self.trim_front()
    }

    /// Swap in a whole new window. Rows sharing a bucket are merged in
    /// arrival order; the result is sorted and trimmed.
    pub fn replace_all(&mut self, mut candles: Vec<Candle>) -> usize {
        candles.sort_by_key(|c| c.bucket_start);
        let mut merged: Vec<Candle> = Vec::with_capacity(candles.len());
        for candle in candles {
            match merged.last_mut() {
                Some(prev) if prev.bucket_start == candle.bucket_start => {
                    prev.high = prev.high.max(candle.high);
                    prev.low = prev.low.min(candle.low);
                    prev.close = candle.close;
                    prev.volume += candle.volume;
                    prev.last_updated_ms = prev.last_updated_ms.max(candle.last_updated_ms);
                }
                _ => merged.push(candle),
            }
        }
        for candle in &mut merged {
            candle.repair_envelope();
        }
        self.candles = merged;
        self.trim_front()
    }

    pub fn clear(&mut self) {
        self.candles.clear();
    }

    fn trim_front(&mut self) -> usize {
        if self.candles.len() <= self.max_len {
            return 0;
        }
        let excess = self.candles.len() - self.max_len;
        self.candles.drain(..excess);
        excess
    }

    /// Strictly increasing `bucket_start`.
    pub fn is_ordered(&self) -> bool {
        self.candles
            .windows(2)
            .all(|w| w[0].bucket_start < w[1].bucket_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(bucket_start: u64, close: f64) -> Candle {
        Candle::open_bucket(bucket_start, close, close, 1.0, 0)
    }

    #[test]
    fn insert_sorts_and_trims_oldest() {
        let mut s = Series::new(2);
        assert_eq!(s.insert(candle(60, 1.0)), 0);
        assert_eq!(s.insert(candle(0, 2.0)), 0);
        assert_eq!(s.candles()[0].bucket_start, 0);
        assert_eq!(s.insert(candle(30, 3.0)), 1);
        let buckets: Vec<u64> = s.candles().iter().map(|c| c.bucket_start).collect();
        assert_eq!(buckets, vec![30, 60]);
        assert!(s.is_ordered());
    }

    #[test]
    fn replace_all_merges_duplicate_buckets() {
        let mut s = Series::new(10);
        let mut a = candle(30, 10.0);
        a.high = 12.0;
        let mut b = candle(30, 11.0);
        b.low = 8.0;
        s.replace_all(vec![candle(60, 1.0), a, b]);
        assert_eq!(s.len(), 2);
        let first = &s.candles()[0];
        assert!((first.open - 10.0).abs() < f64::EPSILON);
        assert!((first.high - 12.0).abs() < f64::EPSILON);
        assert!((first.low - 8.0).abs() < f64::EPSILON);
        assert!((first.close - 11.0).abs() < f64::EPSILON);
        assert!((first.volume - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn replace_all_trims_to_bound() {
        let mut s = Series::new(3);
        let evicted = s.replace_all((0..5).map(|i| candle(i * 30, i as f64)).collect());
        assert_eq!(evicted, 2);
        assert_eq!(s.first().map(|c| c.bucket_start), Some(60));
        assert!(s.is_full());
    }
}
