/// Timestamps above this are taken to be milliseconds. A seconds value
/// only crosses it around the year 33658; a millisecond value is below it
/// only before 2001-09-09.
pub const MILLIS_THRESHOLD: u64 = 1_000_000_000_000;

/// Upstream payloads carry event time in either seconds or milliseconds
/// with nothing but magnitude to tell them apart.
pub fn timestamp_secs(timestamp: u64) -> u64 {
    if timestamp > MILLIS_THRESHOLD {
        timestamp / 1000
    } else {
        timestamp
    }
}

/// Start (seconds) of the `width_secs`-wide bucket containing `timestamp`.
pub fn bucket_start(timestamp: u64, width_secs: u64) -> u64 {
    assert!(width_secs > 0, "bucket width must be > 0");
    let secs = timestamp_secs(timestamp);
    secs - (secs % width_secs)
}
