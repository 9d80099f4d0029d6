//! Maps response latencies onto a fixed set of histogram-style buckets.

/// Upper bounds of the latency buckets, in milliseconds. Each bucket is
/// closed at its upper bound; anything above the last bound falls into the
/// open ">5s" bucket.
const INTERVALS_MS: [u64; 18] = [
    5, 10, 20, 35, 50, 75, 100, 125, 150, 175, 200, 300, 400, 500, 750, 1000, 2000, 5000,
];

const LABELS: [&str; 19] = [
    "0ms-5ms",
    "5ms-10ms",
    "10ms-20ms",
    "20ms-35ms",
    "35ms-50ms",
    "50ms-75ms",
    "75ms-100ms",
    "100ms-125ms",
    "125ms-150ms",
    "150ms-175ms",
    "175ms-200ms",
    "200ms-300ms",
    "300ms-400ms",
    "400ms-500ms",
    "500ms-750ms",
    "750ms-1s",
    "1s-2s",
    "2s-5s",
    ">5s",
];

/// Returns the bucket label for a latency in milliseconds.
#[must_use]
pub fn convert_time_to_interval(millis: u64) -> &'static str {
    for (i, bound) in INTERVALS_MS.iter().enumerate() {
        if millis <= *bound {
            return LABELS[i];
        }
    }
    LABELS[LABELS.len() - 1]
}

/// Returns all bucket labels in ascending order, overflow bucket last.
#[must_use]
pub fn all_performance_intervals() -> &'static [&'static str] {
    &LABELS
}
