use hdrhistogram::Histogram;
use serde::Serialize;

/// HdrHistogram range for request latency: 1 ms → 1 h, 3 significant figures.
/// Sub-millisecond requests are recorded as 0 and reported as such.
pub(crate) const HIST_LOW: u64 = 1;
pub(crate) const HIST_HIGH: u64 = 3_600_000;
pub(crate) const HIST_SIGFIG: u8 = 3;

/// Latency breakdown (milliseconds) exported as `http.latency.*` gauges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
}

impl LatencySummary {
    /// Returns zeroed values if the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.is_empty() {
            return Self::empty();
        }

        Self {
            min: hist.min(),
            max: hist.max(),
            mean: (hist.mean() * 100.0).round() / 100.0,
            p50: hist.value_at_quantile(0.50),
            p95: hist.value_at_quantile(0.95),
            p99: hist.value_at_quantile(0.99),
        }
    }

    pub fn empty() -> Self {
        Self {
            min: 0,
            max: 0,
            mean: 0.0,
            p50: 0,
            p95: 0,
            p99: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_is_all_zero() {
        let hist = Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG).unwrap();
        assert_eq!(LatencySummary::from_histogram(&hist), LatencySummary::empty());
    }

    #[test]
    fn percentiles_track_recorded_values() {
        let mut hist =
            Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG).unwrap();
        for v in 1..=100u64 {
            hist.record(v).unwrap();
        }
        let s = LatencySummary::from_histogram(&hist);
        assert_eq!(s.min, 1);
        assert_eq!(s.max, 100);
        assert_eq!(s.p50, 50);
        assert_eq!(s.p99, 99);
    }
}
