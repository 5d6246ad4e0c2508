use hdrhistogram::Histogram;
use serde::Serialize;

/// Percentile breakdown of call durations, in microseconds.
/// Rendered at the bottom of the summary block in the report.
#[derive(Debug, Clone, Serialize)]
pub struct PercentileSet {
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub count: u64,
}

impl PercentileSet {
    /// Extract a full percentile set from an HdrHistogram.
    /// Returns zeroed values if the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }

        Self {
            min_us: hist.min(),
            max_us: hist.max(),
            mean_us: hist.mean(),
            p50_us: hist.value_at_percentile(50.0),
            p95_us: hist.value_at_percentile(95.0),
            p99_us: hist.value_at_percentile(99.0),
            count: hist.len(),
        }
    }

    /// All-zero placeholder used before any calls are recorded.
    pub fn empty() -> Self {
        Self {
            min_us: 0,
            max_us: 0,
            mean_us: 0.0,
            p50_us: 0,
            p95_us: 0,
            p99_us: 0,
            count: 0,
        }
    }

    /// Is this set backed by at least one observation?
    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_yields_zeroed_set() {
        let hist = Histogram::<u64>::new(3).unwrap();
        let set = PercentileSet::from_histogram(&hist);
        assert!(!set.has_data());
        assert_eq!(set.min_us, 0);
        assert_eq!(set.mean_us, 0.0);
    }

    #[test]
    fn percentiles_track_recorded_values() {
        let mut hist = Histogram::<u64>::new(3).unwrap();
        for v in [100, 200, 300, 400, 500] {
            hist.record(v).unwrap();
        }
        let set = PercentileSet::from_histogram(&hist);
        assert_eq!(set.count, 5);
        assert!(set.min_us <= 100 && set.max_us >= 499);
        assert!(set.p50_us >= set.min_us && set.p50_us <= set.p99_us);
    }
}
