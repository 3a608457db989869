use hdrhistogram::Histogram;

/// Latency distribution in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSummary {
    pub count: u64,
    pub min: f64,
    pub mean: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
    pub stdev: f64,
}

pub(crate) fn new_latency_histogram() -> Histogram<u64> {
    // Microsecond resolution, up to one hour.
    match Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

/// Summarize a microsecond histogram into milliseconds. Empty histograms have no summary.
pub(crate) fn summarize_latency(h: &Histogram<u64>) -> Option<HistogramSummary> {
    if h.is_empty() {
        return None;
    }

    let ms = |us: u64| us as f64 / 1000.0;

    Some(HistogramSummary {
        count: h.len(),
        min: ms(h.min()),
        mean: h.mean() / 1000.0,
        p50: ms(h.value_at_quantile(0.50)),
        p75: ms(h.value_at_quantile(0.75)),
        p90: ms(h.value_at_quantile(0.90)),
        p95: ms(h.value_at_quantile(0.95)),
        p99: ms(h.value_at_quantile(0.99)),
        max: ms(h.max()),
        stdev: h.stdev() / 1000.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_summary() {
        let h = new_latency_histogram();
        assert!(summarize_latency(&h).is_none());
    }

    #[test]
    fn summary_is_reported_in_milliseconds() {
        let mut h = new_latency_histogram();
        let _ = h.record(10_000);
        let _ = h.record(20_000);
        let _ = h.record(30_000);

        let Some(s) = summarize_latency(&h) else {
            panic!("expected a summary");
        };
        assert_eq!(s.count, 3);
        assert!((s.min - 10.0).abs() < 0.1, "min={}", s.min);
        assert!((s.max - 30.0).abs() < 0.1, "max={}", s.max);
        assert!((s.mean - 20.0).abs() < 0.1, "mean={}", s.mean);
        assert!(s.p50 >= s.min && s.p50 <= s.max);
    }
}
