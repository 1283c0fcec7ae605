use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

// ─── Configuration ───────────────────────────────────────────────

/// HdrHistogram range: 1 μs → 60 s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

// ─── Percentiles ─────────────────────────────────────────────────

/// Percentile breakdown of send latency (μs) for one report cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PercentileSet {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub count: u64,
}

impl PercentileSet {
    /// Returns zeroed values if the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::default();
        }

        Self {
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_percentile(50.0),
            p95: hist.value_at_percentile(95.0),
            p99: hist.value_at_percentile(99.0),
            count: hist.len(),
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

// ─── Recorder ────────────────────────────────────────────────────

/// Thread-safe latency histogram shared by the workers of one cycle.
pub struct LatencyRecorder {
    inner: Mutex<Option<Histogram<u64>>>,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        // Bounds are constant and valid; a failure leaves recording disabled
        let hist = Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG).ok();
        Self {
            inner: Mutex::new(hist),
        }
    }

    /// Records one observation, clamped to [1 μs, 60 s].
    pub fn record(&self, latency: Duration) {
        let us = (latency.as_micros() as u64).clamp(HIST_LOW, HIST_HIGH);
        if let Some(hist) = self.inner.lock().as_mut() {
            let _ = hist.record(us);
        }
    }

    pub fn percentiles(&self) -> PercentileSet {
        self.inner
            .lock()
            .as_ref()
            .map(PercentileSet::from_histogram)
            .unwrap_or_default()
    }
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Cycle report ────────────────────────────────────────────────

/// Outcome of one report cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    /// Metrics acknowledged by the server
    pub sent: usize,
    /// Metrics whose send failed (retried next cycle with a fresh value)
    pub failed: usize,
    /// Names that did not resolve to a sample
    pub skipped: usize,
    pub elapsed_ms: u64,
    pub latency: PercentileSet,
}
