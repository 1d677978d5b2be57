//! Histogram of publish latencies (hand-off to broker ack).
//!
//! Bins are 1ms wide and cover 0–10s, the default send deadline. Slower
//! samples land in the last bin; `max` still reports the exact value.

use std::time::Duration;

const BIN_WIDTH_US: u64 = 1_000;
const NUM_BINS: usize = 10_000;

/// Summary of the samples recorded since the last reset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub min: Duration,
    pub max: Duration,
    pub avg: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
}

impl std::fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "n={} min={:?} max={:?} avg={:?} p50={:?} p90={:?} p99={:?}",
            self.count, self.min, self.max, self.avg, self.p50, self.p90, self.p99,
        )
    }
}

/// Fixed-bin latency histogram. Callers share it behind a mutex.
#[derive(Debug)]
pub struct LatencyCollector {
    bins: Vec<u64>,
    count: u64,
    sum_us: u64,
    min_us: u64,
    max_us: u64,
}

impl LatencyCollector {
    pub fn new() -> Self {
        Self { bins: vec![0; NUM_BINS], count: 0, sum_us: 0, min_us: u64::MAX, max_us: 0 }
    }

    pub fn record(&mut self, latency: Duration) {
        let us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.count += 1;
        self.sum_us = self.sum_us.saturating_add(us);
        self.min_us = self.min_us.min(us);
        self.max_us = self.max_us.max(us);
        let bin = ((us / BIN_WIDTH_US) as usize).min(NUM_BINS - 1);
        self.bins[bin] += 1;
    }

    /// Returns `None` when nothing was recorded.
    pub fn stats(&self) -> Option<LatencyStats> {
        if self.count == 0 {
            return None;
        }
        Some(LatencyStats {
            count: self.count,
            min: Duration::from_micros(self.min_us),
            max: Duration::from_micros(self.max_us),
            avg: Duration::from_micros(self.sum_us / self.count),
            p50: self.percentile(0.50),
            p90: self.percentile(0.90),
            p99: self.percentile(0.99),
        })
    }

    /// Return the current stats and start a new period.
    pub fn take(&mut self) -> Option<LatencyStats> {
        let stats = self.stats();
        self.reset();
        stats
    }

    pub fn reset(&mut self) {
        self.bins.fill(0);
        self.count = 0;
        self.sum_us = 0;
        self.min_us = u64::MAX;
        self.max_us = 0;
    }

    // Upper edge of the bin holding the requested rank.
    fn percentile(&self, pct: f64) -> Duration {
        let target = ((self.count as f64 * pct).ceil() as u64).max(1);
        let mut seen = 0u64;
        for (i, &n) in self.bins.iter().enumerate() {
            seen += n;
            if seen >= target {
                let edge = (i as u64 + 1) * BIN_WIDTH_US;
                return Duration::from_micros(edge.min(self.max_us));
            }
        }
        Duration::from_micros(self.max_us)
    }
}

impl Default for LatencyCollector {
    fn default() -> Self {
        Self::new()
    }
}
