//! Fetch latency, recorded per call (failures and timeouts included).

use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

/// Microseconds, 1us up to one hour.
const MAX_TRACKABLE_US: u64 = 3_600_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencySnapshot {
    pub samples: u64,
    pub p50_us: Option<u64>,
    pub p95_us: Option<u64>,
    pub p99_us: Option<u64>,
}

pub struct LatencyStats {
    histogram: Mutex<Histogram<u64>>,
}

impl LatencyStats {
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(1, MAX_TRACKABLE_US, 3)
            .expect("valid histogram bounds");
        Self {
            histogram: Mutex::new(histogram),
        }
    }

    /// Sub-microsecond calls count as 1us; anything past an hour is clamped.
    pub fn record(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX).max(1);
        if let Ok(mut h) = self.histogram.lock() {
            h.saturating_record(us);
        }
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        let Ok(h) = self.histogram.lock() else {
            return LatencySnapshot { samples: 0, p50_us: None, p95_us: None, p99_us: None };
        };
        let at = |q: f64| (h.len() > 0).then(|| h.value_at_quantile(q));
        LatencySnapshot {
            samples: h.len(),
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}
