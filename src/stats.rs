//! Latency statistics over the timed-phase samples.
//!
//! Exact sample-based arithmetic: sort once, nearest-rank percentiles
//! (element at `floor(n*q)`, clamped), population variance. Throughput is
//! computed from the wall clock of the whole timed phase, never summed from
//! individual latencies — the two differ under concurrency.

use serde::Serialize;
use std::time::Duration;

/// All values in seconds. Zero-valued for an empty sample set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl LatencyStats {
    pub fn compute(latencies: &[Duration]) -> Self {
        if latencies.is_empty() {
            return Self::default();
        }

        let mut secs: Vec<f64> = latencies.iter().map(Duration::as_secs_f64).collect();
        secs.sort_by(|a, b| a.total_cmp(b));

        let n = secs.len();
        let mean = secs.iter().sum::<f64>() / n as f64;
        let var = secs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n as f64;

        Self {
            count: n,
            mean,
            std: var.sqrt(),
            min: secs[0],
            max: secs[n - 1],
            p50: percentile(&secs, 0.50),
            p95: percentile(&secs, 0.95),
            p99: percentile(&secs, 0.99),
        }
    }
}

/// Nearest-rank percentile over an ascending-sorted slice:
/// `sorted[min(floor(n*q), n-1)]`, no interpolation.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let idx = ((sorted.len() as f64 * q).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Queries per second over the timed phase's wall clock.
pub fn throughput(queries: usize, wall: Duration) -> f64 {
    let secs = wall.as_secs_f64();
    if secs > 0.0 {
        queries as f64 / secs
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: &[u64]) -> Vec<Duration> {
        v.iter().map(|&m| Duration::from_millis(m)).collect()
    }

    #[test]
    fn test_empty_input_all_zero() {
        assert_eq!(LatencyStats::compute(&[]), LatencyStats::default());
    }

    #[test]
    fn test_documented_example() {
        // [0.01, 0.02, 0.03, 0.04] s
        let stats = LatencyStats::compute(&ms(&[10, 20, 30, 40]));
        assert_eq!(stats.count, 4);
        assert!((stats.mean - 0.025).abs() < 1e-12);
        assert!((stats.std - 0.011180339887498949).abs() < 1e-9);
        assert_eq!(stats.min, 0.01);
        assert_eq!(stats.max, 0.04);
        // floor(4 * 0.5) = 2 → third element
        assert_eq!(stats.p50, 0.03);
        // floor(4 * 0.95) = floor(4 * 0.99) = 3 → last element
        assert_eq!(stats.p95, 0.04);
        assert_eq!(stats.p99, 0.04);
    }

    #[test]
    fn test_percentile_law() {
        let sorted: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        for (q, expected_idx) in [(0.5, 50), (0.95, 95), (0.99, 99), (1.0, 99)] {
            assert_eq!(percentile(&sorted, q), sorted[expected_idx]);
        }
        // Single element: everything clamps to it.
        assert_eq!(percentile(&[7.0], 0.99), 7.0);
    }

    #[test]
    fn test_order_independent() {
        let shuffled = ms(&[40, 10, 30, 20]);
        assert_eq!(
            LatencyStats::compute(&shuffled),
            LatencyStats::compute(&ms(&[10, 20, 30, 40]))
        );
    }

    #[test]
    fn test_throughput_wall_clock() {
        assert_eq!(throughput(2_000, Duration::from_secs(10)), 200.0);
        assert_eq!(throughput(100, Duration::ZERO), 0.0);
    }
}
