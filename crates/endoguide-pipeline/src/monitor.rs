//! Rolling latency and throughput accounting.
//!
//! The monitor keeps the last `window` completions as `(Instant, latency)`
//! pairs. Percentiles use the nearest-rank method and are floored so that
//! `p99 >= p95 >= avg` holds for any window, including skewed ones where the
//! raw 95th sample sits below the mean.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

/// Point-in-time view of pipeline performance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Samples currently in the window.
    pub sample_count: usize,
    pub avg_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
    /// Completions per second across the window.
    pub fps: f64,
    /// Violations within the window.
    pub violation_count: usize,
    /// `violation_count / sample_count`.
    pub violation_rate: f64,
    pub total_processed: u64,
    pub total_violations: u64,
    pub dropped_frames: u64,
    pub meets_target_fps: bool,
}

#[derive(Debug)]
struct Window {
    samples: VecDeque<(Instant, f64)>,
    total_processed: u64,
    total_violations: u64,
    dropped_frames: u64,
}

/// Thread-safe performance monitor, one per pipeline.
#[derive(Debug)]
pub struct PerformanceMonitor {
    window: Mutex<Window>,
    capacity: usize,
    max_latency_ms: f64,
    target_fps: u32,
}

impl PerformanceMonitor {
    pub fn new(window: usize, max_latency_ms: f64, target_fps: u32) -> Self {
        let capacity = window.max(1);
        Self {
            window: Mutex::new(Window {
                samples: VecDeque::with_capacity(capacity),
                total_processed: 0,
                total_violations: 0,
                dropped_frames: 0,
            }),
            capacity,
            max_latency_ms,
            target_fps,
        }
    }

    pub fn max_latency_ms(&self) -> f64 {
        self.max_latency_ms
    }

    /// Record one completed frame. Returns true when it exceeded the budget.
    pub fn record(&self, latency_ms: f64) -> bool {
        self.record_at(Instant::now(), latency_ms)
    }

    fn record_at(&self, at: Instant, latency_ms: f64) -> bool {
        let violation = latency_ms > self.max_latency_ms;
        let mut w = self.window.lock();
        if w.samples.len() == self.capacity {
            w.samples.pop_front();
        }
        w.samples.push_back((at, latency_ms));
        w.total_processed += 1;
        if violation {
            w.total_violations += 1;
        }
        violation
    }

    /// Record a frame evicted before processing.
    pub fn record_drop(&self) {
        self.window.lock().dropped_frames += 1;
    }

    pub fn snapshot(&self) -> PerformanceStats {
        let w = self.window.lock();
        let mut stats = PerformanceStats {
            total_processed: w.total_processed,
            total_violations: w.total_violations,
            dropped_frames: w.dropped_frames,
            ..Default::default()
        };
        let n = w.samples.len();
        if n == 0 {
            return stats;
        }

        let mut sorted: Vec<f64> = w.samples.iter().map(|&(_, ms)| ms).collect();
        sorted.sort_by(f64::total_cmp);

        let max = sorted[n - 1];
        // Summation drift must not lift the mean above the largest sample
        let avg = (sorted.iter().sum::<f64>() / n as f64).min(max);
        let p95 = nearest_rank(&sorted, 95.0).max(avg);
        let p99 = nearest_rank(&sorted, 99.0).max(p95);
        let violation_count = sorted.iter().filter(|&&ms| ms > self.max_latency_ms).count();

        let fps = match (w.samples.front(), w.samples.back()) {
            (Some(&(first, _)), Some(&(last, _))) if n > 1 => {
                let span = last.duration_since(first).as_secs_f64();
                if span > 0.0 {
                    (n - 1) as f64 / span
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        stats.sample_count = n;
        stats.avg_ms = avg;
        stats.p95_ms = p95;
        stats.p99_ms = p99;
        stats.max_ms = max;
        stats.fps = fps;
        stats.violation_count = violation_count;
        stats.violation_rate = violation_count as f64 / n as f64;
        stats.meets_target_fps = fps >= self.target_fps as f64;
        stats
    }
}

/// Nearest-rank percentile of an ascending, non-empty slice.
fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    let rank = (percentile * sorted.len() as f64 / 100.0).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_snapshot_is_zeroed() {
        let stats = PerformanceMonitor::new(10, 100.0, 30).snapshot();
        assert_eq!(stats, PerformanceStats::default());
    }

    #[test]
    fn test_percentiles_on_uniform_ramp() {
        let monitor = PerformanceMonitor::new(100, 1000.0, 30);
        for ms in 1..=100 {
            monitor.record(ms as f64);
        }
        let stats = monitor.snapshot();
        assert_eq!(stats.sample_count, 100);
        assert_eq!(stats.avg_ms, 50.5);
        assert_eq!(stats.p95_ms, 95.0);
        assert_eq!(stats.p99_ms, 99.0);
        assert_eq!(stats.max_ms, 100.0);
    }

    #[test]
    fn test_violations_counted_strictly_above_budget() {
        let monitor = PerformanceMonitor::new(10, 50.0, 30);
        assert!(!monitor.record(50.0));
        assert!(monitor.record(50.1));
        monitor.record(10.0);
        monitor.record(90.0);
        let stats = monitor.snapshot();
        assert_eq!(stats.violation_count, 2);
        assert_eq!(stats.violation_rate, 0.5);
        assert_eq!(stats.total_violations, 2);
    }

    #[test]
    fn test_window_evicts_oldest_but_totals_accumulate() {
        let monitor = PerformanceMonitor::new(3, 100.0, 30);
        for ms in [500.0, 1.0, 2.0, 3.0] {
            monitor.record(ms);
        }
        let stats = monitor.snapshot();
        assert_eq!(stats.sample_count, 3);
        assert_eq!(stats.max_ms, 3.0);
        assert_eq!(stats.violation_count, 0);
        assert_eq!(stats.total_processed, 4);
        assert_eq!(stats.total_violations, 1);
    }

    #[test]
    fn test_fps_from_completion_times() {
        let monitor = PerformanceMonitor::new(100, 100.0, 30);
        let t0 = Instant::now();
        for i in 0..11 {
            monitor.record_at(t0 + Duration::from_millis(i * 20), 5.0);
        }
        let stats = monitor.snapshot();
        assert!((stats.fps - 50.0).abs() < 1e-6);
        assert!(stats.meets_target_fps);
    }

    #[test]
    fn test_drops_count_outside_the_window() {
        let monitor = PerformanceMonitor::new(5, 100.0, 30);
        assert_eq!(monitor.snapshot(), PerformanceStats::default());
        monitor.record_drop();
        monitor.record_drop();
        monitor.record(1.0);
        let stats = monitor.snapshot();
        assert_eq!(stats.dropped_frames, 2);
        assert_eq!(stats.sample_count, 1);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn percentiles_are_ordered(latencies in prop::collection::vec(0.0f64..10_000.0, 1..400)) {
                let monitor = PerformanceMonitor::new(300, 200.0, 30);
                for ms in &latencies {
                    monitor.record(*ms);
                }
                let stats = monitor.snapshot();
                prop_assert!(stats.p95_ms >= stats.avg_ms);
                prop_assert!(stats.p99_ms >= stats.p95_ms);
                prop_assert!(stats.max_ms >= stats.p99_ms);
                prop_assert!((0.0..=1.0).contains(&stats.violation_rate));
            }
        }
    }
}
