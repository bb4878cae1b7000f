//! Rolling interval statistics
//!
//! Each `tick` records the time since the previous tick. Once `window`
//! intervals have been collected the window is summarised (mean, min, max,
//! standard deviation) and started afresh. Completed windows after the first
//! also feed long-term averages of the standard deviation and maximum, which
//! drive the regulator's automatic tolerance.

use std::time::Duration;

use serde::Serialize;

/// Summary of the last completed window, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IntervalSummary {
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub std_dev_ms: f64,
    pub long_term_std_dev_ms: f64,
    pub long_term_max_ms: f64,
    /// Windows completed so far
    pub windows: u64,
}

/// Interval accumulator over a fixed window of ticks
///
/// Storage is allocated once; `tick` never allocates.
#[derive(Debug, Clone)]
pub struct IntervalTracker {
    data: Vec<f64>,
    count: usize,
    acc: f64,
    min: f64,
    max: f64,
    last_time: Option<Duration>,
    summary: IntervalSummary,
    long_term_std_dev_acc: f64,
    long_term_max_acc: f64,
}

impl IntervalTracker {
    /// Create a tracker summarising every `window` intervals
    pub fn new(window: usize) -> Self {
        let window = window.max(2);
        Self {
            data: vec![0.0; window],
            count: 0,
            acc: 0.0,
            min: f64::MAX,
            max: 0.0,
            last_time: None,
            summary: IntervalSummary::default(),
            long_term_std_dev_acc: 0.0,
            long_term_max_acc: 0.0,
        }
    }

    /// Window length in ticks
    pub fn window(&self) -> usize {
        self.data.len()
    }

    /// Record an event at `now`
    ///
    /// Returns true when this tick completed a window.
    pub fn tick(&mut self, now: Duration) -> bool {
        let Some(last) = self.last_time.replace(now) else {
            return false;
        };
        let elapsed_ms = now.saturating_sub(last).as_secs_f64() * 1000.0;

        self.data[self.count] = elapsed_ms;
        self.min = self.min.min(elapsed_ms);
        self.max = self.max.max(elapsed_ms);
        self.acc += elapsed_ms;
        self.count += 1;

        if self.count == self.data.len() {
            self.complete_window();
            true
        } else {
            false
        }
    }

    fn complete_window(&mut self) {
        let n = self.data.len() as f64;
        let mean = self.acc / n;
        let var = self
            .data
            .iter()
            .map(|v| {
                let d = v - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        let std_dev = var.sqrt();

        // the first window includes start-up transients
        let windows = self.summary.windows;
        if windows > 0 {
            self.long_term_std_dev_acc += std_dev;
            self.long_term_max_acc += self.max;
            self.summary.long_term_std_dev_ms = self.long_term_std_dev_acc / windows as f64;
            self.summary.long_term_max_ms = self.long_term_max_acc / windows as f64;
        }

        self.summary.mean_ms = mean;
        self.summary.min_ms = self.min;
        self.summary.max_ms = self.max;
        self.summary.std_dev_ms = std_dev;
        self.summary.windows = windows + 1;

        self.count = 0;
        self.acc = 0.0;
        self.min = f64::MAX;
        self.max = 0.0;
    }

    /// Summary of the last completed window
    pub fn summary(&self) -> IntervalSummary {
        self.summary
    }

    /// Time of the most recent tick
    pub fn last_time(&self) -> Option<Duration> {
        self.last_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: f64) -> Duration {
        Duration::from_secs_f64(v / 1000.0)
    }

    #[test]
    fn test_first_tick_only_primes() {
        let mut tracker = IntervalTracker::new(4);
        assert!(!tracker.tick(ms(1.0)));
        assert_eq!(tracker.summary().windows, 0);
    }

    #[test]
    fn test_window_summary() {
        let mut tracker = IntervalTracker::new(4);
        let mut t = 0.0;
        tracker.tick(ms(t));
        let mut completed = false;
        for step in [1.0, 3.0, 1.0, 3.0] {
            t += step;
            completed = tracker.tick(ms(t));
        }
        assert!(completed);

        let summary = tracker.summary();
        assert!((summary.mean_ms - 2.0).abs() < 1e-6);
        assert!((summary.min_ms - 1.0).abs() < 1e-6);
        assert!((summary.max_ms - 3.0).abs() < 1e-6);
        assert!((summary.std_dev_ms - 1.0).abs() < 1e-6);
        assert_eq!(summary.long_term_std_dev_ms, 0.0);
    }

    #[test]
    fn test_long_term_skips_first_window() {
        let mut tracker = IntervalTracker::new(2);
        let mut t = 0.0;
        tracker.tick(ms(t));
        for step in [10.0, 10.0, 2.0, 4.0, 2.0, 4.0] {
            t += step;
            tracker.tick(ms(t));
        }
        let summary = tracker.summary();
        assert_eq!(summary.windows, 3);
        assert!((summary.long_term_std_dev_ms - 1.0).abs() < 1e-6);
        assert!((summary.long_term_max_ms - 4.0).abs() < 1e-6);
    }
}
