//! Statistics collection
//!
//! Counters and timing are owned by each strategy and updated under its lock.
//! A session reads them through `stats(reset)` on its own timer.

pub mod snapshot;
pub mod tracker;

pub use snapshot::{ClassicDetail, JitterStats, RegulatorDetail, StrategyDetail};
pub use tracker::{IntervalSummary, IntervalTracker};

use std::time::Duration;

/// Degraded-condition counters, in packets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub underruns: u64,
    pub overflows: u64,
    pub lost: u64,
    pub out_of_order: u64,
    pub revived: u64,
    pub late: u64,
    pub skipped: u64,
    pub rejected: u64,
}

/// Push/pull timing plus counters for one strategy
#[derive(Debug, Clone)]
pub struct StatsTracker {
    pub push: IntervalTracker,
    pub pull: IntervalTracker,
    pub counters: Counters,
}

impl StatsTracker {
    /// `window` ticks per summary; one second's worth of periods is typical
    pub fn new(window: usize) -> Self {
        Self {
            push: IntervalTracker::new(window),
            pull: IntervalTracker::new(window),
            counters: Counters::default(),
        }
    }

    /// Window covering roughly one second of frame periods
    pub fn window_for(sample_rate: u32, frames_per_period: usize) -> usize {
        (sample_rate as usize / frames_per_period.max(1)).max(2)
    }

    pub fn tick_push(&mut self, now: Duration) -> bool {
        self.push.tick(now)
    }

    pub fn tick_pull(&mut self, now: Duration) -> bool {
        self.pull.tick(now)
    }

    /// Copy out the counters, zeroing them when `reset` is set
    pub fn take_counters(&mut self, reset: bool) -> Counters {
        let counters = self.counters;
        if reset {
            self.counters = Counters::default();
        }
        counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_counters_resets() {
        let mut stats = StatsTracker::new(16);
        stats.counters.underruns = 3;
        stats.counters.lost = 1;

        let first = stats.take_counters(false);
        assert_eq!(first.underruns, 3);
        assert_eq!(stats.counters.underruns, 3);

        let second = stats.take_counters(true);
        assert_eq!(second.lost, 1);
        assert_eq!(stats.counters, Counters::default());
    }

    #[test]
    fn test_window_for_period() {
        assert_eq!(StatsTracker::window_for(48000, 128), 375);
        assert_eq!(StatsTracker::window_for(48000, 100_000), 2);
    }
}
