//! Stats snapshot surfaced to the owning session

use serde::Serialize;

use super::tracker::IntervalSummary;

/// Read-and-optionally-reset snapshot of a jitter strategy
///
/// Counters are in packets (frame periods). `queue_level` and
/// `auto_queue_correction` are in frame periods as well.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JitterStats {
    pub underruns: u64,
    pub overflows: u64,
    pub lost_packets: u64,
    pub out_of_order_packets: u64,
    pub revived_packets: u64,
    pub late_packets: u64,
    pub skipped_packets: u64,
    pub rejected_packets: u64,
    pub queue_level: f64,
    pub auto_queue_correction: f64,
    pub detail: StrategyDetail,
}

/// Strategy-specific part of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyDetail {
    Regulator(RegulatorDetail),
    Classic(ClassicDetail),
}

/// Timing detail of the concealing regulator
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegulatorDetail {
    /// Current loss tolerance
    pub tolerance_ms: f64,
    /// Frame periods of history fed to the predictor
    pub history_depth: usize,
    /// Inter-arrival timing of pushes
    pub push_timing: IntervalSummary,
    /// Inter-call timing of pulls
    pub pull_timing: IntervalSummary,
}

/// Level-controller detail of the classic buffer, in frame periods
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassicDetail {
    pub skew: f64,
    pub skew_raw: f64,
    pub latency_target: f64,
    pub buf_dec_overflows: f64,
    pub buf_dec_pktloss: f64,
    pub buf_inc_underrun: f64,
    pub buf_inc_compensate: f64,
    /// In frames
    pub broadcast_skew: i64,
    /// In frames
    pub broadcast_delta: i64,
    pub autoq_rate: f64,
}

impl JitterStats {
    /// Fraction of packets reported lost against everything accounted for
    pub fn loss_rate(&self, received: u64) -> f64 {
        if received + self.lost_packets == 0 {
            0.0
        } else {
            self.lost_packets as f64 / (received + self.lost_packets) as f64
        }
    }
}
