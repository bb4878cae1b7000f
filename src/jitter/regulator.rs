//! Concealing jitter regulator
//!
//! Packets land in a [`SlotStore`] keyed by sequence number while a parallel
//! timing table records when each arrived and whether it has been given up
//! as lost. Every pull picks the slot to play, skipping forward past late or
//! stale packets, and hands gaps to the [`Concealer`].
//!
//! Loss detection is time based. A missing sequence number is declared lost
//! once it is overdue by more than the tolerance, its due time extrapolated
//! from the nearest older packet that did arrive. A packet that shows up
//! after being declared lost is revived.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, Span};

use crate::clock::SharedClock;
use crate::codec::FrameLayout;
use crate::config::AudioConfig;
use crate::constants::{DEFAULT_LOOKBACK_WINDOW, DEFAULT_POOL_SIZE, DEFAULT_TOLERANCE_MS};
use crate::error::{ConfigError, JitterError};
use crate::jitter::sequence::SequenceWindow;
use crate::jitter::slots::SlotStore;
use crate::plc::{ConcealmentProfile, Concealer, MIN_HISTORY_DEPTH};
use crate::stats::{JitterStats, RegulatorDetail, StatsTracker, StrategyDetail};

/// Arrival history needed before the tolerance follows measured jitter
pub const AUTO_TOLERANCE_WARMUP: Duration = Duration::from_secs(2);

/// Margin added on top of measured jitter by the automatic tolerance
const AUTO_TOLERANCE_HEADROOM_MS: f64 = 2.0;

/// Regulator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegulatorConfig {
    /// Slots in the pool (power of 2); sequence numbers wrap at twice this
    pub pool_size: usize,
    /// Sequence numbers scanned behind the newest arrival
    pub lookback_window: usize,
    /// How overdue a packet may be before it is declared lost
    pub tolerance_ms: f64,
    /// Follow measured arrival jitter instead of the fixed tolerance
    pub auto_tolerance: bool,
    pub profile: ConcealmentProfile,
    /// Frame periods of predictor history, overriding the profile
    pub history_depth: Option<usize>,
}

impl Default for RegulatorConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            lookback_window: DEFAULT_LOOKBACK_WINDOW,
            tolerance_ms: DEFAULT_TOLERANCE_MS,
            auto_tolerance: false,
            profile: ConcealmentProfile::Standard,
            history_depth: None,
        }
    }
}

impl RegulatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.pool_size.is_power_of_two() || self.pool_size < 2 || self.pool_size > 1 << 30 {
            return Err(ConfigError::PoolSizeNotPowerOfTwo(self.pool_size));
        }
        if self.lookback_window == 0 || self.lookback_window >= self.pool_size {
            return Err(ConfigError::LookbackWindow {
                window: self.lookback_window,
                max: self.pool_size - 1,
            });
        }
        if !self.tolerance_ms.is_finite() || self.tolerance_ms < 0.0 {
            return Err(ConfigError::Tolerance(format!(
                "tolerance_ms must be a non-negative number, got {}",
                self.tolerance_ms
            )));
        }
        if let Some(depth) = self.history_depth {
            if depth < MIN_HISTORY_DEPTH {
                return Err(ConfigError::HistoryDepth(depth));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Arrival {
    at: Option<Duration>,
    lost: bool,
}

/// What a pull finds at one sequence number
enum SlotStatus {
    Playable,
    Stale,
    Missing,
}

struct RegulatorState {
    slots: SlotStore,
    timing: Vec<Arrival>,
    /// Newest sequence number received
    last_in: Option<u32>,
    /// Last sequence number emitted (or concealed)
    last_out: u32,
    /// How far the newest sequence number has moved since the first packet
    advanced: u64,
    tolerance: Duration,
    concealer: Concealer,
    stats: StatsTracker,
}

/// Slot-table jitter regulator with Burg concealment
pub struct Regulator {
    layout: FrameLayout,
    window: SequenceWindow,
    lookback: u32,
    packet_duration: Duration,
    auto_tolerance: bool,
    history_depth: usize,
    clock: SharedClock,
    span: Span,
    state: Mutex<RegulatorState>,
}

impl Regulator {
    /// Build a regulator; every buffer it will ever use is allocated here
    pub fn new(
        audio: &AudioConfig,
        config: &RegulatorConfig,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        audio.validate()?;
        config.validate()?;

        let layout = audio.layout();
        let packet_duration = audio.period();
        let tolerance = Duration::from_secs_f64(config.tolerance_ms / 1000.0).max(packet_duration);
        let history_depth = config
            .profile
            .history_depth(audio.frames_per_period, config.history_depth);
        if history_depth < MIN_HISTORY_DEPTH {
            return Err(ConfigError::HistoryDepth(history_depth));
        }

        let modulus = (config.pool_size * 2) as u32;
        let span = info_span!(
            "regulator",
            frames = audio.frames_per_period,
            channels = audio.channels,
            bit_depth = %audio.bit_depth,
        );

        info!(
            parent: &span,
            pool_size = config.pool_size,
            lookback = config.lookback_window,
            tolerance_ms = tolerance.as_secs_f64() * 1000.0,
            auto_tolerance = config.auto_tolerance,
            profile = ?config.profile,
            history_depth,
            "Regulator created"
        );

        let state = RegulatorState {
            slots: SlotStore::new(config.pool_size, layout.slot_bytes()),
            timing: vec![Arrival::default(); modulus as usize],
            last_in: None,
            last_out: 0,
            advanced: 0,
            tolerance,
            concealer: Concealer::new(layout, config.profile, history_depth),
            stats: StatsTracker::new(StatsTracker::window_for(
                audio.sample_rate,
                audio.frames_per_period,
            )),
        };

        Ok(Self {
            layout,
            window: SequenceWindow::new(modulus),
            lookback: config.lookback_window as u32,
            packet_duration,
            auto_tolerance: config.auto_tolerance,
            history_depth,
            clock,
            span,
            state: Mutex::new(state),
        })
    }

    /// Replace the span stats and lifecycle events are logged under
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Sequence space the regulator wraps incoming numbers into
    pub fn sequence_window(&self) -> SequenceWindow {
        self.window
    }

    /// Current loss tolerance
    pub fn tolerance(&self) -> Duration {
        self.state.lock().tolerance
    }

    /// Accept one packet from the network thread
    ///
    /// `declared_loss` is the number of bytes the transport knows were lost
    /// immediately before this packet.
    pub fn push(&self, payload: &[u8], seq: u32, declared_loss: usize) -> Result<(), JitterError> {
        let expected = self.layout.slot_bytes();
        if payload.len() != expected {
            self.state.lock().stats.counters.rejected += 1;
            return Err(JitterError::PayloadLength {
                expected,
                actual: payload.len(),
            });
        }

        let now = self.clock.now();
        let mut guard = self.state.lock();
        let st = &mut *guard;
        let seq = self.window.wrap(seq);

        let advanced = match st.last_in {
            None => {
                st.last_out = self.window.back(seq, 1);
                Some(0)
            }
            Some(last_in) => {
                let d = self.window.distance(seq, last_in);
                if d < 0 {
                    st.stats.counters.out_of_order += 1;
                }
                let behind = self.window.distance(seq, st.last_out);
                if behind <= 0 && behind >= -(self.lookback as i32) {
                    st.stats.counters.late += 1;
                }
                if d < -(self.lookback as i32) {
                    // its window entry is already retired; storing it would
                    // alias a sequence number one wrap later
                    st.stats.tick_push(now);
                    return Ok(());
                }
                (d > 0).then_some(d as u32)
            }
        };

        let arrival = &mut st.timing[seq as usize];
        if arrival.lost {
            st.stats.counters.revived += 1;
        }
        *arrival = Arrival {
            at: Some(now),
            lost: false,
        };
        st.slots.store(seq, payload);

        if let Some(advanced) = advanced {
            self.retire(st, seq, advanced);
            st.last_in = Some(seq);
            st.advanced = (st.advanced + advanced as u64).min(self.window.modulus() as u64);
            self.mark_declared_loss(st, seq, declared_loss);
            self.detect_losses(st, seq, now);
        }

        st.stats.tick_push(now);
        if self.auto_tolerance && now >= AUTO_TOLERANCE_WARMUP {
            let timing = st.stats.push.summary();
            let ms = timing.long_term_std_dev_ms + timing.long_term_max_ms + AUTO_TOLERANCE_HEADROOM_MS;
            st.tolerance = Duration::from_secs_f64(ms / 1000.0).max(self.packet_duration);
        }

        Ok(())
    }

    /// Forget sequence numbers that just left the lookback window
    ///
    /// Both the timing entry and the slot are cleared, so nothing from this
    /// pass through the sequence space survives into the next one.
    fn retire(&self, st: &mut RegulatorState, seq: u32, advanced: u32) {
        for k in 0..advanced {
            let stale = self.window.back(seq, self.lookback + 1 + k);
            st.timing[stale as usize] = Arrival::default();
            st.slots.invalidate(stale);
        }
    }

    fn mark_lost(st: &mut RegulatorState, seq: u32) {
        let arrival = &mut st.timing[seq as usize];
        if !arrival.lost && !st.slots.contains(seq) {
            arrival.lost = true;
            st.stats.counters.lost += 1;
        }
    }

    fn mark_declared_loss(&self, st: &mut RegulatorState, seq: u32, declared_loss: usize) {
        let packets = (declared_loss / self.layout.slot_bytes()) as u64;
        let span = packets.min(self.lookback as u64).min(st.advanced) as u32;
        for i in 1..=span {
            Self::mark_lost(st, self.window.back(seq, i));
        }
    }

    /// Scan the lookback window behind `newest` for overdue packets
    fn detect_losses(&self, st: &mut RegulatorState, newest: u32, now: Duration) {
        let span = (self.lookback as u64).min(st.advanced) as u32;
        let mut reference: Option<(u32, Duration)> = None;

        for i in (1..=span).rev() {
            let seq = self.window.back(newest, i);
            let arrival = st.timing[seq as usize];
            if st.slots.contains(seq) {
                if let Some(at) = arrival.at {
                    reference = Some((i, at));
                }
                continue;
            }
            if arrival.lost {
                continue;
            }

            let due = match reference {
                Some((older, at)) => at + self.packet_duration * (older - i),
                None => now.saturating_sub(self.packet_duration * i),
            };
            if now.saturating_sub(due) > st.tolerance {
                Self::mark_lost(st, seq);
            }
        }
    }

    fn slot_status(&self, st: &RegulatorState, seq: u32, now: Duration) -> SlotStatus {
        let arrival = st.timing[seq as usize];
        if arrival.lost || !st.slots.contains(seq) {
            return SlotStatus::Missing;
        }
        match arrival.at {
            Some(at) if at > now => SlotStatus::Missing,
            Some(at) if now - at <= st.tolerance => SlotStatus::Playable,
            Some(_) => SlotStatus::Stale,
            None => SlotStatus::Missing,
        }
    }

    /// Fill `out` with the next frame period, from the audio thread
    pub fn pull(&self, out: &mut [u8]) -> Result<(), JitterError> {
        let expected = self.layout.slot_bytes();
        if out.len() != expected {
            return Err(JitterError::OutputLength {
                expected,
                actual: out.len(),
            });
        }

        let now = self.clock.now();
        let mut guard = self.state.lock();
        let st = &mut *guard;
        st.stats.tick_pull(now);

        let Some(newest) = st.last_in else {
            out.fill(0);
            return Ok(());
        };

        let lookback = self.lookback as i32;
        let mut target = self.window.advance(st.last_out, 1);
        let mut discontinuous = false;

        let d = self.window.distance(newest, target);
        if d > lookback || d < -lookback {
            st.stats.counters.skipped += d.unsigned_abs() as u64;
            target = newest;
            discontinuous = true;
        }

        let d = self.window.distance(newest, target);
        if d < 0 {
            // nothing newer has arrived yet: cover the gap and wait for it
            st.concealer.conceal(out);
            st.stats.counters.underruns += 1;
            return Ok(());
        }

        if st.timing[target as usize].lost {
            st.last_out = target;
            st.concealer.conceal(out);
            st.stats.counters.underruns += 1;
            return Ok(());
        }

        let mut cursor = target;
        let mut chosen = None;
        for k in 0..=d as u32 {
            let seq = self.window.advance(target, k);
            cursor = seq;
            match self.slot_status(st, seq, now) {
                SlotStatus::Playable => {
                    chosen = Some(seq);
                    break;
                }
                SlotStatus::Stale => {
                    st.stats.counters.overflows += 1;
                }
                SlotStatus::Missing => {}
            }
        }

        match chosen {
            Some(seq) => {
                let skipped = self.window.distance(seq, target) as u64;
                st.stats.counters.skipped += skipped;
                st.last_out = seq;
                if let Some(slot) = st.slots.fetch(seq) {
                    st.concealer.accept(slot, out, discontinuous || skipped > 0);
                }
            }
            None => {
                st.last_out = cursor;
                st.concealer.conceal(out);
                st.stats.counters.underruns += 1;
            }
        }

        Ok(())
    }

    /// Snapshot counters and timing, zeroing counters when `reset` is set
    pub fn stats(&self, reset: bool) -> JitterStats {
        let (counters, detail, queue_level, tolerance) = {
            let mut st = self.state.lock();
            let counters = st.stats.take_counters(reset);
            let queue_level = st
                .last_in
                .map(|newest| self.window.distance(newest, st.last_out).max(0) as f64)
                .unwrap_or(0.0);
            let detail = RegulatorDetail {
                tolerance_ms: st.tolerance.as_secs_f64() * 1000.0,
                history_depth: self.history_depth,
                push_timing: st.stats.push.summary(),
                pull_timing: st.stats.pull.summary(),
            };
            (counters, detail, queue_level, st.tolerance)
        };

        debug!(
            parent: &self.span,
            underruns = counters.underruns,
            lost = counters.lost,
            revived = counters.revived,
            skipped = counters.skipped,
            queue_level,
            "Regulator stats"
        );

        JitterStats {
            underruns: counters.underruns,
            overflows: counters.overflows,
            lost_packets: counters.lost,
            out_of_order_packets: counters.out_of_order,
            revived_packets: counters.revived,
            late_packets: counters.late,
            skipped_packets: counters.skipped,
            rejected_packets: counters.rejected,
            queue_level,
            auto_queue_correction: tolerance.as_secs_f64() / self.packet_duration.as_secs_f64(),
            detail: StrategyDetail::Regulator(detail),
        }
    }

    /// Drop all buffered packets and history, as if newly constructed
    pub fn reset(&self) {
        let mut st = self.state.lock();
        st.slots.clear();
        st.timing.iter_mut().for_each(|a| *a = Arrival::default());
        st.last_in = None;
        st.last_out = 0;
        st.advanced = 0;
        st.concealer.reset();
        info!(parent: &self.span, "Regulator reset");
    }
}
