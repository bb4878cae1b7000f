//! Classic level-controlled jitter buffer
//!
//! A byte ring with one write and one read position. Incoming slots are
//! appended in arrival order; there is no slot table and no concealment, an
//! empty read is zero-filled. A level controller watches how full the ring
//! runs and nudges the read position to hold latency near a target, which
//! is either fixed or learned by the auto-queue estimator.
//!
//! A second, independent broadcast cursor trails the read position by a
//! fixed latency and tracks its drift with a slow proportional correction,
//! stretching or shrinking slots by linear interpolation when allowed.
//!
//! Positions are absolute byte counts and only ever reduced modulo the ring
//! size when indexing. Every position stays a whole number of frames.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, Span};

use crate::clock::SharedClock;
use crate::codec::FrameLayout;
use crate::config::AudioConfig;
use crate::constants::WIRE_SEQUENCE_MODULUS;
use crate::error::{ConfigError, JitterError};
use crate::jitter::sequence::SequenceWindow;
use crate::stats::{ClassicDetail, Counters, JitterStats, StatsTracker, StrategyDetail};

/// Seconds of audio the ring holds
const RING_SECONDS: usize = 2;

/// Fixed queue length used when nothing else is configured, in slots
pub const DEFAULT_QUEUE_LENGTH: usize = 4;

/// Auto-queue starting latency, in slots
const AUTO_QUEUE_INITIAL_SLOTS: i64 = 3;

/// Fraction of the remaining drift applied per broadcast read
const BROADCAST_CORRECTION_GAIN: f64 = 0.0003;

/// Level correction preset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelCorrection {
    /// Wide tolerances, overflow drops half the target latency
    #[default]
    Default,
    /// Wide tolerances, overflow drops a single slot
    DropOne,
    /// Narrow tolerances around the target, single-slot steps
    Tight,
}

/// Classic buffer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassicConfig {
    /// Target latency in slots when the auto queue is off
    pub queue_length: usize,
    pub auto_queue: bool,
    /// Damping of the auto-queue estimator; shrinking runs this many times
    /// slower than growing
    pub auto_queue_factor: f64,
    pub correction: LevelCorrection,
    /// Broadcast tap latency in slots, 0 to disable
    pub broadcast_queue_length: usize,
    /// Stretch or shrink broadcast slots instead of skipping frames
    pub broadcast_interpolation: bool,
}

impl Default for ClassicConfig {
    fn default() -> Self {
        Self {
            queue_length: DEFAULT_QUEUE_LENGTH,
            auto_queue: false,
            auto_queue_factor: 500.0,
            correction: LevelCorrection::Default,
            broadcast_queue_length: 0,
            broadcast_interpolation: true,
        }
    }
}

impl ClassicConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.auto_queue && self.queue_length == 0 {
            return Err(ConfigError::Queue(
                "queue_length must be at least 1 slot without auto_queue".to_string(),
            ));
        }
        if !self.auto_queue_factor.is_finite() || self.auto_queue_factor < 1.0 {
            return Err(ConfigError::Queue(format!(
                "auto_queue_factor must be at least 1, got {}",
                self.auto_queue_factor
            )));
        }
        Ok(())
    }
}

/// Tolerances and rates fixed at construction, all in bytes
#[derive(Debug, Clone, Copy)]
struct Tuning {
    slot: i64,
    frame: i64,
    total: i64,
    pps: u64,
    underrun_inc_tolerance: f64,
    corr_inc_tolerance: f64,
    overflow_dec_tolerance: f64,
    overflow_drop_step: i64,
    level_down_rate: f64,
    min_level_threshold: f64,
    autoq_factor: f64,
    autoq_rate_min: f64,
    autoq_rate_decay: f64,
    broadcast_latency: i64,
    interpolate: bool,
}

struct ClassicState {
    ring: Vec<u8>,
    write_pos: i64,
    read_pos: i64,
    active: bool,
    max_latency: i64,
    level_cur: f64,
    level: f64,
    last_corr_counter: u32,
    last_corr_direction: i8,

    autoq_corr: f64,
    autoq_rate: f64,
    /// Pull counter driving auto-queue evaluation; `None` for a fixed queue
    autoq_counter: Option<u64>,
    latency_changes: u64,

    reads_new: i64,
    underruns_new: i64,
    underruns: i64,
    overflows: i64,
    skew0: f64,
    skew_raw: i64,
    buf_dec_overflow: i64,
    buf_dec_pktloss: i64,
    buf_inc_underrun: i64,
    buf_inc_compensate: i64,

    broadcast_pos: i64,
    broadcast_corr: f64,
    broadcast_skew: i64,
    broadcast_delta: i64,

    last_seq: Option<u32>,
    stats: StatsTracker,
}

/// Copy `data` into the ring at absolute position `pos`
fn write_ring(ring: &mut [u8], pos: i64, data: &[u8]) {
    let start = pos.rem_euclid(ring.len() as i64) as usize;
    let n = (ring.len() - start).min(data.len());
    ring[start..start + n].copy_from_slice(&data[..n]);
    if n < data.len() {
        ring[..data.len() - n].copy_from_slice(&data[n..]);
    }
}

fn read_ring(ring: &[u8], pos: i64, out: &mut [u8]) {
    let start = pos.rem_euclid(ring.len() as i64) as usize;
    let n = (ring.len() - start).min(out.len());
    out[..n].copy_from_slice(&ring[start..start + n]);
    if n < out.len() {
        let rest = out.len() - n;
        out[n..].copy_from_slice(&ring[..rest]);
    }
}

fn zero_ring(ring: &mut [u8], pos: i64, len: usize) {
    let start = pos.rem_euclid(ring.len() as i64) as usize;
    let n = (ring.len() - start).min(len);
    ring[start..start + n].fill(0);
    if n < len {
        ring[..len - n].fill(0);
    }
}

impl ClassicState {
    /// Correction weight, decaying once corrections stop for a while
    fn last_corr_factor(&self) -> f64 {
        500.0 / self.last_corr_counter.max(500) as f64
    }

    fn process_packet_loss(&mut self, t: &Tuning, lost: i64) {
        let mut lost = lost;
        self.skew_raw -= lost;

        let available = self.write_pos - self.read_pos;
        let shorten = (available + t.slot + lost - self.max_latency).min(lost);
        if shorten > 0 {
            lost -= shorten;
            self.buf_dec_pktloss += shorten;
            self.level_cur = self.max_latency as f64;
            self.last_corr_counter = 0;
            self.last_corr_direction = 1;
        } else if t.slot < available + lost
            && (t.overflow_dec_tolerance > self.max_latency as f64
                || (self.last_corr_direction > 0
                    && self.level_cur
                        > self.max_latency as f64
                            - t.overflow_dec_tolerance * (1.1 - self.last_corr_factor())))
        {
            let shorten = lost.min(t.slot);
            lost -= shorten;
            self.buf_dec_pktloss += shorten;
            self.level_cur -= shorten as f64;
            self.last_corr_counter = 0;
            self.last_corr_direction = 1;
        }

        if lost >= t.total {
            self.ring.fill(0);
            self.underruns += (lost - (-available).max(0)).max(0);
        } else if lost > 0 {
            zero_ring(&mut self.ring, self.write_pos, lost as usize);
            self.underruns += (lost - (-available).max(0)).max(0);
        }
        self.write_pos += lost;
    }

    fn insert(&mut self, t: &Tuning, payload: &[u8], lost: i64) {
        let len = t.slot;
        self.active = true;
        if self.max_latency < len + t.slot {
            self.max_latency = len + t.slot;
        }
        if lost > 0 {
            self.process_packet_loss(t, lost);
        }
        self.skew_raw += self.reads_new - len;
        self.reads_new = 0;
        self.underruns += self.underruns_new;
        self.underruns_new = 0;
        self.level = t.slot as f64 * (self.level_cur / t.slot as f64).ceil();

        let available = self.write_pos - self.read_pos;
        let max_latency = self.max_latency as f64;
        let corr = 2.0 * t.slot as f64 * self.last_corr_factor();

        let mut delta = 0i64;
        if available < -10 * self.max_latency {
            // reader is hopelessly ahead: snap back to the writer
            delta = available;
            self.buf_inc_underrun += -delta;
            self.level_cur = len as f64;
        } else if available + len > self.max_latency {
            delta = t.overflow_drop_step;
            self.overflows += delta;
            self.buf_dec_overflow += delta;
            self.level_cur = max_latency;
        } else if available < 0
            && self.level_cur
                < (len as f64 + t.min_level_threshold)
                    .max(max_latency - t.underrun_inc_tolerance - corr)
        {
            delta = -(-available).min(t.slot);
            self.buf_inc_underrun += -delta;
        } else if self.level_cur < max_latency - t.corr_inc_tolerance - 3.0 * corr {
            delta = -t.slot;
            self.underruns += -delta;
            self.buf_inc_compensate += -delta;
        }

        if delta != 0 {
            self.read_pos += delta;
            self.last_corr_counter = 0;
            self.last_corr_direction = if delta > 0 { 1 } else { -1 };
        } else {
            self.last_corr_counter = self.last_corr_counter.saturating_add(1);
        }

        write_ring(&mut self.ring, self.write_pos, payload);
        self.write_pos += len;
    }

    fn update_auto_queue(&mut self, t: &Tuning, available: i64) {
        let slot = t.slot as f64;
        if (available as f64) + self.autoq_corr - self.level_cur < 0.0 {
            self.autoq_corr += self.autoq_rate;
        } else if 2.0 * slot < self.autoq_corr {
            self.autoq_corr -= self.autoq_rate * t.autoq_factor;
        }
        if self.autoq_rate > t.autoq_rate_min {
            self.autoq_rate *= t.autoq_rate_decay;
        }

        let Some(counter) = self.autoq_counter.as_mut() else {
            return;
        };
        let evaluated = *counter;
        *counter += 1;
        if evaluated % (4 * t.pps) == 2 * t.pps {
            let k = 1.0 + 1e-5 / t.autoq_factor;
            let settling = 12 * t.pps > *counter;
            let max_latency = self.max_latency as f64;
            if settling || (self.autoq_corr * k - max_latency + slot / 2.0).abs() > 0.6 * slot {
                let target = t.slot * (self.autoq_corr * k / slot).ceil() as i64;
                if target != self.max_latency {
                    self.latency_changes += 1;
                }
                self.max_latency = target;
            }
        }
    }

    fn read(&mut self, t: &Tuning, out: &mut [u8]) {
        let len = t.slot;
        if !self.active {
            out.fill(0);
            return;
        }
        self.reads_new += len;
        let available = self.write_pos - self.read_pos;
        if (available as f64) < self.level_cur {
            self.level_cur = (available as f64).max(self.level_cur - t.level_down_rate);
        } else {
            self.level_cur = available as f64;
        }

        self.update_auto_queue(t, available);

        let read_len = available.clamp(0, len) as usize;
        read_ring(&self.ring, self.read_pos, &mut out[..read_len]);
        if read_len < out.len() {
            out[read_len..].fill(0);
            self.underruns_new += len - read_len as i64;
        }
        self.read_pos += len;
    }

    fn read_broadcast(&mut self, t: &Tuning, layout: &FrameLayout, out: &mut [u8]) -> bool {
        let mut len = t.slot;
        let latency = t.broadcast_latency;
        if latency + len > self.read_pos {
            out.fill(0);
            return false;
        }

        let d = self.read_pos - latency - self.broadcast_pos - len;
        if d.abs() > latency / 2 {
            self.broadcast_pos = self.read_pos - latency - len;
            self.broadcast_corr = 0.0;
            self.broadcast_skew += d / t.frame;
        } else {
            self.broadcast_corr += BROADCAST_CORRECTION_GAIN * d as f64;
            let delta = (self.broadcast_corr / t.frame as f64) as i64;
            if delta != 0 {
                self.broadcast_corr -= (delta * t.frame) as f64;
                if t.interpolate && self.write_pos - self.broadcast_pos > len {
                    len += delta * t.frame;
                } else {
                    self.broadcast_pos += delta * t.frame;
                }
                self.broadcast_skew += delta;
            }
        }
        self.broadcast_delta = d / t.frame;

        if len == t.slot {
            let available = self.write_pos - self.broadcast_pos;
            let read_len = available.clamp(0, len) as usize;
            read_ring(&self.ring, self.broadcast_pos, &mut out[..read_len]);
            out[read_len..].fill(0);
        } else {
            self.interpolate(t, layout, len, out);
        }
        self.broadcast_pos += len;
        true
    }

    /// Resample `len` bytes at the broadcast cursor into one slot
    fn interpolate(&self, t: &Tuning, layout: &FrameLayout, len: i64, out: &mut [u8]) {
        let codec = layout.codec();
        let width = codec.width();
        let ratio = len as f64 / t.slot as f64;
        for ch in 0..layout.channels() {
            let channel_offset = (ch * width) as i64;
            for j in 0..layout.frames() {
                let x = j as f64 * ratio;
                let j1 = x.floor();
                let a = (x - j1) as f32;
                let p1 = (self.broadcast_pos + j1 as i64 * t.frame + channel_offset).rem_euclid(t.total) as usize;
                let p2 = (p1 + t.frame as usize) % t.total as usize;
                let v1 = codec.decode(&self.ring[p1..p1 + width]);
                let v2 = codec.decode(&self.ring[p2..p2 + width]);
                let at = j * t.frame as usize + ch * width;
                codec.encode((1.0 - a) * v1 + a * v2, &mut out[at..at + width]);
            }
        }
    }

    fn reset_accumulators(&mut self) {
        self.underruns = 0;
        self.overflows = 0;
        self.skew0 = self.level;
        self.skew_raw = 0;
        self.buf_dec_overflow = 0;
        self.buf_dec_pktloss = 0;
        self.buf_inc_underrun = 0;
        self.buf_inc_compensate = 0;
        self.broadcast_skew = 0;
    }
}

/// Byte-ring jitter buffer with a level controller and broadcast tap
pub struct ClassicJitterBuffer {
    layout: FrameLayout,
    tuning: Tuning,
    wire: SequenceWindow,
    clock: SharedClock,
    span: Span,
    state: Mutex<ClassicState>,
}

impl ClassicJitterBuffer {
    pub fn new(
        audio: &AudioConfig,
        config: &ClassicConfig,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        audio.validate()?;
        config.validate()?;

        let layout = audio.layout();
        let slot = layout.slot_bytes() as i64;
        let frame = layout.frame_bytes() as i64;
        let total = (audio.sample_rate as usize * layout.frame_bytes() * RING_SECONDS) as i64;
        // the ring must hold at least a few slots even at tiny sample rates
        let total = total.max(slot * 16);
        let total = total - total % frame;

        let max_latency = if config.auto_queue {
            AUTO_QUEUE_INITIAL_SLOTS * slot
        } else {
            config.queue_length as i64 * slot
        };
        let fpp = audio.frames_per_period as f64;

        let mut tuning = Tuning {
            slot,
            frame,
            total,
            pps: (audio.sample_rate as u64 / audio.frames_per_period as u64).max(1),
            underrun_inc_tolerance: -10.0 * slot as f64,
            corr_inc_tolerance: 100.0 * max_latency as f64,
            overflow_dec_tolerance: 100.0 * max_latency as f64,
            overflow_drop_step: (max_latency / 2 / frame * frame).max(frame),
            level_down_rate: fpp.min(256.0) / (5.0 * audio.sample_rate as f64) * slot as f64,
            min_level_threshold: 1.9 * slot as f64,
            autoq_factor: 1.0 / config.auto_queue_factor,
            autoq_rate_min: slot as f64 * 0.0005,
            autoq_rate_decay: 1.0 - (fpp * 1.2e-6).min(0.0005),
            broadcast_latency: config.broadcast_queue_length as i64 * slot,
            interpolate: config.broadcast_interpolation,
        };
        match config.correction {
            LevelCorrection::Default => {}
            LevelCorrection::DropOne => tuning.overflow_drop_step = slot,
            LevelCorrection::Tight => {
                tuning.underrun_inc_tolerance = 1.1 * slot as f64;
                tuning.corr_inc_tolerance = 1.9 * slot as f64;
                tuning.overflow_dec_tolerance = 0.1 * slot as f64;
                tuning.overflow_drop_step = slot;
            }
        }

        let span = info_span!(
            "classic",
            frames = audio.frames_per_period,
            channels = audio.channels,
            bit_depth = %audio.bit_depth,
        );
        info!(
            parent: &span,
            queue_slots = max_latency / slot,
            auto_queue = config.auto_queue,
            correction = ?config.correction,
            broadcast_slots = config.broadcast_queue_length,
            ring_bytes = total,
            "Classic jitter buffer created"
        );

        let state = ClassicState {
            ring: vec![0u8; total as usize],
            write_pos: max_latency,
            read_pos: 0,
            active: false,
            max_latency,
            level_cur: max_latency as f64,
            level: max_latency as f64,
            last_corr_counter: 0,
            last_corr_direction: 0,
            autoq_corr: 2.0 * slot as f64,
            autoq_rate: 0.5 * slot as f64,
            autoq_counter: config.auto_queue.then_some(1),
            latency_changes: 0,
            reads_new: 0,
            underruns_new: 0,
            underruns: 0,
            overflows: 0,
            skew0: 0.0,
            skew_raw: 0,
            buf_dec_overflow: 0,
            buf_dec_pktloss: 0,
            buf_inc_underrun: 0,
            buf_inc_compensate: 0,
            broadcast_pos: 0,
            broadcast_corr: 0.0,
            broadcast_skew: 0,
            broadcast_delta: 0,
            last_seq: None,
            stats: StatsTracker::new(StatsTracker::window_for(
                audio.sample_rate,
                audio.frames_per_period,
            )),
        };

        Ok(Self {
            layout,
            tuning,
            wire: SequenceWindow::new(WIRE_SEQUENCE_MODULUS),
            clock,
            span,
            state: Mutex::new(state),
        })
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Current target latency, in slots
    pub fn latency_target(&self) -> f64 {
        self.state.lock().max_latency as f64 / self.tuning.slot as f64
    }

    /// Times the auto queue has moved the target latency
    pub fn latency_changes(&self) -> u64 {
        self.state.lock().latency_changes
    }

    /// Whether a broadcast tap was configured
    pub fn has_broadcast(&self) -> bool {
        self.tuning.broadcast_latency > 0
    }

    /// Append one packet
    ///
    /// Packets are written in arrival order; the sequence number only feeds
    /// the out-of-order counter. Declared loss is rounded down to whole
    /// frames and either shortens the queue or is zero-filled.
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
        let mut st = self.state.lock();
        st.stats.tick_push(now);

        let seq = self.wire.wrap(seq);
        let reordered = st
            .last_seq
            .is_some_and(|last| self.wire.distance(seq, last) < 0);
        if reordered {
            st.stats.counters.out_of_order += 1;
        } else {
            st.last_seq = Some(seq);
        }

        let frame = self.tuning.frame as usize;
        let lost = (declared_loss - declared_loss % frame) as i64;
        if declared_loss > 0 {
            st.stats.counters.lost += declared_loss.div_ceil(expected) as u64;
        }
        st.insert(&self.tuning, payload, lost);
        Ok(())
    }

    /// Read one slot at the main cursor, zero-filling what is not there
    pub fn pull(&self, out: &mut [u8]) -> Result<(), JitterError> {
        let expected = self.layout.slot_bytes();
        if out.len() != expected {
            return Err(JitterError::OutputLength {
                expected,
                actual: out.len(),
            });
        }
        let now = self.clock.now();
        let mut st = self.state.lock();
        st.stats.tick_pull(now);
        st.read(&self.tuning, out);
        Ok(())
    }

    /// Read one slot at the broadcast cursor
    ///
    /// Returns false, with `out` zeroed, when no tap is configured or the
    /// main cursor has not yet run far enough ahead.
    pub fn pull_broadcast(&self, out: &mut [u8]) -> Result<bool, JitterError> {
        let expected = self.layout.slot_bytes();
        if out.len() != expected {
            return Err(JitterError::OutputLength {
                expected,
                actual: out.len(),
            });
        }
        if !self.has_broadcast() {
            out.fill(0);
            return Ok(false);
        }
        let mut st = self.state.lock();
        Ok(st.read_broadcast(&self.tuning, &self.layout, out))
    }

    /// Snapshot the controller, then reset accumulators when `reset` is set
    pub fn stats(&self, reset: bool) -> JitterStats {
        let unit = self.tuning.slot as f64;
        let stats = {
            let mut st = self.state.lock();
            let counters: Counters = st.stats.take_counters(reset);
            let skew = st.skew0 - st.level + (st.buf_inc_underrun + st.buf_inc_compensate) as f64
                - (st.buf_dec_overflow + st.buf_dec_pktloss) as f64;
            let detail = ClassicDetail {
                skew: skew / unit,
                skew_raw: st.skew_raw as f64 / unit,
                latency_target: st.max_latency as f64 / unit,
                buf_dec_overflows: st.buf_dec_overflow as f64 / unit,
                buf_dec_pktloss: st.buf_dec_pktloss as f64 / unit,
                buf_inc_underrun: st.buf_inc_underrun as f64 / unit,
                buf_inc_compensate: st.buf_inc_compensate as f64 / unit,
                broadcast_skew: st.broadcast_skew,
                broadcast_delta: st.broadcast_delta,
                autoq_rate: st.autoq_rate / unit,
            };
            let stats = JitterStats {
                underruns: (st.underruns / self.tuning.slot) as u64,
                overflows: (st.overflows / self.tuning.slot) as u64,
                lost_packets: counters.lost,
                out_of_order_packets: counters.out_of_order,
                revived_packets: counters.revived,
                late_packets: counters.late,
                skipped_packets: counters.skipped,
                rejected_packets: counters.rejected,
                queue_level: st.level / unit,
                auto_queue_correction: st.autoq_corr / unit,
                detail: StrategyDetail::Classic(detail),
            };
            if reset {
                st.reset_accumulators();
            }
            stats
        };

        debug!(
            parent: &self.span,
            underruns = stats.underruns,
            overflows = stats.overflows,
            queue_level = stats.queue_level,
            "Classic buffer stats"
        );
        stats
    }
}
