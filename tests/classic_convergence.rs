//! Level controller behaviour of the classic buffer over long runs

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lan_audio_regulator::{
    codec::BitDepth,
    jitter::{ClassicConfig, ClassicJitterBuffer},
    AudioConfig, ManualClock,
};

const FPP: usize = 128;
const SAMPLE_RATE: u32 = 48000;
const PULLS_PER_SECOND: usize = SAMPLE_RATE as usize / FPP;

fn audio() -> AudioConfig {
    AudioConfig {
        sample_rate: SAMPLE_RATE,
        frames_per_period: FPP,
        channels: 2,
        bit_depth: BitDepth::Bit16,
    }
}

/// Arrival times in periods: packet k is sent at k and delayed by up to `jitter`
fn jittered_arrivals(count: usize, jitter: f64, seed: u64) -> Vec<(f64, u32)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut arrivals: Vec<(f64, u32)> = (0..count)
        .map(|k| (k as f64 + jitter * rng.random::<f64>(), k as u32))
        .collect();
    arrivals.sort_by(|a, b| a.0.total_cmp(&b.0));
    arrivals
}

/// Packet schedule replayed against a buffer, one pull per period
struct Schedule {
    arrivals: Vec<(f64, u32)>,
    next: usize,
    period: usize,
}

impl Schedule {
    fn new(arrivals: Vec<(f64, u32)>) -> Self {
        Self {
            arrivals,
            next: 0,
            period: 0,
        }
    }

    /// Interleave pushes and pulls; returns the latency target after every pull
    fn drive(&mut self, buffer: &ClassicJitterBuffer, pulls: usize) -> Vec<f64> {
        let layout = buffer.layout();
        let payload = layout.encode_interleaved(&vec![0.25; layout.frames() * layout.channels()]);
        let mut out = vec![0u8; layout.slot_bytes()];
        let mut targets = Vec::with_capacity(pulls);

        for _ in 0..pulls {
            let pull_at = self.period as f64 + 0.5;
            while self.next < self.arrivals.len() && self.arrivals[self.next].0 <= pull_at {
                buffer.push(&payload, self.arrivals[self.next].1, 0).unwrap();
                self.next += 1;
            }
            buffer.pull(&mut out).unwrap();
            targets.push(buffer.latency_target());
            self.period += 1;
        }
        targets
    }
}

fn changes(targets: &[f64]) -> usize {
    targets.windows(2).filter(|w| w[0] != w[1]).count()
}

#[test]
fn test_auto_queue_converges_under_jitter() {
    let jitter = 3.0;
    let pulls = 60 * PULLS_PER_SECOND;
    let buffer = ClassicJitterBuffer::new(
        &audio(),
        &ClassicConfig {
            auto_queue: true,
            ..Default::default()
        },
        Arc::new(ManualClock::new()),
    )
    .unwrap();

    let mut schedule = Schedule::new(jittered_arrivals(pulls + 16, jitter, 7));
    let targets = schedule.drive(&buffer, pulls);

    let last = targets[targets.len() - 1];
    assert!(
        (2.0..=jitter + 6.0).contains(&last),
        "latency target settled at {} slots",
        last
    );

    let tail = &targets[targets.len() - 30 * PULLS_PER_SECOND..];
    assert!(
        changes(tail) <= 4,
        "{} target changes in the last 30 s",
        changes(tail)
    );
}

#[test]
fn test_auto_queue_evaluates_on_schedule() {
    let buffer = ClassicJitterBuffer::new(
        &audio(),
        &ClassicConfig {
            auto_queue: true,
            ..Default::default()
        },
        Arc::new(ManualClock::new()),
    )
    .unwrap();

    let pulls = 3 * PULLS_PER_SECOND;
    let mut schedule = Schedule::new(jittered_arrivals(pulls + 16, 0.0, 1));
    let targets = schedule.drive(&buffer, pulls);

    // the first evaluation happens two seconds in; until then the target
    // stays at its starting point
    let before = 2 * PULLS_PER_SECOND - 2;
    assert!(targets[..before].iter().all(|t| *t == targets[0]));
}

#[test]
fn test_fixed_queue_is_stable_without_jitter() {
    let buffer = ClassicJitterBuffer::new(
        &audio(),
        &ClassicConfig {
            queue_length: 4,
            ..Default::default()
        },
        Arc::new(ManualClock::new()),
    )
    .unwrap();

    let mut schedule = Schedule::new(jittered_arrivals(20 * PULLS_PER_SECOND, 0.0, 3));
    schedule.drive(&buffer, PULLS_PER_SECOND);
    buffer.stats(true);

    let targets = schedule.drive(&buffer, 10 * PULLS_PER_SECOND);
    let stats = buffer.stats(false);
    assert_eq!(stats.underruns, 0);
    assert_eq!(stats.overflows, 0);
    assert_eq!(changes(&targets), 0);
    assert_eq!(buffer.latency_changes(), 0);
}
