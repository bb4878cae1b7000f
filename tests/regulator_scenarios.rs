//! End-to-end regulator behaviour under scripted packet streams
//!
//! Time is driven by a `ManualClock`: each period the clock advances by one
//! packet duration, the period's packet (if any) is pushed, then one pull.

use std::f32::consts::PI;
use std::sync::Arc;

use lan_audio_regulator::{
    codec::{BitDepth, FrameLayout},
    jitter::{Regulator, RegulatorConfig},
    AudioConfig, ManualClock,
};

fn audio(depth: BitDepth) -> AudioConfig {
    AudioConfig {
        sample_rate: 48000,
        frames_per_period: 128,
        channels: 2,
        bit_depth: depth,
    }
}

/// Constant payload, unlike anything the tone produces
fn marker_packet(layout: FrameLayout) -> Vec<u8> {
    layout.encode_interleaved(&vec![0.9; layout.frames() * layout.channels()])
}

fn scenario_config() -> RegulatorConfig {
    RegulatorConfig {
        lookback_window: 16,
        tolerance_ms: 10.0,
        ..Default::default()
    }
}

/// 440 Hz at half scale, same on every channel, continuous across packets
fn tone_packet(layout: FrameLayout, index: usize) -> Vec<u8> {
    let frames = layout.frames();
    let samples: Vec<f32> = (0..frames * layout.channels())
        .map(|i| {
            let n = index * frames + i / layout.channels();
            0.5 * (2.0 * PI * 440.0 * n as f32 / 48000.0).sin()
        })
        .collect();
    layout.encode_interleaved(&samples)
}

struct Harness {
    regulator: Regulator,
    clock: Arc<ManualClock>,
    audio: AudioConfig,
}

impl Harness {
    fn new(audio: AudioConfig, config: RegulatorConfig) -> Self {
        let clock = Arc::new(ManualClock::new());
        let regulator = Regulator::new(&audio, &config, clock.clone()).unwrap();
        Self {
            regulator,
            clock,
            audio,
        }
    }

    fn layout(&self) -> FrameLayout {
        self.regulator.layout()
    }

    /// Run one period: advance time, push what arrives, pull one slot
    fn period(&self, arrivals: &[(u32, &Vec<u8>)]) -> Vec<u8> {
        self.clock.advance(self.audio.period());
        for (seq, payload) in arrivals {
            self.regulator.push(payload, *seq, 0).unwrap();
        }
        let mut out = vec![0u8; self.layout().slot_bytes()];
        self.regulator.pull(&mut out).unwrap();
        out
    }
}

#[test]
fn test_clean_stream_has_no_loss() {
    let h = Harness::new(audio(BitDepth::Bit16), scenario_config());
    let layout = h.layout();

    for k in 0..100usize {
        let packet = tone_packet(layout, k);
        let out = h.period(&[(k as u32, &packet)]);
        assert_eq!(out, packet, "period {} altered", k);
    }

    let stats = h.regulator.stats(false);
    assert_eq!(stats.lost_packets, 0);
    assert_eq!(stats.underruns, 0);
    assert_eq!(stats.revived_packets, 0);
}

#[test]
fn test_single_drop_is_concealed_once() {
    let h = Harness::new(audio(BitDepth::Bit16), scenario_config());
    let layout = h.layout();
    let mut emitted = Vec::new();

    for k in 0..100usize {
        let packet = tone_packet(layout, k);
        let out = if k == 50 {
            h.period(&[])
        } else {
            h.period(&[(k as u32, &packet)])
        };
        emitted.push(layout.decode_interleaved(&out));
    }

    let stats = h.regulator.stats(false);
    assert_eq!(stats.underruns, 1);
    assert_eq!(stats.lost_packets, 1);

    // the concealed period is not silence
    assert!(emitted[50].iter().any(|s| s.abs() > 0.05));

    // no clicks across the gap: left channel only
    let left: Vec<f32> = emitted[48..53]
        .iter()
        .flat_map(|period| period.iter().step_by(2).copied())
        .collect();
    let max_step = left
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .fold(0.0f32, f32::max);
    assert!(max_step <= 0.1, "step of {} around the gap", max_step);

    // well away from the gap the stream is bit-exact again
    assert_eq!(
        emitted[60],
        layout.decode_interleaved(&tone_packet(layout, 60))
    );
}

#[test]
fn test_lossless_at_every_bit_depth() {
    for depth in BitDepth::ALL {
        let h = Harness::new(audio(depth), scenario_config());
        let layout = h.layout();
        for k in 0..20usize {
            let packet = tone_packet(layout, k);
            let out = h.period(&[(k as u32, &packet)]);
            assert_eq!(out, packet, "{} bit period {}", depth, k);
        }
        assert_eq!(h.regulator.stats(false).underruns, 0);
    }
}

#[test]
fn test_wraparound_does_not_change_output() {
    let run = |offset: u32| {
        let h = Harness::new(audio(BitDepth::Bit16), scenario_config());
        let layout = h.layout();
        let mut outputs = Vec::new();
        // enough packets to wrap the 256-entry sequence space twice, with a
        // swap at 120/121 and a drop at 300
        for k in 0..600usize {
            let seq = |i: usize| offset.wrapping_add(i as u32);
            let out = match k {
                120 => h.period(&[]),
                121 => {
                    let late = tone_packet(layout, 120);
                    let now = tone_packet(layout, 121);
                    h.period(&[(seq(121), &now), (seq(120), &late)])
                }
                300 => h.period(&[]),
                _ => {
                    let packet = tone_packet(layout, k);
                    h.period(&[(seq(k), &packet)])
                }
            };
            outputs.push(out);
        }
        (outputs, h.regulator.stats(false))
    };

    let (base, base_stats) = run(0);
    let (shifted, shifted_stats) = run(u32::MAX - 40);
    assert_eq!(base, shifted);
    assert_eq!(base_stats, shifted_stats);
    assert_eq!(base_stats.out_of_order_packets, 1);
}

#[test]
fn test_duplicate_push_is_idempotent() {
    let single = Harness::new(audio(BitDepth::Bit16), scenario_config());
    let double = Harness::new(audio(BitDepth::Bit16), scenario_config());
    let layout = single.layout();

    for k in 0..40usize {
        let packet = tone_packet(layout, k);
        let a = single.period(&[(k as u32, &packet)]);
        let b = double.period(&[(k as u32, &packet), (k as u32, &packet)]);
        assert_eq!(a, b);
    }

    let a = single.regulator.stats(false);
    let b = double.regulator.stats(false);
    assert_eq!(a.lost_packets, b.lost_packets);
    assert_eq!(a.underruns, b.underruns);
    assert_eq!(b.out_of_order_packets, 0);
}

#[test]
fn test_declared_loss_bounded_by_lookback() {
    let config = RegulatorConfig {
        tolerance_ms: 1000.0,
        ..scenario_config()
    };
    let h = Harness::new(audio(BitDepth::Bit16), config);
    let layout = h.layout();
    let packet = tone_packet(layout, 0);

    for k in 0..5u32 {
        h.clock.advance(h.audio.period());
        h.regulator.push(&packet, k, 0).unwrap();
    }
    // 35 packets declared lost, only the 16 inside the lookback window count
    h.regulator
        .push(&packet, 40, 35 * layout.slot_bytes())
        .unwrap();
    assert_eq!(h.regulator.stats(false).lost_packets, 16);
}

#[test]
fn test_loss_detection_stops_at_window_edge() {
    let config = RegulatorConfig {
        tolerance_ms: 1000.0,
        ..scenario_config()
    };
    let h = Harness::new(audio(BitDepth::Bit16), config);
    let layout = h.layout();
    let packet = tone_packet(layout, 0);

    // 13 never arrives
    for k in (0..15u32).filter(|k| *k != 13) {
        h.clock.advance(h.audio.period());
        h.regulator.push(&packet, k, 0).unwrap();
    }
    assert_eq!(h.regulator.stats(false).lost_packets, 0);

    h.clock.advance(std::time::Duration::from_secs(5));
    // 15..=29 are long overdue; 13 is too, but it sits just outside the 16
    // sequence numbers behind 30 and is never examined
    h.regulator.push(&packet, 30, 0).unwrap();
    assert_eq!(h.regulator.stats(false).lost_packets, 15);
}

#[test]
fn test_far_jump_resyncs_to_newest() {
    let h = Harness::new(audio(BitDepth::Bit16), scenario_config());
    let layout = h.layout();

    for k in 0..6usize {
        let packet = tone_packet(layout, k);
        h.period(&[(k as u32, &packet)]);
    }
    let jumped = tone_packet(layout, 100);
    h.period(&[(100, &jumped)]);

    let stats = h.regulator.stats(false);
    assert!(stats.skipped_packets >= 90, "skipped {}", stats.skipped_packets);
    assert_eq!(stats.queue_level, 0.0);

    // back to bit-exact once the crossfade has passed
    let next = tone_packet(layout, 101);
    assert_eq!(h.period(&[(101, &next)]), next);
}

#[test]
fn test_late_packet_after_playout_is_counted() {
    let h = Harness::new(audio(BitDepth::Bit16), scenario_config());
    let layout = h.layout();

    for k in 0..10usize {
        if k == 5 {
            h.period(&[]);
            continue;
        }
        let packet = tone_packet(layout, k);
        h.period(&[(k as u32, &packet)]);
    }
    // 5 was skipped over at period 6, arriving now is too late to play
    h.regulator.push(&tone_packet(layout, 5), 5, 0).unwrap();
    let stats = h.regulator.stats(false);
    assert_eq!(stats.late_packets, 1);
    assert_eq!(stats.out_of_order_packets, 1);
}

#[test]
fn test_drops_one_pool_apart_are_both_lost() {
    // default pool of 128, so 138 and 266 share a slot and 266 wraps onto 10
    let h = Harness::new(audio(BitDepth::Bit16), scenario_config());
    let layout = h.layout();

    for k in 0..400usize {
        if k == 138 || k == 266 {
            h.period(&[]);
            continue;
        }
        let packet = tone_packet(layout, k);
        h.period(&[(k as u32, &packet)]);
    }

    let stats = h.regulator.stats(false);
    assert_eq!(stats.lost_packets, 2);
    assert_eq!(stats.underruns, 2);
    assert_eq!(stats.overflows, 0);
    assert_eq!(stats.skipped_packets, 2);
}

#[test]
fn test_old_payload_never_replayed_after_wrap() {
    let config = RegulatorConfig {
        tolerance_ms: 1000.0,
        ..scenario_config()
    };
    let h = Harness::new(audio(BitDepth::Bit16), config);
    let layout = h.layout();
    let marker = marker_packet(layout);

    for k in 0..300usize {
        let out = match k {
            10 => h.period(&[(10, &marker)]),
            138 | 266 => h.period(&[]),
            _ => {
                let packet = tone_packet(layout, k);
                h.period(&[(k as u32, &packet)])
            }
        };
        if k != 10 {
            assert_ne!(out, marker, "period {} replayed packet 10", k);
        }
    }
}

#[test]
fn test_lost_packet_arriving_after_window_stays_lost() {
    let h = Harness::new(audio(BitDepth::Bit16), scenario_config());
    let layout = h.layout();
    let marker = marker_packet(layout);

    for k in 0..46usize {
        if k == 20 {
            h.period(&[]);
            continue;
        }
        let packet = tone_packet(layout, k);
        h.period(&[(k as u32, &packet)]);
    }
    assert_eq!(h.regulator.stats(false).lost_packets, 1);

    // 25 newer packets have arrived since 20 went missing
    let mut outputs = vec![h.period(&[(20, &marker)])];
    for k in 47..60usize {
        let packet = tone_packet(layout, k);
        outputs.push(h.period(&[(k as u32, &packet)]));
    }

    let stats = h.regulator.stats(false);
    assert_eq!(stats.revived_packets, 0);
    assert_eq!(stats.lost_packets, 1);
    assert!(outputs.iter().all(|out| *out != marker));
}
