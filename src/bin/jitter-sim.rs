//! Jitter Simulator
//!
//! Drives one jitter strategy with a synthetic sine stream sent through a
//! simulated network with random delay and loss, and prints a JSON stats
//! line every second.
//!
//! Usage: `jitter-sim [CONFIG] [--seconds N] [--jitter-ms MS] [--loss P] [--seed S]`

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use crossbeam_channel::{bounded, tick, Receiver, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_audio_regulator::{
    codec::FrameLayout, EngineConfig, JitterStrategy, MonotonicClock,
};

/// Simulated wire resolution
const WIRE_TICK: Duration = Duration::from_micros(250);

/// Packets in flight between the wire and the receiver thread
const WIRE_CAPACITY: usize = 1024;

const TONE_HZ: f32 = 440.0;

struct SimArgs {
    config: Option<String>,
    seconds: u64,
    jitter_ms: f64,
    loss: f64,
    seed: u64,
}

impl SimArgs {
    fn parse() -> Result<Self> {
        let mut args = SimArgs {
            config: None,
            seconds: 10,
            jitter_ms: 2.0,
            loss: 0.01,
            seed: 1,
        };
        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            let mut value = |name: &str| {
                it.next()
                    .with_context(|| format!("{} needs a value", name))
            };
            match arg.as_str() {
                "--seconds" => args.seconds = value("--seconds")?.parse()?,
                "--jitter-ms" => args.jitter_ms = value("--jitter-ms")?.parse()?,
                "--loss" => args.loss = value("--loss")?.parse()?,
                "--seed" => args.seed = value("--seed")?.parse()?,
                flag if flag.starts_with("--") => bail!("Unknown option {}", flag),
                path => args.config = Some(path.to_string()),
            }
        }
        if !(0.0..=1.0).contains(&args.loss) {
            bail!("--loss must be between 0 and 1, got {}", args.loss);
        }
        if args.jitter_ms < 0.0 {
            bail!("--jitter-ms must not be negative");
        }
        Ok(args)
    }
}

/// One packet on the simulated wire
struct WirePacket {
    seq: u32,
    payload: Bytes,
}

/// Sine tone cut into slots
struct ToneSource {
    layout: FrameLayout,
    sample_rate: f32,
    phase: u64,
    scratch: Vec<f32>,
}

impl ToneSource {
    fn new(layout: FrameLayout, sample_rate: u32) -> Self {
        Self {
            layout,
            sample_rate: sample_rate as f32,
            phase: 0,
            scratch: vec![0.0; layout.frames() * layout.channels()],
        }
    }

    fn next_slot(&mut self) -> Bytes {
        let channels = self.layout.channels();
        for (frame, chunk) in self.scratch.chunks_exact_mut(channels).enumerate() {
            let t = (self.phase + frame as u64) as f32 / self.sample_rate;
            chunk.fill(0.5 * (2.0 * PI * TONE_HZ * t).sin());
        }
        self.phase += self.layout.frames() as u64;
        Bytes::from(self.layout.encode_interleaved(&self.scratch))
    }
}

/// Emit one packet per period, holding each back by a random delay
fn run_wire(
    args: SimArgs,
    layout: FrameLayout,
    sample_rate: u32,
    period: Duration,
    wire_tx: Sender<WirePacket>,
    running: Arc<AtomicBool>,
) {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut source = ToneSource::new(layout, sample_rate);
    let mut in_flight: BinaryHeap<Reverse<(Instant, u32, Bytes)>> = BinaryHeap::new();
    let jitter = Duration::from_secs_f64(args.jitter_ms / 1000.0);

    let start = Instant::now();
    let mut seq = 0u32;
    let ticker = tick(WIRE_TICK);

    while running.load(Ordering::Relaxed) {
        if ticker.recv().is_err() {
            break;
        }
        let now = Instant::now();

        while start + period * seq <= now {
            let payload = source.next_slot();
            if rng.random::<f64>() >= args.loss {
                let due = start + period * seq + jitter.mul_f64(rng.random::<f64>());
                in_flight.push(Reverse((due, seq, payload)));
            }
            seq = seq.wrapping_add(1);
        }

        while in_flight.peek().is_some_and(|Reverse((due, _, _))| *due <= now) {
            let Some(Reverse((_, seq, payload))) = in_flight.pop() else {
                break;
            };
            if wire_tx.try_send(WirePacket { seq, payload }).is_err() {
                tracing::warn!(seq, "Wire full, dropping packet");
            }
        }
    }
}

/// Hand arriving packets to the strategy
fn run_receiver(strategy: Arc<JitterStrategy>, wire_rx: Receiver<WirePacket>) {
    for packet in wire_rx {
        if let Err(e) = strategy.push(&packet.payload, packet.seq, 0) {
            tracing::error!("Push failed: {}", e);
        }
    }
}

/// Pull once per period, like an audio callback
fn run_playback(
    strategy: Arc<JitterStrategy>,
    period: Duration,
    running: Arc<AtomicBool>,
    pulls: Arc<AtomicU64>,
) {
    let mut out = vec![0u8; strategy.slot_bytes()];
    let mut tap = vec![0u8; strategy.slot_bytes()];
    let ticker = tick(period);

    while running.load(Ordering::Relaxed) {
        if ticker.recv().is_err() {
            break;
        }
        if strategy.pull(&mut out).is_err() || strategy.pull_broadcast(&mut tap).is_err() {
            break;
        }
        pulls.fetch_add(1, Ordering::Relaxed);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = SimArgs::parse()?;
    let seconds = args.seconds;
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_or_default()?,
    };

    tracing::info!(
        strategy = config.jitter.strategy.name(),
        seconds = args.seconds,
        jitter_ms = args.jitter_ms,
        loss = args.loss,
        seed = args.seed,
        "Starting jitter simulation"
    );

    let strategy = Arc::new(JitterStrategy::from_config(&config, MonotonicClock::shared())?);
    let layout = strategy.layout();
    let period = config.audio.period();
    let running = Arc::new(AtomicBool::new(true));
    let pulls = Arc::new(AtomicU64::new(0));

    let (wire_tx, wire_rx) = bounded::<WirePacket>(WIRE_CAPACITY);

    let wire = {
        let running = running.clone();
        let sample_rate = config.audio.sample_rate;
        thread::Builder::new()
            .name("sim-wire".into())
            .spawn(move || run_wire(args, layout, sample_rate, period, wire_tx, running))?
    };
    let receiver = {
        let strategy = strategy.clone();
        thread::Builder::new()
            .name("sim-receiver".into())
            .spawn(move || run_receiver(strategy, wire_rx))?
    };
    let playback = {
        let strategy = strategy.clone();
        let running = running.clone();
        let pulls = pulls.clone();
        thread::Builder::new()
            .name("sim-playback".into())
            .spawn(move || run_playback(strategy, period, running, pulls))?
    };

    let seconds = report_stats(seconds, &running, &strategy, &pulls).await?;

    running.store(false, Ordering::Relaxed);
    for (name, handle) in [("wire", wire), ("receiver", receiver), ("playback", playback)] {
        if handle.join().is_err() {
            tracing::error!("{} thread panicked", name);
        }
    }

    let total = strategy.stats(false);
    tracing::info!(
        seconds,
        pulls = pulls.load(Ordering::Relaxed),
        underruns = total.underruns,
        lost = total.lost_packets,
        "Simulation finished"
    );
    Ok(())
}

/// Print a stats line every second until the run length elapses
async fn report_stats(
    seconds: u64,
    running: &AtomicBool,
    strategy: &JitterStrategy,
    pulls: &AtomicU64,
) -> Result<u64> {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.tick().await;
    for elapsed in 1..=seconds {
        interval.tick().await;
        if !running.load(Ordering::Relaxed) {
            return Ok(elapsed);
        }
        let stats = strategy.stats(true);
        let line = serde_json::json!({
            "second": elapsed,
            "pulls": pulls.load(Ordering::Relaxed),
            "stats": stats,
        });
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(seconds)
}
