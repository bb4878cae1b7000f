//! # LAN Audio Regulator
//!
//! Receive-side jitter buffering and packet loss concealment for low-latency
//! uncompressed audio over LAN.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                          NETWORK THREAD                                   │
//! │        push(payload, seq, declared_loss)   (one slot per packet)          │
//! └────────────────────────────────┬─────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                    JitterStrategy (jitter::strategy)                      │
//! │                                                                           │
//! │  ┌─────────────────────────────────┐   ┌──────────────────────────────┐   │
//! │  │ Regulator (jitter::regulator)   │   │ ClassicJitterBuffer          │   │
//! │  │  ┌───────────┐  ┌────────────┐  │   │ (jitter::classic)            │   │
//! │  │  │ SlotStore │  │ Timing /   │  │   │  ┌────────────────────────┐  │   │
//! │  │  │           │  │ loss flags │  │   │  │ Byte ring + level ctrl │  │   │
//! │  │  └─────┬─────┘  └─────┬──────┘  │   │  └───────────┬────────────┘  │   │
//! │  │        └──────┬───────┘         │   │              │               │   │
//! │  │               ▼                 │   │              ▼               │   │
//! │  │  ┌──────────────────────────┐   │   │  ┌────────────────────────┐  │   │
//! │  │  │ Concealer (plc)          │   │   │  │ Broadcast cursor       │  │   │
//! │  │  │ Burg predictor+crossfade │   │   │  │ drift + interpolation  │  │   │
//! │  │  └──────────────────────────┘   │   │  └────────────────────────┘  │   │
//! │  └─────────────────────────────────┘   └──────────────────────────────┘   │
//! │                                                                           │
//! │        StatsTracker (stats)  ·  SampleCodec (codec)  ·  Clock             │
//! └────────────────────────────────┬─────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                        AUDIO CALLBACK THREAD                              │
//! │             pull(out)  once per frame period, never allocates             │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod jitter;
pub mod plc;
pub mod stats;

pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use config::{AudioConfig, EngineConfig, JitterConfig};
pub use error::{ConfigError, Error, JitterError, Result};
pub use jitter::{JitterStrategy, StrategyKind};
pub use stats::JitterStats;

/// Application-wide constants
pub mod constants {
    /// Default sample rate for audio processing
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default frames per period
    pub const DEFAULT_FRAMES_PER_PERIOD: usize = 128;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: usize = 2;

    /// Default regulator slot pool size
    pub const DEFAULT_POOL_SIZE: usize = 128;

    /// Default loss-detection lookback, in packets
    pub const DEFAULT_LOOKBACK_WINDOW: usize = 32;

    /// Default loss tolerance in milliseconds
    pub const DEFAULT_TOLERANCE_MS: f64 = 10.0;

    /// Sequence number space of the 16-bit wire header
    pub const WIRE_SEQUENCE_MODULUS: u32 = 1 << 16;
}
