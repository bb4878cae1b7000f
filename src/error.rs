//! Error types for the jitter engine

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Jitter buffer error: {0}")]
    Jitter(#[from] JitterError),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Construction-time misconfiguration
///
/// These are fatal to building a strategy, never to a running session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Channel count must be at least 1")]
    ZeroChannels,

    #[error("Frame period must be at least 1 frame")]
    ZeroFramesPerPeriod,

    #[error("Sample rate must be non-zero")]
    ZeroSampleRate,

    #[error("Unsupported bit depth: {0} (expected 8, 16, 24 or 32)")]
    UnsupportedBitDepth(u8),

    #[error("Slot pool size must be a power of 2, got {0}")]
    PoolSizeNotPowerOfTwo(usize),

    #[error("Lookback window {window} must be between 1 and {max}")]
    LookbackWindow { window: usize, max: usize },

    #[error("History depth must be at least 2 frame periods, got {0}")]
    HistoryDepth(usize),

    #[error("Invalid tolerance: {0}")]
    Tolerance(String),

    #[error("Invalid queue setting: {0}")]
    Queue(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),
}

/// Errors surfaced by the push/pull contract
///
/// Carries no heap data so it is safe to return from the audio path.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterError {
    #[error("Payload length {actual} does not match slot size {expected}")]
    PayloadLength { expected: usize, actual: usize },

    #[error("Output buffer length {actual} does not match slot size {expected}")]
    OutputLength { expected: usize, actual: usize },
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
