//! Strategy selection
//!
//! The session holds one `JitterStrategy` and drives it without caring which
//! buffer is inside.

use serde::{Deserialize, Serialize};
use tracing::{info, info_span};

use crate::clock::SharedClock;
use crate::codec::FrameLayout;
use crate::config::EngineConfig;
use crate::error::{ConfigError, JitterError};
use crate::stats::JitterStats;

use super::classic::ClassicJitterBuffer;
use super::regulator::Regulator;

/// Configured strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Slot table with loss concealment
    #[default]
    Regulator,
    /// Byte ring with level control and zero fill
    Classic,
}

impl StrategyKind {
    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Regulator => "regulator",
            StrategyKind::Classic => "classic",
        }
    }
}

/// One of the two jitter buffers, behind a common push/pull surface
pub enum JitterStrategy {
    Regulator(Regulator),
    Classic(ClassicJitterBuffer),
}

impl JitterStrategy {
    /// Build the strategy the config selects
    pub fn from_config(config: &EngineConfig, clock: SharedClock) -> Result<Self, ConfigError> {
        config.validate()?;
        let audio = &config.audio;
        let kind = config.jitter.strategy;
        let span = info_span!(
            "jitter",
            strategy = kind.name(),
            frames = audio.frames_per_period,
            channels = audio.channels,
            bit_depth = %audio.bit_depth,
        );

        let strategy = match kind {
            StrategyKind::Regulator => JitterStrategy::Regulator(
                Regulator::new(audio, &config.jitter.regulator, clock)?.with_span(span.clone()),
            ),
            StrategyKind::Classic => JitterStrategy::Classic(
                ClassicJitterBuffer::new(audio, &config.jitter.classic, clock)?
                    .with_span(span.clone()),
            ),
        };

        info!(
            parent: &span,
            slot_bytes = strategy.slot_bytes(),
            sample_rate = audio.sample_rate,
            "Jitter strategy selected"
        );
        Ok(strategy)
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            JitterStrategy::Regulator(_) => StrategyKind::Regulator,
            JitterStrategy::Classic(_) => StrategyKind::Classic,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn layout(&self) -> FrameLayout {
        match self {
            JitterStrategy::Regulator(r) => r.layout(),
            JitterStrategy::Classic(c) => c.layout(),
        }
    }

    /// Exact payload length `push` accepts and `pull` fills
    pub fn slot_bytes(&self) -> usize {
        self.layout().slot_bytes()
    }

    pub fn push(&self, payload: &[u8], seq: u32, declared_loss: usize) -> Result<(), JitterError> {
        match self {
            JitterStrategy::Regulator(r) => r.push(payload, seq, declared_loss),
            JitterStrategy::Classic(c) => c.push(payload, seq, declared_loss),
        }
    }

    pub fn pull(&self, out: &mut [u8]) -> Result<(), JitterError> {
        match self {
            JitterStrategy::Regulator(r) => r.pull(out),
            JitterStrategy::Classic(c) => c.pull(out),
        }
    }

    /// Read the broadcast tap; the regulator has none and always returns silence
    pub fn pull_broadcast(&self, out: &mut [u8]) -> Result<bool, JitterError> {
        match self {
            JitterStrategy::Regulator(r) => {
                let expected = r.layout().slot_bytes();
                if out.len() != expected {
                    return Err(JitterError::OutputLength {
                        expected,
                        actual: out.len(),
                    });
                }
                out.fill(0);
                Ok(false)
            }
            JitterStrategy::Classic(c) => c.pull_broadcast(out),
        }
    }

    pub fn stats(&self, reset: bool) -> JitterStats {
        match self {
            JitterStrategy::Regulator(r) => r.stats(reset),
            JitterStrategy::Classic(c) => c.stats(reset),
        }
    }
}
