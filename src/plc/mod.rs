//! Packet loss concealment
//!
//! When a frame period is missing the regulator asks the [`Concealer`] for a
//! replacement. Each channel keeps a short history of what was actually
//! emitted; a Burg linear predictor is fitted to it and extrapolated one
//! period forward, and linear crossfades stitch predictions to their
//! neighbours.

pub mod burg;
pub mod channel;
pub mod concealer;

pub use burg::LinearPredictor;
pub use channel::{ChannelState, Crossfade};
pub use concealer::Concealer;

use serde::{Deserialize, Serialize};

/// History length the standard profile aims for, in samples
pub const STANDARD_HISTORY_SAMPLES: usize = 192;

/// Bounds on history depth, in frame periods
pub const MIN_HISTORY_DEPTH: usize = 2;
pub const MAX_HISTORY_DEPTH: usize = 6;

/// Fixed history depth of the legacy profile, in frame periods
pub const LEGACY_HISTORY_DEPTH: usize = 5;

/// Tuning set for the concealment engine
///
/// Two engines grew independently with different constants. Both are kept
/// selectable until one is confirmed as the intended tuning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcealmentProfile {
    /// Timing-table regulator tuning: depth scales with the frame period
    #[default]
    Standard,
    /// Fixed-depth tuning with heavier damping and silence until primed
    Legacy,
}

impl ConcealmentProfile {
    /// Multiplier on the initial Burg error power
    pub fn damping(self) -> f64 {
        match self {
            ConcealmentProfile::Standard => 2.00001,
            ConcealmentProfile::Legacy => 2.00002,
        }
    }

    /// History depth in frame periods, honouring an explicit override
    pub fn history_depth(self, frames_per_period: usize, requested: Option<usize>) -> usize {
        if let Some(depth) = requested {
            return depth;
        }
        match self {
            ConcealmentProfile::Standard => (STANDARD_HISTORY_SAMPLES / frames_per_period.max(1))
                .clamp(MIN_HISTORY_DEPTH, MAX_HISTORY_DEPTH),
            ConcealmentProfile::Legacy => LEGACY_HISTORY_DEPTH,
        }
    }

    /// Whether concealment before the history fills emits silence
    pub fn silent_until_primed(self) -> bool {
        matches!(self, ConcealmentProfile::Legacy)
    }
}
