//! Jitter buffering
//!
//! Network packets go in with [`JitterStrategy::push`], the audio callback
//! takes one frame period at a time with [`JitterStrategy::pull`]. Two
//! buffers sit behind that surface: the concealing [`Regulator`] and the
//! [`ClassicJitterBuffer`].

pub mod classic;
pub mod regulator;
pub mod sequence;
pub mod slots;
pub mod strategy;

pub use classic::{ClassicConfig, ClassicJitterBuffer, LevelCorrection};
pub use regulator::{Regulator, RegulatorConfig};
pub use sequence::SequenceWindow;
pub use slots::SlotStore;
pub use strategy::{JitterStrategy, StrategyKind};
