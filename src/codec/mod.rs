//! Sample codec
//!
//! Places normalised float samples into wire packets at a selectable
//! bit depth, and lays them out as interleaved frame periods.

pub mod frame;
pub mod sample;

pub use frame::FrameLayout;
pub use sample::{BitDepth, SampleCodec};
