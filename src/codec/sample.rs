//! Per-sample wire conversion
//!
//! Normalised `f32` samples in `[-1.0, 1.0]` are quantised to a fixed-width
//! little-endian representation. Integer depths use a symmetric full-scale
//! of `2^(bits-1) - 1`, so encode followed by decode stays within half a
//! quantisation step. 32-bit carries the raw IEEE-754 float.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Supported wire bit depths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BitDepth {
    Bit8,
    Bit16,
    Bit24,
    Bit32,
}

impl BitDepth {
    /// All supported depths, narrowest first
    pub const ALL: [BitDepth; 4] = [BitDepth::Bit8, BitDepth::Bit16, BitDepth::Bit24, BitDepth::Bit32];

    /// Parse a depth given in bits
    pub fn from_bits(bits: u8) -> Result<Self, ConfigError> {
        match bits {
            8 => Ok(BitDepth::Bit8),
            16 => Ok(BitDepth::Bit16),
            24 => Ok(BitDepth::Bit24),
            32 => Ok(BitDepth::Bit32),
            other => Err(ConfigError::UnsupportedBitDepth(other)),
        }
    }

    /// Width in bits
    pub fn bits(self) -> u8 {
        match self {
            BitDepth::Bit8 => 8,
            BitDepth::Bit16 => 16,
            BitDepth::Bit24 => 24,
            BitDepth::Bit32 => 32,
        }
    }

    /// Width in bytes of one sample on the wire
    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// Integer full-scale value, `None` for the float representation
    fn full_scale(self) -> Option<f32> {
        match self {
            BitDepth::Bit8 => Some(i8::MAX as f32),
            BitDepth::Bit16 => Some(i16::MAX as f32),
            BitDepth::Bit24 => Some(8_388_607.0),
            BitDepth::Bit32 => None,
        }
    }

    /// Largest error a decode can show against the original sample
    pub fn quantization_error(self) -> f32 {
        match self.full_scale() {
            Some(scale) => 0.5 / scale,
            None => 0.0,
        }
    }
}

impl TryFrom<u8> for BitDepth {
    type Error = ConfigError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        Self::from_bits(bits)
    }
}

impl From<BitDepth> for u8 {
    fn from(depth: BitDepth) -> Self {
        depth.bits()
    }
}

impl std::fmt::Display for BitDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// Converts single samples to and from their wire bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleCodec {
    depth: BitDepth,
}

impl SampleCodec {
    pub fn new(depth: BitDepth) -> Self {
        Self { depth }
    }

    pub fn depth(&self) -> BitDepth {
        self.depth
    }

    /// Bytes written per sample
    pub fn width(&self) -> usize {
        self.depth.bytes()
    }

    /// Encode one sample into `out[..width]`
    ///
    /// Out-of-range input is clamped and NaN encodes as silence.
    #[inline]
    pub fn encode(&self, sample: f32, out: &mut [u8]) {
        let sample = if sample.is_nan() { 0.0 } else { sample };
        match self.depth {
            BitDepth::Bit8 => {
                let v = quantize(sample, i8::MAX as f32) as i8;
                out[0] = v as u8;
            }
            BitDepth::Bit16 => {
                let v = quantize(sample, i16::MAX as f32) as i16;
                out[..2].copy_from_slice(&v.to_le_bytes());
            }
            BitDepth::Bit24 => {
                let v = quantize(sample, 8_388_607.0) as i32;
                out[..3].copy_from_slice(&v.to_le_bytes()[..3]);
            }
            BitDepth::Bit32 => {
                out[..4].copy_from_slice(&sample.to_le_bytes());
            }
        }
    }

    /// Decode one sample from `bytes[..width]`
    #[inline]
    pub fn decode(&self, bytes: &[u8]) -> f32 {
        match self.depth {
            BitDepth::Bit8 => bytes[0] as i8 as f32 / i8::MAX as f32,
            BitDepth::Bit16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / i16::MAX as f32,
            BitDepth::Bit24 => {
                let sign = if bytes[2] & 0x80 != 0 { 0xff } else { 0x00 };
                let v = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], sign]);
                v as f32 / 8_388_607.0
            }
            BitDepth::Bit32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }
}

#[inline]
fn quantize(sample: f32, scale: f32) -> f32 {
    (sample * scale).round().clamp(-scale, scale)
}
