//! Interleaved frame layout
//!
//! A slot holds one frame period of interleaved audio: for every frame, one
//! sample per channel, each `depth.bytes()` wide.

use super::sample::{BitDepth, SampleCodec};

/// Geometry of one frame period on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    frames: usize,
    channels: usize,
    codec: SampleCodec,
}

impl FrameLayout {
    pub fn new(frames: usize, channels: usize, depth: BitDepth) -> Self {
        Self {
            frames,
            channels,
            codec: SampleCodec::new(depth),
        }
    }

    /// Frames per period
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn depth(&self) -> BitDepth {
        self.codec.depth()
    }

    pub fn codec(&self) -> SampleCodec {
        self.codec
    }

    /// Bytes in one interleaved frame (all channels)
    pub fn frame_bytes(&self) -> usize {
        self.channels * self.codec.width()
    }

    /// Bytes in one slot
    pub fn slot_bytes(&self) -> usize {
        self.frames * self.frame_bytes()
    }

    #[inline]
    fn offset(&self, frame: usize, channel: usize) -> usize {
        (frame * self.channels + channel) * self.codec.width()
    }

    /// Decode one channel of a slot into `out[..frames]`
    pub fn decode_channel(&self, slot: &[u8], channel: usize, out: &mut [f32]) {
        let width = self.codec.width();
        for (frame, sample) in out.iter_mut().enumerate().take(self.frames) {
            let at = self.offset(frame, channel);
            *sample = self.codec.decode(&slot[at..at + width]);
        }
    }

    /// Encode `samples[..frames]` into one channel of a slot
    pub fn encode_channel(&self, samples: &[f32], channel: usize, slot: &mut [u8]) {
        let width = self.codec.width();
        for (frame, &sample) in samples.iter().enumerate().take(self.frames) {
            let at = self.offset(frame, channel);
            self.codec.encode(sample, &mut slot[at..at + width]);
        }
    }

    /// Encode interleaved samples into a fresh slot
    ///
    /// Allocates; meant for producers and tests, not the audio path.
    pub fn encode_interleaved(&self, samples: &[f32]) -> Vec<u8> {
        let width = self.codec.width();
        let mut slot = vec![0u8; self.slot_bytes()];
        for (chunk, &sample) in slot.chunks_exact_mut(width).zip(samples) {
            self.codec.encode(sample, chunk);
        }
        slot
    }

    /// Decode a slot into interleaved samples
    pub fn decode_interleaved(&self, slot: &[u8]) -> Vec<f32> {
        slot.chunks_exact(self.codec.width())
            .map(|chunk| self.codec.decode(chunk))
            .collect()
    }
}
