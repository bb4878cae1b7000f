//! Slot-level concealment across all channels

use crate::codec::FrameLayout;

use super::burg::LinearPredictor;
use super::channel::{ChannelState, Crossfade};
use super::ConcealmentProfile;

/// Turns true or missing slots into emitted slots
///
/// Owns one predictor workspace shared by all channels (they are processed
/// one after another) and the per-channel histories.
#[derive(Debug, Clone)]
pub struct Concealer {
    layout: FrameLayout,
    profile: ConcealmentProfile,
    depth: usize,
    predictor: LinearPredictor,
    fade: Crossfade,
    channels: Vec<ChannelState>,
}

impl Concealer {
    /// `depth` frame periods of history per channel, at least 2
    pub fn new(layout: FrameLayout, profile: ConcealmentProfile, depth: usize) -> Self {
        let frames = layout.frames();
        let window = frames * depth;
        let order = window / depth - 1;
        Self {
            layout,
            profile,
            depth,
            predictor: LinearPredictor::new(window, order, profile.damping()),
            fade: Crossfade::new(frames),
            channels: (0..layout.channels())
                .map(|_| ChannelState::new(frames, depth))
                .collect(),
        }
    }

    pub fn history_depth(&self) -> usize {
        self.depth
    }

    pub fn profile(&self) -> ConcealmentProfile {
        self.profile
    }

    pub fn crossfade(&self) -> &Crossfade {
        &self.fade
    }

    pub fn last_was_concealed(&self) -> bool {
        self.channels.iter().any(ChannelState::last_was_concealed)
    }

    /// Emit a true slot into `out`
    ///
    /// Copies the bytes straight through unless a crossfade was needed.
    pub fn accept(&mut self, slot: &[u8], out: &mut [u8], discontinuous: bool) {
        let mut blended = false;
        for (ch, state) in self.channels.iter_mut().enumerate() {
            self.layout.decode_channel(slot, ch, state.truth_mut());
            blended |= state.accept(&self.fade, &mut self.predictor, discontinuous);
        }

        if blended {
            for (ch, state) in self.channels.iter().enumerate() {
                self.layout.encode_channel(state.output(), ch, out);
            }
        } else {
            out.copy_from_slice(slot);
        }
    }

    /// Synthesize a missing slot into `out`
    pub fn conceal(&mut self, out: &mut [u8]) {
        let silent = self.profile.silent_until_primed();
        for (ch, state) in self.channels.iter_mut().enumerate() {
            state.conceal(&self.fade, &mut self.predictor, silent);
            self.layout.encode_channel(state.output(), ch, out);
        }
    }

    pub fn reset(&mut self) {
        self.channels.iter_mut().for_each(ChannelState::reset);
    }
}
