//! Per-channel concealment state

use super::burg::LinearPredictor;

/// Linear ramp across one frame period
#[derive(Debug, Clone)]
pub struct Crossfade {
    up: Vec<f32>,
    down: Vec<f32>,
}

impl Crossfade {
    pub fn new(frames: usize) -> Self {
        let up: Vec<f32> = (0..frames).map(|i| i as f32 / frames as f32).collect();
        let down = up.iter().map(|u| 1.0 - u).collect();
        Self { up, down }
    }

    pub fn len(&self) -> usize {
        self.up.len()
    }

    pub fn is_empty(&self) -> bool {
        self.up.is_empty()
    }

    /// Largest per-sample change the ramp itself contributes for full-scale input
    pub fn max_ramp_step(&self) -> f32 {
        1.0 / self.up.len().max(1) as f32
    }

    /// Fade out of `from` and into `to`
    pub fn blend(&self, from: &[f32], to: &[f32], out: &mut [f32]) {
        for s in 0..self.up.len() {
            out[s] = to[s] * self.up[s] + from[s] * self.down[s];
        }
    }
}

/// History, scratch space and continuity state for one channel
///
/// The history always receives what was emitted, predicted or true, so the
/// predictor trains on the signal the listener actually heard.
#[derive(Debug, Clone)]
pub struct ChannelState {
    frames: usize,
    depth: usize,
    /// Last `depth` emitted periods, oldest first
    history: Vec<f32>,
    periods: usize,
    /// History followed by two predicted periods
    tail: Vec<f32>,
    truth: Vec<f32>,
    output: Vec<f32>,
    /// Forward continuation of the last prediction
    continuation: Vec<f32>,
    concealed: bool,
}

impl ChannelState {
    pub fn new(frames: usize, depth: usize) -> Self {
        let window = frames * depth;
        Self {
            frames,
            depth,
            history: vec![0.0; window],
            periods: 0,
            tail: vec![0.0; window + 2 * frames],
            truth: vec![0.0; frames],
            output: vec![0.0; frames],
            continuation: vec![0.0; frames],
            concealed: false,
        }
    }

    /// Buffer the caller decodes the incoming period into
    pub fn truth_mut(&mut self) -> &mut [f32] {
        &mut self.truth
    }

    /// Samples emitted for the current period
    pub fn output(&self) -> &[f32] {
        &self.output
    }

    /// Samples the predictor trains on
    pub fn history(&self) -> &[f32] {
        &self.history
    }

    /// True once `depth` periods have been recorded
    pub fn is_primed(&self) -> bool {
        self.periods >= self.depth
    }

    pub fn last_was_concealed(&self) -> bool {
        self.concealed
    }

    fn window(&self) -> usize {
        self.frames * self.depth
    }

    /// Fit the history and extrapolate two periods into `tail`
    fn predict(&mut self, predictor: &mut LinearPredictor) {
        let window = self.window();
        predictor.train(&self.history);
        self.tail[..window].copy_from_slice(&self.history);
        predictor.extrapolate(&mut self.tail, window);
    }

    fn record_output(&mut self) {
        let window = self.window();
        self.history.copy_within(self.frames.., 0);
        self.history[window - self.frames..].copy_from_slice(&self.output);
        if self.periods < self.depth {
            self.periods += 1;
        }
    }

    /// Emit the decoded true period
    ///
    /// After a concealed period, or when `discontinuous` marks a jump in the
    /// sequence, the output fades from the predicted continuation into the
    /// truth. Returns true when the output differs from the truth.
    pub fn accept(
        &mut self,
        fade: &Crossfade,
        predictor: &mut LinearPredictor,
        discontinuous: bool,
    ) -> bool {
        let blended = if self.concealed {
            fade.blend(&self.continuation, &self.truth, &mut self.output);
            true
        } else if discontinuous && self.is_primed() {
            self.predict(predictor);
            let window = self.window();
            fade.blend(&self.tail[window..window + self.frames], &self.truth, &mut self.output);
            true
        } else {
            self.output.copy_from_slice(&self.truth);
            false
        };
        self.record_output();
        self.concealed = false;
        blended
    }

    /// Synthesize the missing period
    ///
    /// Back-to-back concealments fade from the previous prediction's
    /// continuation. A first concealment plays the prediction as is: it is
    /// extrapolated from the last emitted samples and already continues them.
    pub fn conceal(
        &mut self,
        fade: &Crossfade,
        predictor: &mut LinearPredictor,
        silent_until_primed: bool,
    ) {
        if silent_until_primed && !self.is_primed() {
            self.output.iter_mut().for_each(|s| *s = 0.0);
            self.continuation.iter_mut().for_each(|s| *s = 0.0);
        } else {
            self.predict(predictor);
            let window = self.window();
            let frames = self.frames;
            let prediction = &self.tail[window..window + frames];
            if self.concealed {
                fade.blend(&self.continuation, prediction, &mut self.output);
            } else {
                self.output.copy_from_slice(prediction);
            }
            self.continuation
                .copy_from_slice(&self.tail[window + frames..window + 2 * frames]);
            self.output.iter_mut().for_each(|s| *s = s.clamp(-1.0, 1.0));
        }
        self.record_output();
        self.concealed = true;
    }

    /// Forget history and continuity
    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|s| *s = 0.0);
        self.continuation.iter_mut().for_each(|s| *s = 0.0);
        self.periods = 0;
        self.concealed = false;
    }
}
