//! Linear prediction by Burg's method
//!
//! Fits an all-pole model to a training window by minimising the combined
//! forward and backward prediction error, then extrapolates forward by
//! feeding predictions back into the filter.

/// Error power substituted when the recursion's denominator reaches zero
const ERROR_POWER_EPSILON: f64 = 1e-7;

/// Burg fitter with preallocated workspace
///
/// Sized once for a window length and order; `train` and `extrapolate` never
/// allocate and cost `O(order * window)`.
#[derive(Debug, Clone)]
pub struct LinearPredictor {
    window: usize,
    order: usize,
    damping: f64,
    ak: Vec<f64>,
    f: Vec<f64>,
    b: Vec<f64>,
    coeffs: Vec<f64>,
}

impl LinearPredictor {
    /// Create a predictor for `window` training samples
    ///
    /// `order` is clamped to `window - 1`. `damping` scales the initial error
    /// power; 2.0 is plain Burg, slightly more keeps near-periodic input
    /// from producing unit-magnitude reflection coefficients.
    pub fn new(window: usize, order: usize, damping: f64) -> Self {
        assert!(window >= 2, "Training window needs at least 2 samples");
        let order = order.clamp(1, window - 1);
        Self {
            window,
            order,
            damping,
            ak: vec![0.0; order + 1],
            f: vec![0.0; window],
            b: vec![0.0; window],
            coeffs: vec![0.0; order],
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Coefficients from the last `train`
    pub fn coefficients(&self) -> &[f64] {
        &self.coeffs
    }

    /// Fit coefficients to `x[..window]`
    pub fn train(&mut self, x: &[f32]) -> &[f64] {
        let x = &x[..self.window];
        let n_last = self.window - 1;
        let m = self.order;
        let damping = self.damping;

        self.ak.iter_mut().for_each(|a| *a = 0.0);
        self.ak[0] = 1.0;
        for (i, &sample) in x.iter().enumerate() {
            self.f[i] = sample as f64;
            self.b[i] = sample as f64;
        }

        let f = &mut self.f;
        let b = &mut self.b;
        let ak = &mut self.ak;

        let mut dk: f64 = f.iter().map(|v| damping * v * v).sum();
        dk -= f[0] * f[0] + b[n_last] * b[n_last];

        for k in 0..m {
            let mut mu = 0.0;
            for n in 0..(n_last - k) {
                mu += f[n + k + 1] * b[n];
            }

            if dk == 0.0 {
                dk = ERROR_POWER_EPSILON;
            }
            mu *= -2.0 / dk;

            for n in 0..=(k + 1) / 2 {
                let t1 = ak[n] + mu * ak[k + 1 - n];
                let t2 = ak[k + 1 - n] + mu * ak[n];
                ak[n] = t1;
                ak[k + 1 - n] = t2;
            }

            for n in 0..(n_last - k) {
                let t1 = f[n + k + 1] + mu * b[n];
                let t2 = b[n] + mu * f[n + k + 1];
                f[n + k + 1] = t1;
                b[n] = t2;
            }

            dk = (1.0 - mu * mu) * dk - f[k + 1] * f[k + 1] - b[n_last - k - 1] * b[n_last - k - 1];
        }

        self.coeffs.copy_from_slice(&ak[1..]);
        &self.coeffs
    }

    /// Extrapolate `tail[known..]` from `tail[..known]`
    ///
    /// Each new sample is `-sum(a[j] * x[n - 1 - j])`, including samples the
    /// call itself just produced. Requires `known >= order`.
    pub fn extrapolate(&self, tail: &mut [f32], known: usize) {
        debug_assert!(known >= self.order);
        for i in known..tail.len() {
            let mut acc = 0.0f64;
            for (j, a) in self.coeffs.iter().enumerate() {
                acc -= a * tail[i - 1 - j] as f64;
            }
            tail[i] = acc as f32;
        }
    }
}
