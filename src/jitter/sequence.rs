//! Wrapping sequence-number arithmetic
//!
//! Sequence numbers live in `[0, modulus)`. Two numbers are only ever
//! compared when they are within half the modulus of each other, which makes
//! the signed distance unambiguous across the wrap boundary.

/// Modulo helpers for one sequence space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceWindow {
    modulus: u32,
}

impl SequenceWindow {
    /// Create a window over `[0, modulus)`
    ///
    /// modulus must be a power of 2 no larger than 2^31
    pub fn new(modulus: u32) -> Self {
        assert!(modulus.is_power_of_two(), "Modulus must be power of 2");
        assert!(modulus <= 1 << 31, "Modulus too large");
        Self { modulus }
    }

    pub fn modulus(&self) -> u32 {
        self.modulus
    }

    /// Reduce a raw sequence number into the window
    #[inline]
    pub fn wrap(&self, seq: u32) -> u32 {
        seq & (self.modulus - 1)
    }

    /// Signed distance `a - b`
    ///
    /// Positive when `a` is newer. A raw difference above half the modulus
    /// is read as negative; exactly half stays positive.
    #[inline]
    pub fn distance(&self, a: u32, b: u32) -> i32 {
        let d = self.wrap(self.wrap(a).wrapping_sub(self.wrap(b)));
        if d > self.modulus / 2 {
            (d as i64 - self.modulus as i64) as i32
        } else {
            d as i32
        }
    }

    /// `seq + by`, wrapped
    #[inline]
    pub fn advance(&self, seq: u32, by: u32) -> u32 {
        self.wrap(seq.wrapping_add(by))
    }

    /// `seq - by`, wrapped
    #[inline]
    pub fn back(&self, seq: u32, by: u32) -> u32 {
        self.wrap(seq.wrapping_sub(by))
    }
}
