//! Direct Form II Transposed biquad IIR filter.
//!
//! ```text
//! y  = b0*x + s1
//! s1 = b1*x - a1*y + s2
//! s2 = b2*x - a2*y
//! ```
//!
//! Coefficients are normalized by `a0` at computation time (see
//! `filter_recipe.rs`); the kernel itself never divides. Every biquad
//! carries a `bypass` flag that is true exactly when the coefficients equal
//! the identity filter (spec.md §3, §8 invariant).

use crate::dsp::numeric::{accum_to_sample, coeff_mul, from_f32, sample_to_accum, Accum, Sample};

/// Five normalized coefficients plus the two-register TDF-II state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: Sample,
    pub b1: Sample,
    pub b2: Sample,
    pub a1: Sample,
    pub a2: Sample,
}

impl BiquadCoeffs {
    /// The flat/identity filter: `H(z) = 1`.
    pub fn identity() -> Self {
        Self {
            b0: from_f32(1.0),
            b1: from_f32(0.0),
            b2: from_f32(0.0),
            a1: from_f32(0.0),
            a2: from_f32(0.0),
        }
    }

    /// True when these coefficients are (exactly) the identity filter.
    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::identity()
    }
}

/// A single biquad stage: compiled coefficients plus its running state.
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    s1: Accum,
    s2: Accum,
    /// Skipped in the inner loop when set (spec.md §3).
    pub bypass: bool,
}

impl Biquad {
    pub fn new() -> Self {
        Self {
            coeffs: BiquadCoeffs::identity(),
            s1: 0 as Accum,
            s2: 0 as Accum,
            bypass: true,
        }
    }

    /// Replace coefficients and bypass flag. State (s1, s2) is left running —
    /// the compute-then-commit contract (spec.md §4.2) only ever swaps
    /// coefficients, never resets history, so a parameter tweak doesn't
    /// produce an audible click.
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs, bypass: bool) {
        self.coeffs = coeffs;
        self.bypass = bypass;
    }

    pub fn coeffs(&self) -> BiquadCoeffs {
        self.coeffs
    }

    /// Zero the delay registers (used on reset / gap recovery).
    pub fn reset_state(&mut self) {
        self.s1 = 0 as Accum;
        self.s2 = 0 as Accum;
    }

    /// Process one sample. Bypassed stages are the caller's responsibility to
    /// skip (the channel/band-chain loop checks `bypass` so this stays a
    /// plain function call, not a branch inside the kernel).
    #[inline(always)]
    pub fn process(&mut self, x: Sample) -> Sample {
        let c = &self.coeffs;
        let xa = sample_to_accum(x);

        let y = coeff_mul(c.b0, xa) + self.s1;
        self.s1 = coeff_mul(c.b1, xa) - coeff_mul(c.a1, y) + self.s2;
        self.s2 = coeff_mul(c.b2, xa) - coeff_mul(c.a2, y);

        accum_to_sample(y)
    }
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::numeric::to_f32;

    #[test]
    fn bypass_flag_matches_identity_invariant() {
        // spec.md §8: bypass == true <=> coefficients == identity.
        let mut bq = Biquad::new();
        assert!(bq.bypass);
        assert!(bq.coeffs().is_identity());

        bq.set_coeffs(
            BiquadCoeffs {
                b0: from_f32(0.5),
                b1: from_f32(0.0),
                b2: from_f32(0.0),
                a1: from_f32(0.0),
                a2: from_f32(0.0),
            },
            false,
        );
        assert!(!bq.bypass);
        assert!(!bq.coeffs().is_identity());
    }

    #[test]
    fn identity_filter_passes_signal_unchanged() {
        let mut bq = Biquad::new();
        for x in [0.0f32, 0.5, -0.5, 1.0, -1.0, 0.25] {
            let y = bq.process(from_f32(x));
            assert!((to_f32(y) - x).abs() < 1e-4, "x={x} y={}", to_f32(y));
        }
    }

    #[test]
    fn reset_state_clears_history() {
        let mut bq = Biquad::new();
        bq.set_coeffs(
            BiquadCoeffs {
                b0: from_f32(1.0),
                b1: from_f32(0.5),
                b2: from_f32(0.0),
                a1: from_f32(0.5),
                a2: from_f32(0.0),
            },
            false,
        );
        bq.process(from_f32(1.0));
        bq.process(from_f32(1.0));
        bq.reset_state();
        // First sample after reset behaves as if starting cold.
        let mut fresh = Biquad::new();
        fresh.set_coeffs(bq.coeffs(), false);
        assert_eq!(to_f32(bq.process(from_f32(0.0))), to_f32(fresh.process(from_f32(0.0))));
    }

    #[test]
    fn impulse_response_is_bounded_for_stable_coeffs() {
        let mut bq = Biquad::new();
        bq.set_coeffs(
            BiquadCoeffs {
                b0: from_f32(0.25),
                b1: from_f32(0.5),
                b2: from_f32(0.25),
                a1: from_f32(0.0),
                a2: from_f32(0.0),
            },
            false,
        );
        let mut impulse = [0.0f32; 8];
        impulse[0] = 1.0;
        for x in impulse {
            let y = to_f32(bq.process(from_f32(x)));
            assert!(y.abs() <= 1.0 + 1e-3);
        }
    }
}
