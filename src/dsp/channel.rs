//! Five logical channels (spec.md §3): `MasterL`, `MasterR` (input-side EQ,
//! up to 10 bands), `OutL`, `OutR`, `Sub` (output-side EQ, 2-10 bands
//! depending on platform budget).

use crate::dsp::biquad::Biquad;
use crate::dsp::config::{MAX_MASTER_BANDS, MAX_OUTPUT_BANDS, SUB_BAND_COUNT};
use crate::dsp::filter_recipe::FilterRecipe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ChannelId {
    MasterL,
    MasterR,
    OutL,
    OutR,
    Sub,
}

impl ChannelId {
    /// All five channels, in a fixed order used for status iteration.
    pub const ALL: [ChannelId; 5] = [
        ChannelId::MasterL,
        ChannelId::MasterR,
        ChannelId::OutL,
        ChannelId::OutR,
        ChannelId::Sub,
    ];

    /// Number of usable EQ bands for this channel, honoring the platform
    /// budget (spec.md §3: "2-10 bands each depending on platform budget").
    /// Sub's count is `SUB_BAND_COUNT`, a platform-chosen value within
    /// `MIN_SUB_BANDS..=MAX_OUTPUT_BANDS` rather than the full L/R budget.
    pub const fn band_count(self) -> usize {
        match self {
            ChannelId::MasterL | ChannelId::MasterR => MAX_MASTER_BANDS,
            ChannelId::OutL | ChannelId::OutR => MAX_OUTPUT_BANDS,
            ChannelId::Sub => SUB_BAND_COUNT,
        }
    }
}

/// A bank of biquads for one channel's EQ chain, with a channel-level
/// bypass that short-circuits the whole chain (spec.md §4.2 step 4).
pub struct EqBank {
    bands: [Biquad; MAX_MASTER_BANDS],
    recipes: [FilterRecipe; MAX_MASTER_BANDS],
    active_bands: usize,
    pub bypass: bool,
}

impl EqBank {
    pub fn new(active_bands: usize) -> Self {
        Self {
            bands: [Biquad::new(); MAX_MASTER_BANDS],
            recipes: [FilterRecipe::flat(); MAX_MASTER_BANDS],
            active_bands,
            bypass: false,
        }
    }

    pub fn active_bands(&self) -> usize {
        self.active_bands
    }

    /// `0 <= band < channel_band_count[channel]` (spec.md §8 invariant).
    pub fn band_in_range(&self, band: usize) -> bool {
        band < self.active_bands
    }

    pub fn recipe(&self, band: usize) -> Option<FilterRecipe> {
        self.recipes.get(band).copied()
    }

    /// Stage a new recipe for `band` and recompute its compiled biquad at
    /// the given sample rate. Computation happens here, outside any lock
    /// (spec.md §4.2/§4.7 compute-then-commit contract); callers that need
    /// the brief-interrupt-suspension commit step wrap this call themselves.
    pub fn set_recipe(&mut self, band: usize, recipe: FilterRecipe, sample_rate_hz: f32) -> bool {
        if !self.band_in_range(band) {
            return false;
        }
        let recipe = recipe.clamped();
        let coeffs = recipe.compile(sample_rate_hz);
        self.recipes[band] = recipe;
        self.bands[band].set_coeffs(coeffs, recipe.is_flat());
        true
    }

    /// Recompute every active band's biquad at a new sample rate, keeping
    /// the recipes unchanged (spec.md §4.7 "Rate change").
    pub fn recompute_all(&mut self, sample_rate_hz: f32) {
        for i in 0..self.active_bands {
            let recipe = self.recipes[i];
            let coeffs = recipe.compile(sample_rate_hz);
            self.bands[i].set_coeffs(coeffs, recipe.is_flat());
        }
    }

    /// Run one sample through every non-bypassed active band, in order.
    #[inline]
    pub fn process(&mut self, x: crate::dsp::numeric::Sample) -> crate::dsp::numeric::Sample {
        if self.bypass {
            return x;
        }
        let mut y = x;
        for band in self.bands[..self.active_bands].iter_mut() {
            if !band.bypass {
                y = band.process(y);
            }
        }
        y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_range_invariant_holds_for_every_channel() {
        for ch in ChannelId::ALL {
            let bank = EqBank::new(ch.band_count());
            for b in 0..ch.band_count() {
                assert!(bank.band_in_range(b));
            }
            assert!(!bank.band_in_range(ch.band_count()));
        }
    }

    #[test]
    fn out_of_range_band_rejected() {
        let mut bank = EqBank::new(4);
        assert!(!bank.set_recipe(4, FilterRecipe::flat(), 48_000.0));
        assert!(bank.set_recipe(3, FilterRecipe::flat(), 48_000.0));
    }

    #[test]
    fn channel_bypass_short_circuits_chain() {
        use crate::dsp::filter_recipe::FilterType;
        use crate::dsp::numeric::{from_f32, to_f32};

        let mut bank = EqBank::new(2);
        bank.set_recipe(
            0,
            FilterRecipe {
                filter_type: FilterType::LowPass,
                freq_hz: 200.0,
                q_factor: 0.707,
                gain_db: 0.0,
            },
            48_000.0,
        );
        bank.bypass = true;
        let y = bank.process(from_f32(0.37));
        assert_eq!(to_f32(y), 0.37);
    }
}
