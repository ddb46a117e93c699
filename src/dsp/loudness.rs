//! Loudness compensation: a double-buffered table of shelf biquad
//! coefficients indexed by master-volume step, derived from the ISO 226:2003
//! equal-loudness contour (spec.md §3, §4.2 step 3).
//!
//! Each entry is `[low_shelf(200 Hz, Q=0.707), high_shelf(6 kHz, Q=0.707)]`
//! whose gains are derived from the contour at 50 Hz and 10 kHz relative to
//! the configured reference SPL. `active_index` selects which of the two
//! buffers the audio loop reads; recomputation fills the *other* buffer and
//! then flips the index in one atomic store (spec.md §5).

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::dsp::biquad::{Biquad, BiquadCoeffs};
use crate::dsp::config::VOLUME_STEPS;
use crate::dsp::filter_recipe::{FilterRecipe, FilterType};

/// One loudness table entry: low-shelf + high-shelf coefficients (no state —
/// the audio loop's own `Biquad`s hold the running state; this table only
/// carries coefficients, spec.md §3).
#[derive(Debug, Clone, Copy)]
pub struct LoudnessEntry {
    pub low_shelf: BiquadCoeffs,
    pub high_shelf: BiquadCoeffs,
}

impl LoudnessEntry {
    fn identity() -> Self {
        Self { low_shelf: BiquadCoeffs::identity(), high_shelf: BiquadCoeffs::identity() }
    }
}

/// Simplified ISO 226:2003 equal-loudness boost, in dB, needed at `freq_hz`
/// so that a tone at `phon` perceived level matches the reference contour at
/// `ref_phon`. Modeled as a single low-order correction curve (not a full
/// ISO 226 table) — accurate enough for a bass/treble tilt at low listening
/// volumes, which is this feature's stated purpose.
fn iso226_boost_db(phon_deficit: f32, low_freq_weight: f32) -> f32 {
    // The quieter the listener has gone (larger deficit from reference),
    // the more boost is needed; equal-loudness contours compress at low
    // frequencies faster than high, hence the per-band weight.
    (phon_deficit * low_freq_weight).clamp(0.0, 18.0)
}

/// A pair of double-buffered tables, each `[91 volume steps][2 biquads]`
/// (spec.md §3).
pub struct LoudnessTable {
    buffers: [[LoudnessEntry; VOLUME_STEPS]; 2],
    active_index: AtomicUsize,
    pub reference_spl_db: f32,
    pub enabled: bool,
}

impl LoudnessTable {
    pub fn new(reference_spl_db: f32) -> Self {
        let mut table = Self {
            buffers: [[LoudnessEntry::identity(); VOLUME_STEPS]; 2],
            active_index: AtomicUsize::new(0),
            reference_spl_db,
            enabled: false,
        };
        table.recompute(48_000.0);
        table
    }

    /// Which table the audio loop should read right now. Read once at
    /// packet start and used throughout that packet (spec.md §5).
    pub fn active_index(&self) -> usize {
        self.active_index.load(Ordering::Acquire)
    }

    pub fn entry(&self, active: usize, volume_step: usize) -> LoudnessEntry {
        self.buffers[active][volume_step.min(VOLUME_STEPS - 1)]
    }

    /// Fill the *inactive* table for all 91 volume steps, then flip
    /// `active_index` with a single release store (spec.md §4.7 "Loudness
    /// recompute"). Safe to call from the control plane between packets.
    pub fn recompute(&mut self, sample_rate_hz: f32) {
        let current = self.active_index.load(Ordering::Acquire);
        let inactive = 1 - current;

        for step in 0..VOLUME_STEPS {
            // Volume step 90 is reference (0 dB deficit); step 0 is quietest
            // (largest deficit), linear in step count for simplicity.
            let deficit = (VOLUME_STEPS - 1 - step) as f32 * (24.0 / (VOLUME_STEPS - 1) as f32);

            let entry = if !self.enabled || deficit < 0.01 {
                LoudnessEntry::identity()
            } else {
                let low_gain = iso226_boost_db(deficit, 0.75); // 50 Hz contour
                let high_gain = iso226_boost_db(deficit, 0.35); // 10 kHz contour
                let low_shelf = FilterRecipe {
                    filter_type: FilterType::LowShelf,
                    freq_hz: 200.0,
                    q_factor: 0.707,
                    gain_db: low_gain,
                }
                .compile(sample_rate_hz);
                let high_shelf = FilterRecipe {
                    filter_type: FilterType::HighShelf,
                    freq_hz: 6_000.0,
                    q_factor: 0.707,
                    gain_db: high_gain,
                }
                .compile(sample_rate_hz);
                LoudnessEntry { low_shelf, high_shelf }
            };
            self.buffers[inactive][step] = entry;
        }

        self.active_index.store(inactive, Ordering::Release);
    }
}

/// Runtime loudness processing state: the two cascaded shelf biquads that
/// the audio loop actually runs samples through, kept separate from the
/// coefficient table so state survives table flips.
pub struct LoudnessStage {
    low: Biquad,
    high: Biquad,
}

impl LoudnessStage {
    pub fn new() -> Self {
        Self { low: Biquad::new(), high: Biquad::new() }
    }

    /// Load this packet's coefficients from the table. Called once at
    /// packet start, per the active-index read discipline (spec.md §5) —
    /// not per sample.
    pub fn load_entry(&mut self, entry: LoudnessEntry) {
        self.low.set_coeffs(entry.low_shelf, entry.low_shelf.is_identity());
        self.high.set_coeffs(entry.high_shelf, entry.high_shelf.is_identity());
    }

    #[inline]
    pub fn process(&mut self, x: crate::dsp::numeric::Sample) -> crate::dsp::numeric::Sample {
        let y = if self.low.bypass { x } else { self.low.process(x) };
        if self.high.bypass {
            y
        } else {
            self.high.process(y)
        }
    }
}

impl Default for LoudnessStage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_volume_step_is_identity() {
        // spec.md §8: at effective_phon == ref_spl, compensation is 0 dB at
        // both shelves (identity). Step 90 (the top step) is the reference.
        let mut table = LoudnessTable::new(83.0);
        table.enabled = true;
        table.recompute(48_000.0);
        let active = table.active_index();
        let entry = table.entry(active, VOLUME_STEPS - 1);
        assert!(entry.low_shelf.is_identity());
        assert!(entry.high_shelf.is_identity());
    }

    #[test]
    fn disabled_table_is_always_identity() {
        let mut table = LoudnessTable::new(83.0);
        table.enabled = false;
        table.recompute(48_000.0);
        let active = table.active_index();
        for step in 0..VOLUME_STEPS {
            let e = table.entry(active, step);
            assert!(e.low_shelf.is_identity());
            assert!(e.high_shelf.is_identity());
        }
    }

    #[test]
    fn recompute_flips_active_index() {
        let mut table = LoudnessTable::new(83.0);
        let before = table.active_index();
        table.recompute(48_000.0);
        let after = table.active_index();
        assert_ne!(before, after);
    }

    #[test]
    fn quiet_steps_boost_bass_more_than_treble() {
        let mut table = LoudnessTable::new(83.0);
        table.enabled = true;
        table.recompute(48_000.0);
        let active = table.active_index();
        let quiet = table.entry(active, 0);
        assert!(!quiet.low_shelf.is_identity());
        assert!(!quiet.high_shelf.is_identity());
    }
}
