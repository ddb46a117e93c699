//! 2nd-order leaky-integrator delta-sigma modulator driving the PDM
//! subwoofer output (spec.md §4.5). Runs on Core B; must stay in RAM (see
//! `hw::pdm_pio` / `memory.x`'s `.ram_code` section) since a flash program
//! stall would otherwise freeze the loop mid-bit and latch the output pin.
//!
//! Dither draws two independent uniform values and sums them for a true
//! triangular-PDF distribution (SPEC_FULL.md §10.5), rather than the single
//! uniform draw the hardware's historical firmware used. PRNG idiom (a
//! `SmallRng` seeded once at startup) reused from the teacher's white-noise
//! generator.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::dsp::config::{
    PDM_CLIP_THRESH, PDM_DMA_RING_MASK, PDM_DMA_RING_WORDS, PDM_LEAKAGE_SHIFT,
    PDM_TARGET_LEAD_SAMPLES, PDM_WORDS_PER_SAMPLE,
};

/// Half the amplitude of a single dither draw; two draws summed give a
/// triangular distribution spanning +-2*DITHER_HALF_RANGE, small relative to
/// the {0, 65535} feedback levels (spec.md §4.5, §9 "Dither quality").
const DITHER_HALF_RANGE: i32 = 2048;

/// Clamp a PCM value (offset-free, signed s16-ish domain) to the modulator's
/// stability limit (spec.md §4.5 step 4). 2nd-order sigma-delta is unstable
/// above ~95% modulation depth; this clamp is load-bearing and must not be
/// removed without changing the loop order (spec.md §9 open question).
#[inline]
#[cfg_attr(not(test), link_section = ".ram_code")]
fn limit(pcm: i32) -> i32 {
    pcm.clamp(-PDM_CLIP_THRESH, PDM_CLIP_THRESH)
}

#[cfg_attr(not(test), link_section = ".ram_code")]
fn tpdf_dither(rng: &mut SmallRng) -> i64 {
    let a = rng.gen_range(-DITHER_HALF_RANGE..=DITHER_HALF_RANGE);
    let b = rng.gen_range(-DITHER_HALF_RANGE..=DITHER_HALF_RANGE);
    (a + b) as i64
}

/// Owns the second-order integrator state, the PRNG, and the output ring
/// written by the modulator loop (spec.md §4.5, §6 "PDM" wire format).
pub struct PdmModulator {
    err1: i64,
    err2: i64,
    rng: SmallRng,
    write_index: usize,
    buffer: [u32; PDM_DMA_RING_WORDS],
}

impl PdmModulator {
    /// `seed` should be a hardware-derived value (e.g. ROSC jitter) at boot;
    /// tests use a fixed seed for reproducibility. The ring is pre-filled
    /// with 0xAAAAAAAA (50% duty) so the output pin doesn't sit at DC before
    /// DMA starts (spec.md §6).
    pub fn new(seed: u64) -> Self {
        Self {
            err1: 0,
            err2: 0,
            rng: SmallRng::seed_from_u64(seed),
            write_index: 0,
            buffer: [0xAAAA_AAAAu32; PDM_DMA_RING_WORDS],
        }
    }

    pub fn write_index(&self) -> usize {
        self.write_index
    }

    pub fn integrator_state(&self) -> (i64, i64) {
        (self.err1, self.err2)
    }

    pub fn word_at(&self, index: usize) -> u32 {
        self.buffer[index & PDM_DMA_RING_MASK]
    }

    /// Stable `'static` view of the ring's backing storage, for wiring the
    /// PDM DMA channel's read address against it. Only valid as `'static`
    /// because a `PdmModulator` is expected to live for the life of the
    /// program (allocated via `cortex_m::singleton!` in `main.rs`, then
    /// handed to Core B) — there's never a second, shorter-lived instance to
    /// alias.
    pub fn ring(&self) -> &'static [u32; PDM_DMA_RING_WORDS] {
        // SAFETY: see doc comment; `self` outlives the program.
        unsafe { &*(&self.buffer as *const [u32; PDM_DMA_RING_WORDS]) }
    }

    /// Words the write pointer is ahead of `read_index`, wrapped to the ring
    /// (spec.md §4.5 step 1).
    pub fn lead_words(&self, read_index: usize) -> usize {
        self.write_index.wrapping_sub(read_index) & PDM_DMA_RING_MASK
    }

    /// Underrun recovery: if the write pointer has fallen more than half a
    /// ring behind, zero the integrators and re-anchor the write pointer a
    /// fixed cushion ahead of the DMA read pointer (spec.md §4.5 step 2).
    /// Returns `true` if recovery fired.
    #[cfg_attr(not(test), link_section = ".ram_code")]
    pub fn recover_if_underrun(&mut self, read_index: usize) -> bool {
        if self.lead_words(read_index) > PDM_DMA_RING_WORDS / 2 {
            self.err1 = 0;
            self.err2 = 0;
            let target_lead_words = PDM_TARGET_LEAD_SAMPLES * PDM_WORDS_PER_SAMPLE;
            self.write_index = (read_index + target_lead_words) & PDM_DMA_RING_MASK;
            true
        } else {
            false
        }
    }

    /// Consume one PCM sample, emitting `PDM_WORDS_PER_SAMPLE` oversampled
    /// words into the ring (spec.md §4.5 steps 4-7). `reset` zeros the
    /// integrators before modulating (PcmPdmMessage's reset flag, spec.md
    /// §3) so a stream restart doesn't carry over stale error history.
    #[cfg_attr(not(test), link_section = ".ram_code")]
    pub fn process_sample(&mut self, pcm: i32, reset: bool) {
        if reset {
            self.err1 = 0;
            self.err2 = 0;
        }

        let target = (limit(pcm) + 32768) as i64;

        for _ in 0..PDM_WORDS_PER_SAMPLE {
            let dither = tpdf_dither(&mut self.rng);
            let mut word: u32 = 0;
            for _ in 0..32 {
                let fb: i64 = if self.err2 + dither >= 0 { 65535 } else { 0 };
                word = (word << 1) | ((fb != 0) as u32);
                self.err1 += target - fb;
                self.err2 += self.err1 - fb;
            }
            self.buffer[self.write_index] = word;
            self.write_index = (self.write_index + 1) & PDM_DMA_RING_MASK;
        }

        self.err1 -= self.err1 >> PDM_LEAKAGE_SHIFT;
        self.err2 -= self.err2 >> PDM_LEAKAGE_SHIFT;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_balanced_duty_cycle() {
        // spec.md §8 scenario 1: PDM output is a balanced stream, not
        // latched high or low.
        let mut m = PdmModulator::new(1);
        for _ in 0..2000 {
            m.process_sample(0, false);
        }
        let mut ones: u32 = 0;
        for i in 0..PDM_DMA_RING_WORDS {
            ones += m.word_at(i).count_ones();
        }
        let total_bits = (PDM_DMA_RING_WORDS * 32) as u32;
        let ratio = ones as f64 / total_bits as f64;
        assert!((ratio - 0.5).abs() < 0.05, "duty cycle {ratio} not near 50%");
    }

    #[test]
    fn full_scale_input_keeps_bounded_integrators() {
        // spec.md §8: input held at +PDM_CLIP_THRESH for one second produces
        // bounded integrator magnitudes. One second at 48 kHz is 48000
        // samples; leakage (L=16) must keep the integrators from latching.
        let mut m = PdmModulator::new(2);
        for _ in 0..48_000 {
            m.process_sample(PDM_CLIP_THRESH, false);
        }
        let (err1, err2) = m.integrator_state();
        assert!(err1.abs() < (1i64 << 24), "err1 = {err1}");
        assert!(err2.abs() < (1i64 << 24), "err2 = {err2}");
    }

    #[test]
    fn limiter_clamps_beyond_threshold() {
        let mut a = PdmModulator::new(3);
        let mut b = PdmModulator::new(3);
        a.process_sample(PDM_CLIP_THRESH * 4, false);
        b.process_sample(PDM_CLIP_THRESH, false);
        assert_eq!(a.integrator_state(), b.integrator_state());
    }

    #[test]
    fn reset_flag_zeros_integrators() {
        let mut m = PdmModulator::new(4);
        for _ in 0..100 {
            m.process_sample(PDM_CLIP_THRESH, false);
        }
        assert_ne!(m.integrator_state(), (0, 0));
        m.process_sample(0, true);
        // Leakage runs after the reset-then-modulate step, so state won't be
        // exactly zero, but it must have collapsed from the driven value.
        let (err1, err2) = m.integrator_state();
        assert!(err1.abs() < (1i64 << 20));
        assert!(err2.abs() < (1i64 << 20));
    }

    #[test]
    fn underrun_recovery_reanchors_write_pointer() {
        let mut m = PdmModulator::new(5);
        for _ in 0..100 {
            m.process_sample(PDM_CLIP_THRESH, false);
        }
        let read_index = (m.write_index() + PDM_DMA_RING_WORDS / 2 + 1) & PDM_DMA_RING_MASK;
        assert!(m.recover_if_underrun(read_index));
        assert_eq!(m.integrator_state(), (0, 0));
        let expected_lead = PDM_TARGET_LEAD_SAMPLES * PDM_WORDS_PER_SAMPLE;
        assert_eq!(m.lead_words(read_index), expected_lead & PDM_DMA_RING_MASK);
    }

    #[test]
    fn adequate_lead_does_not_trigger_recovery() {
        let mut m = PdmModulator::new(6);
        m.process_sample(0, false);
        let read_index = m.write_index().wrapping_sub(1) & PDM_DMA_RING_MASK;
        assert!(!m.recover_if_underrun(read_index));
    }
}
