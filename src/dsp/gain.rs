//! Per-channel gain/mute and the master-volume dB-to-linear lookup table
//! (spec.md §3, §4.2 steps 8-9, §6).

use micromath::F32Ext;

use crate::dsp::config::VOLUME_STEPS;
use crate::dsp::numeric::{from_f32, to_f32, Sample};

/// Linear gain plus mute for one output channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelGain {
    linear: f32,
    pub mute: bool,
}

impl ChannelGain {
    pub fn new() -> Self {
        Self { linear: 1.0, mute: false }
    }

    pub fn set_gain_db(&mut self, gain_db: f32) {
        self.linear = 10f32.powf(gain_db.clamp(-60.0, 24.0) / 20.0);
    }

    #[inline]
    pub fn apply(&self, x: Sample) -> Sample {
        if self.mute {
            from_f32(0.0)
        } else {
            from_f32(to_f32(x) * self.linear)
        }
    }
}

impl Default for ChannelGain {
    fn default() -> Self {
        Self::new()
    }
}

/// 91-entry dB-step-to-linear-multiplier table for master volume (spec.md
/// §3/§6: "a 91-entry lookup mapping integer dB steps to linear gain").
/// Step `VOLUME_STEPS - 1` is 0 dB (unity); each step below is 1 dB down,
/// reaching -90 dB (effectively silent) at step 0.
pub struct MasterVolumeTable {
    linear: [f32; VOLUME_STEPS],
}

impl MasterVolumeTable {
    pub fn new() -> Self {
        let mut linear = [0.0f32; VOLUME_STEPS];
        for (step, slot) in linear.iter_mut().enumerate() {
            let db = (step as i32 - (VOLUME_STEPS as i32 - 1)) as f32; // 0 .. -90
            *slot = 10f32.powf(db / 20.0);
        }
        Self { linear }
    }

    pub fn linear_for_step(&self, step: usize) -> f32 {
        self.linear[step.min(VOLUME_STEPS - 1)]
    }
}

impl Default for MasterVolumeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Master volume state: the current step/code and the resolved multiplier
/// (spec.md §3 "Audio state": `master_volume_code`, `mute`, `vol_multiplier`).
pub struct MasterVolume {
    table: MasterVolumeTable,
    step: usize,
    pub mute: bool,
    multiplier: f32,
}

impl MasterVolume {
    pub fn new() -> Self {
        let table = MasterVolumeTable::new();
        let step = VOLUME_STEPS - 1;
        let multiplier = table.linear_for_step(step);
        Self { table, step, mute: false, multiplier }
    }

    pub fn set_step(&mut self, step: usize) {
        self.step = step.min(VOLUME_STEPS - 1);
        self.multiplier = self.table.linear_for_step(self.step);
    }

    pub fn step(&self) -> usize {
        self.step
    }

    #[inline]
    pub fn apply(&self, x: Sample) -> Sample {
        if self.mute {
            from_f32(0.0)
        } else {
            from_f32(to_f32(x) * self.multiplier)
        }
    }
}

impl Default for MasterVolume {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_step_is_unity_gain() {
        let table = MasterVolumeTable::new();
        let unity = table.linear_for_step(VOLUME_STEPS - 1);
        assert!((unity - 1.0).abs() < 1e-4);
    }

    #[test]
    fn muted_channel_emits_zero() {
        let mut ch = ChannelGain::new();
        ch.mute = true;
        let y = ch.apply(from_f32(0.8));
        assert_eq!(to_f32(y), 0.0);
    }

    #[test]
    fn muted_master_emits_zero() {
        let mut vol = MasterVolume::new();
        vol.mute = true;
        let y = vol.apply(from_f32(0.8));
        assert_eq!(to_f32(y), 0.0);
    }

    #[test]
    fn volume_steps_are_monotonic() {
        let table = MasterVolumeTable::new();
        for step in 1..VOLUME_STEPS {
            assert!(table.linear_for_step(step) >= table.linear_for_step(step - 1));
        }
    }
}
