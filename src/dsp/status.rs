//! Status read-back: peak meters, CPU load, and the counters surfaced by the
//! vendor status request (spec.md §4.2 "Peak metering"/"CPU load metering",
//! §6 "Status read-back").

use crate::dsp::channel::ChannelId;
use crate::dsp::numeric::{to_f32, Sample};

/// Per-packet peak envelope across the five observation points (spec.md
/// §4.2: "master L, master R, out L, out R, out Sub").
#[derive(Debug, Clone, Copy, Default)]
pub struct PeakMeter {
    peaks: [f32; 5],
}

impl PeakMeter {
    pub fn new() -> Self {
        Self { peaks: [0.0; 5] }
    }

    /// Start a new packet's measurement window.
    pub fn reset(&mut self) {
        self.peaks = [0.0; 5];
    }

    #[inline]
    pub fn observe(&mut self, point: ChannelId, x: Sample) {
        let idx = ChannelId::ALL.iter().position(|c| *c == point).unwrap();
        let mag = to_f32(x).abs();
        if mag > self.peaks[idx] {
            self.peaks[idx] = mag;
        }
    }

    pub fn peak(&self, point: ChannelId) -> f32 {
        let idx = ChannelId::ALL.iter().position(|c| *c == point).unwrap();
        self.peaks[idx]
    }

    /// Peak scaled to the s16 full-scale range used by the status word
    /// (spec.md §8 scenario 2: "peak meter reports >=32700 for master L/R").
    pub fn peak_s16(&self, point: ChannelId) -> u16 {
        (self.peak(point).clamp(0.0, 1.0) * 32767.0) as u16
    }
}

/// Timestamps packet entry/exit and publishes `(end - start)/10` as a
/// percent-ish byte (spec.md §4.2 "CPU load metering").
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuLoadMeter {
    entry_us: u64,
    last_load_pct: u8,
}

impl CpuLoadMeter {
    pub fn new() -> Self {
        Self { entry_us: 0, last_load_pct: 0 }
    }

    pub fn enter(&mut self, now_us: u64) {
        self.entry_us = now_us;
    }

    /// `budget_us` is the nominal time available for one packet (1000 us for
    /// a 1 ms USB isochronous interval). Returns the published load byte.
    pub fn exit(&mut self, now_us: u64, budget_us: u64) -> u8 {
        let elapsed = now_us.saturating_sub(self.entry_us);
        let pct = if budget_us == 0 { 0 } else { (elapsed * 100 / budget_us).min(255) };
        self.last_load_pct = pct as u8;
        self.last_load_pct
    }

    pub fn last(&self) -> u8 {
        self.last_load_pct
    }
}

/// Sub-indices for the status read-back vendor request (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum StatusSelector {
    /// 4 bytes: one peak envelope per channel request, 0-4 selects channel.
    PeakEnvelope(ChannelId),
    /// 4 bytes: Core A/B CPU load, packed as two bytes + padding.
    CpuLoad,
    /// 4 bytes: ring/DMA overrun+underrun counters, packed as u16 pairs.
    RingCounters,
    /// 4 bytes: current sample rate in Hz / 100 (fits u16 for all 3 rates).
    SampleRate,
    /// 12 bytes: sample rate (4) + system clock Hz (4) + temperature
    /// millidegrees C (4), the one wide selector (spec.md §6).
    SystemInfo,
}

/// Snapshot of everything the status request can surface (spec.md §6).
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusBlock {
    pub peaks_s16: [u16; 5],
    pub core_a_load_pct: u8,
    pub core_b_load_pct: u8,
    pub ring_overruns: u32,
    pub ring_underruns: u32,
    pub packet_overruns: u32,
    pub packet_underruns: u32,
    pub sample_rate_hz: u32,
    pub system_clock_hz: u32,
    pub temperature_millidegrees_c: i32,
}

impl StatusBlock {
    /// Encode one selector's worth of status bytes (4 or 12, little-endian),
    /// written into `out`. Returns the number of bytes written.
    pub fn encode(&self, selector: StatusSelector, out: &mut [u8; 12]) -> usize {
        match selector {
            StatusSelector::PeakEnvelope(ch) => {
                let idx = ChannelId::ALL.iter().position(|c| *c == ch).unwrap();
                out[0..2].copy_from_slice(&self.peaks_s16[idx].to_le_bytes());
                out[2] = 0;
                out[3] = 0;
                4
            }
            StatusSelector::CpuLoad => {
                out[0] = self.core_a_load_pct;
                out[1] = self.core_b_load_pct;
                out[2] = 0;
                out[3] = 0;
                4
            }
            StatusSelector::RingCounters => {
                out[0..2].copy_from_slice(&(self.ring_overruns.min(0xFFFF) as u16).to_le_bytes());
                out[2..4].copy_from_slice(&(self.ring_underruns.min(0xFFFF) as u16).to_le_bytes());
                4
            }
            StatusSelector::SampleRate => {
                out[0..4].copy_from_slice(&self.sample_rate_hz.to_le_bytes());
                4
            }
            StatusSelector::SystemInfo => {
                out[0..4].copy_from_slice(&self.sample_rate_hz.to_le_bytes());
                out[4..8].copy_from_slice(&self.system_clock_hz.to_le_bytes());
                out[8..12].copy_from_slice(&self.temperature_millidegrees_c.to_le_bytes());
                12
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::numeric::from_f32;

    #[test]
    fn peak_meter_tracks_maximum_magnitude_per_point() {
        let mut m = PeakMeter::new();
        m.observe(ChannelId::MasterL, from_f32(0.2));
        m.observe(ChannelId::MasterL, from_f32(-0.9));
        m.observe(ChannelId::MasterL, from_f32(0.5));
        assert!((m.peak(ChannelId::MasterL) - 0.9).abs() < 1e-4);
        assert_eq!(m.peak(ChannelId::MasterR), 0.0);
    }

    #[test]
    fn peak_meter_resets_between_packets() {
        let mut m = PeakMeter::new();
        m.observe(ChannelId::OutL, from_f32(0.7));
        m.reset();
        assert_eq!(m.peak(ChannelId::OutL), 0.0);
    }

    #[test]
    fn full_scale_peak_maps_near_int16_max() {
        let mut m = PeakMeter::new();
        m.observe(ChannelId::Sub, from_f32(0.999));
        assert!(m.peak_s16(ChannelId::Sub) >= 32700);
    }

    #[test]
    fn cpu_load_meter_computes_percent_ish_byte() {
        let mut m = CpuLoadMeter::new();
        m.enter(0);
        let pct = m.exit(500, 1000);
        assert_eq!(pct, 50);
        assert_eq!(m.last(), 50);
    }

    #[test]
    fn status_block_system_info_round_trips_fields() {
        let status = StatusBlock {
            sample_rate_hz: 48_000,
            system_clock_hz: 125_000_000,
            temperature_millidegrees_c: 32_500,
            ..Default::default()
        };
        let mut buf = [0u8; 12];
        let n = status.encode(StatusSelector::SystemInfo, &mut buf);
        assert_eq!(n, 12);
        assert_eq!(u32::from_le_bytes(buf[0..4].try_into().unwrap()), 48_000);
        assert_eq!(u32::from_le_bytes(buf[4..8].try_into().unwrap()), 125_000_000);
        assert_eq!(i32::from_le_bytes(buf[8..12].try_into().unwrap()), 32_500);
    }

    #[test]
    fn status_block_narrow_selectors_return_four_bytes() {
        let status = StatusBlock::default();
        let mut buf = [0u8; 12];
        assert_eq!(status.encode(StatusSelector::CpuLoad, &mut buf), 4);
        assert_eq!(status.encode(StatusSelector::RingCounters, &mut buf), 4);
        assert_eq!(status.encode(StatusSelector::SampleRate, &mut buf), 4);
    }
}
