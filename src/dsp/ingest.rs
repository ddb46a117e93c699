//! Audio Ingest: per-isochronous-packet gap handling and counters (spec.md
//! §4.1).

use crate::dsp::config::{
    MAX_PACKET_SAMPLES, MIN_PACKET_SAMPLES, PACKET_GAP_RESET_MS, PACKET_GAP_UNDERRUN_MS,
};

/// What the caller should do with this packet, returned by `on_packet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapAction {
    /// Ordinary packet, no gap handling needed.
    Normal,
    /// Gap was 2-50 ms: counted as an underrun, no epoch reset.
    Underrun,
    /// Gap exceeded 50 ms: drift state reset, S/PDIF pool should be
    /// pre-filled with silence, and this packet starts a new drift epoch.
    StreamReset,
}

/// Monotonic counters surfaced via status read-back (spec.md §4.1, §6).
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestCounters {
    pub packets: u32,
    pub overruns: u32,
    pub underruns: u32,
    pub resets: u32,
}

pub struct AudioIngest {
    last_packet_us: Option<u64>,
    counters: IngestCounters,
}

impl AudioIngest {
    pub fn new() -> Self {
        Self { last_packet_us: None, counters: IngestCounters::default() }
    }

    pub fn counters(&self) -> IngestCounters {
        self.counters
    }

    /// Clamp an untrusted packet sample count to the supported range
    /// (spec.md §4.1: "N stereo s16 samples, N in [32,96]").
    pub fn clamp_sample_count(n: usize) -> usize {
        n.clamp(MIN_PACKET_SAMPLES, MAX_PACKET_SAMPLES)
    }

    /// Call once per isochronous OUT packet, before handing it to the DSP
    /// Pipeline. Returns what gap handling, if any, applies.
    pub fn on_packet(&mut self, now_us: u64) -> GapAction {
        self.counters.packets += 1;

        let action = match self.last_packet_us {
            None => GapAction::StreamReset,
            Some(prev) => {
                let gap_ms = now_us.saturating_sub(prev) / 1000;
                if gap_ms > PACKET_GAP_RESET_MS as u64 {
                    GapAction::StreamReset
                } else if gap_ms >= PACKET_GAP_UNDERRUN_MS as u64 {
                    GapAction::Underrun
                } else {
                    GapAction::Normal
                }
            }
        };

        match action {
            GapAction::StreamReset => self.counters.resets += 1,
            GapAction::Underrun => self.counters.underruns += 1,
            GapAction::Normal => {}
        }

        self.last_packet_us = Some(now_us);
        action
    }

    pub fn note_overrun(&mut self) {
        self.counters.overruns += 1;
    }
}

impl Default for AudioIngest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_packet_is_a_stream_reset() {
        let mut ingest = AudioIngest::new();
        assert_eq!(ingest.on_packet(0), GapAction::StreamReset);
        assert_eq!(ingest.counters().resets, 1);
    }

    #[test]
    fn tight_packets_are_normal() {
        let mut ingest = AudioIngest::new();
        ingest.on_packet(0);
        assert_eq!(ingest.on_packet(1_000), GapAction::Normal);
        assert_eq!(ingest.counters().packets, 2);
    }

    #[test]
    fn two_to_fifty_ms_gap_is_underrun() {
        let mut ingest = AudioIngest::new();
        ingest.on_packet(0);
        assert_eq!(ingest.on_packet(10_000), GapAction::Underrun);
        assert_eq!(ingest.counters().underruns, 1);
    }

    #[test]
    fn over_fifty_ms_gap_is_stream_reset() {
        let mut ingest = AudioIngest::new();
        ingest.on_packet(0);
        assert_eq!(ingest.on_packet(60_000), GapAction::StreamReset);
        assert_eq!(ingest.counters().resets, 2);
    }

    #[test]
    fn sample_count_is_clamped_to_supported_range() {
        assert_eq!(AudioIngest::clamp_sample_count(0), MIN_PACKET_SAMPLES);
        assert_eq!(AudioIngest::clamp_sample_count(1000), MAX_PACKET_SAMPLES);
        assert_eq!(AudioIngest::clamp_sample_count(48), 48);
    }

    #[test]
    fn overrun_counter_is_independent_of_gap_tracking() {
        let mut ingest = AudioIngest::new();
        ingest.note_overrun();
        ingest.note_overrun();
        assert_eq!(ingest.counters().overruns, 2);
    }
}
