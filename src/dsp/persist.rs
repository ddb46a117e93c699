//! Persisted parameter record: flash layout, CRC-32, load/save (spec.md §6,
//! §7; detailed in SPEC_FULL.md §11).
//!
//! The record is serialized by hand into a fixed-layout byte buffer rather
//! than transmuted from a `repr(C)` struct — keeps the wire format stable
//! across compiler/struct-layout changes and needs no `unsafe`.

use crate::dsp::channel::ChannelId;
use crate::dsp::config::MAX_MASTER_BANDS;
use crate::dsp::crossfeed::CrossfeedPreset;
use crate::dsp::filter_recipe::{FilterRecipe, FilterType};

pub const PARAM_MAGIC: u32 = 0x4453_5031; // "DSP1", little-endian byte order
pub const SCHEMA_VERSION: u16 = 1;

const FILTER_RECIPE_BYTES: usize = 1 + 4 + 4 + 4; // type tag + freq + q + gain
const CHANNEL_COUNT: usize = ChannelId::ALL.len();
const BANDS_BYTES: usize = CHANNEL_COUNT * MAX_MASTER_BANDS * FILTER_RECIPE_BYTES;
const BODY_BYTES: usize = 4 // preamp_db
    + CHANNEL_COUNT // eq bypass flags
    + BANDS_BYTES
    + CHANNEL_COUNT * 4 // gain_db
    + CHANNEL_COUNT // mute
    + CHANNEL_COUNT * 4 // delay_ms
    + 1 // loudness_enabled
    + 4 // loudness_reference_spl_db
    + 1 // crossfeed_enabled
    + 4 + 4; // crossfeed preset cutoff_hz, feed_db

pub const RECORD_BYTES: usize = 4 + 2 + 2 + 4 + BODY_BYTES;

/// Everything the flash sector holds besides the magic/version/CRC header
/// (spec.md §11 `ParamBody`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamBody {
    pub preamp_db: f32,
    pub eq_bypass: [bool; CHANNEL_COUNT],
    pub channel_bands: [[FilterRecipe; MAX_MASTER_BANDS]; CHANNEL_COUNT],
    pub channel_gain_db: [f32; CHANNEL_COUNT],
    pub channel_mute: [bool; CHANNEL_COUNT],
    pub channel_delay_ms: [f32; CHANNEL_COUNT],
    pub loudness_enabled: bool,
    pub loudness_reference_spl_db: f32,
    pub crossfeed_enabled: bool,
    pub crossfeed_preset: CrossfeedPreset,
}

impl ParamBody {
    pub fn factory_default() -> Self {
        Self {
            preamp_db: 0.0,
            eq_bypass: [false; CHANNEL_COUNT],
            channel_bands: [[FilterRecipe::flat(); MAX_MASTER_BANDS]; CHANNEL_COUNT],
            channel_gain_db: [0.0; CHANNEL_COUNT],
            channel_mute: [false; CHANNEL_COUNT],
            channel_delay_ms: [0.0; CHANNEL_COUNT],
            loudness_enabled: false,
            loudness_reference_spl_db: 83.0,
            crossfeed_enabled: false,
            crossfeed_preset: CrossfeedPreset::default(),
        }
    }

    fn write(&self, out: &mut [u8; BODY_BYTES]) {
        let mut i = 0;
        macro_rules! put {
            ($bytes:expr) => {{
                let b = $bytes;
                out[i..i + b.len()].copy_from_slice(&b);
                i += b.len();
            }};
        }

        put!(self.preamp_db.to_le_bytes());
        for flag in self.eq_bypass {
            out[i] = flag as u8;
            i += 1;
        }
        for bank in &self.channel_bands {
            for recipe in bank {
                out[i] = filter_type_tag(recipe.filter_type);
                i += 1;
                put!(recipe.freq_hz.to_le_bytes());
                put!(recipe.q_factor.to_le_bytes());
                put!(recipe.gain_db.to_le_bytes());
            }
        }
        for g in self.channel_gain_db {
            put!(g.to_le_bytes());
        }
        for m in self.channel_mute {
            out[i] = m as u8;
            i += 1;
        }
        for d in self.channel_delay_ms {
            put!(d.to_le_bytes());
        }
        out[i] = self.loudness_enabled as u8;
        i += 1;
        put!(self.loudness_reference_spl_db.to_le_bytes());
        out[i] = self.crossfeed_enabled as u8;
        i += 1;
        put!(self.crossfeed_preset.cutoff_hz.to_le_bytes());
        put!(self.crossfeed_preset.feed_db.to_le_bytes());

        debug_assert_eq!(i, BODY_BYTES);
    }

    fn read(buf: &[u8; BODY_BYTES]) -> Self {
        let mut i = 0;
        macro_rules! take4 {
            () => {{
                let v = f32::from_le_bytes(buf[i..i + 4].try_into().unwrap());
                i += 4;
                v
            }};
        }

        let preamp_db = take4!();

        let mut eq_bypass = [false; CHANNEL_COUNT];
        for flag in eq_bypass.iter_mut() {
            *flag = buf[i] != 0;
            i += 1;
        }

        let mut channel_bands = [[FilterRecipe::flat(); MAX_MASTER_BANDS]; CHANNEL_COUNT];
        for bank in channel_bands.iter_mut() {
            for recipe in bank.iter_mut() {
                let filter_type = filter_type_from_tag(buf[i]);
                i += 1;
                let freq_hz = take4!();
                let q_factor = take4!();
                let gain_db = take4!();
                *recipe = FilterRecipe { filter_type, freq_hz, q_factor, gain_db };
            }
        }

        let mut channel_gain_db = [0.0f32; CHANNEL_COUNT];
        for g in channel_gain_db.iter_mut() {
            *g = take4!();
        }

        let mut channel_mute = [false; CHANNEL_COUNT];
        for m in channel_mute.iter_mut() {
            *m = buf[i] != 0;
            i += 1;
        }

        let mut channel_delay_ms = [0.0f32; CHANNEL_COUNT];
        for d in channel_delay_ms.iter_mut() {
            *d = take4!();
        }

        let loudness_enabled = buf[i] != 0;
        i += 1;
        let loudness_reference_spl_db = take4!();
        let crossfeed_enabled = buf[i] != 0;
        i += 1;
        let cutoff_hz = take4!();
        let feed_db = take4!();

        debug_assert_eq!(i, BODY_BYTES);

        Self {
            preamp_db,
            eq_bypass,
            channel_bands,
            channel_gain_db,
            channel_mute,
            channel_delay_ms,
            loudness_enabled,
            loudness_reference_spl_db,
            crossfeed_enabled,
            crossfeed_preset: CrossfeedPreset { cutoff_hz, feed_db },
        }
    }
}

fn filter_type_tag(t: FilterType) -> u8 {
    match t {
        FilterType::Flat => 0,
        FilterType::Peaking => 1,
        FilterType::LowShelf => 2,
        FilterType::HighShelf => 3,
        FilterType::LowPass => 4,
        FilterType::HighPass => 5,
    }
}

fn filter_type_from_tag(tag: u8) -> FilterType {
    match tag {
        1 => FilterType::Peaking,
        2 => FilterType::LowShelf,
        3 => FilterType::HighShelf,
        4 => FilterType::LowPass,
        5 => FilterType::HighPass,
        _ => FilterType::Flat,
    }
}

/// CRC-32/ISO-HDLC, poly 0xEDB88320, reflected, initial/final XOR 0xFFFFFFFF
/// (spec.md §6, §11).
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

/// The on-flash record: magic, version, reserved padding, CRC, then the
/// serialized body (spec.md §11).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRecord {
    pub magic: u32,
    pub version: u16,
    pub crc32: u32,
    pub body: ParamBody,
}

impl ParamRecord {
    pub fn new(body: ParamBody) -> Self {
        let crc = crc32(&Self::body_bytes(&body));
        Self { magic: PARAM_MAGIC, version: SCHEMA_VERSION, crc32: crc, body }
    }

    fn body_bytes(body: &ParamBody) -> [u8; BODY_BYTES] {
        let mut buf = [0u8; BODY_BYTES];
        body.write(&mut buf);
        buf
    }

    /// Serialize into a page-aligned staging buffer ready for flash program
    /// (spec.md §6/§11 "Save").
    pub fn to_bytes(&self) -> [u8; RECORD_BYTES] {
        let mut out = [0u8; RECORD_BYTES];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..6].copy_from_slice(&self.version.to_le_bytes());
        out[6..8].copy_from_slice(&0u16.to_le_bytes());
        out[8..12].copy_from_slice(&self.crc32.to_le_bytes());
        out[12..].copy_from_slice(&Self::body_bytes(&self.body));
        out
    }

    /// Verify magic, version, and CRC-32; any mismatch is "no saved state"
    /// (spec.md §7 "Persistence errors") and the caller should fall back to
    /// `ParamBody::factory_default()`.
    pub fn from_bytes(buf: &[u8; RECORD_BYTES]) -> Option<Self> {
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != PARAM_MAGIC {
            return None;
        }
        let version = u16::from_le_bytes(buf[4..6].try_into().unwrap());
        if version != SCHEMA_VERSION {
            return None;
        }
        let stored_crc = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let body_bytes: [u8; BODY_BYTES] = buf[12..].try_into().unwrap();
        if crc32(&body_bytes) != stored_crc {
            return None;
        }
        Some(Self { magic, version, crc32: stored_crc, body: ParamBody::read(&body_bytes) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_matches_known_vector() {
        // Standard CRC-32/ISO-HDLC check value for the ASCII string "123456789".
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn save_then_load_round_trips_byte_identical_state() {
        // spec.md §8 round-trip law.
        let mut body = ParamBody::factory_default();
        body.preamp_db = -3.5;
        body.channel_gain_db[0] = 2.0;
        body.channel_mute[2] = true;
        body.crossfeed_enabled = true;
        body.crossfeed_preset = CrossfeedPreset { cutoff_hz: 900.0, feed_db: 4.0 };
        body.channel_bands[0][0] = FilterRecipe {
            filter_type: FilterType::Peaking,
            freq_hz: 1000.0,
            q_factor: 1.4,
            gain_db: 3.0,
        };

        let record = ParamRecord::new(body);
        let bytes = record.to_bytes();
        let loaded = ParamRecord::from_bytes(&bytes).expect("valid record");
        assert_eq!(loaded.body, body);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let record = ParamRecord::new(ParamBody::factory_default());
        let mut bytes = record.to_bytes();
        bytes[0] ^= 0xFF;
        assert!(ParamRecord::from_bytes(&bytes).is_none());
    }

    #[test]
    fn bad_version_is_rejected() {
        let record = ParamRecord::new(ParamBody::factory_default());
        let mut bytes = record.to_bytes();
        bytes[4] ^= 0xFF;
        assert!(ParamRecord::from_bytes(&bytes).is_none());
    }

    #[test]
    fn corrupted_body_fails_crc_check() {
        let record = ParamRecord::new(ParamBody::factory_default());
        let mut bytes = record.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(ParamRecord::from_bytes(&bytes).is_none());
    }
}
