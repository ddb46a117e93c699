//! Boundary types shared with the external USB descriptor/enumeration
//! machinery and the vendor control-request parser (spec.md §1 "Out of
//! scope", §6). Neither of those lives in this crate; this module only
//! names the shapes that cross the boundary so the DSP engine can stay
//! ignorant of how they arrive on the wire.

use crate::dsp::control::EqUpdateRequest;
use crate::dsp::crossfeed::CrossfeedPreset;
use crate::dsp::channel::ChannelId;
use crate::dsp::status::StatusSelector;

/// One decoded vendor control transfer, already parsed from endpoint-zero
/// bytes by the external request parser (spec.md §6 "vendor control
/// interface"). The engine only ever sees these, never raw `bRequest`
/// bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlEvent {
    SetRateHz(u32),
    SetPreampDb(f32),
    SetEqBypass { channel: ChannelId, bypass: bool },
    SetEqBand(EqUpdateRequest),
    SetChannelGainDb { channel: ChannelId, gain_db: f32 },
    SetChannelMute { channel: ChannelId, mute: bool },
    SetChannelDelayMs { channel: ChannelId, delay_ms: f32 },
    SetLoudnessEnabled(bool),
    SetLoudnessReferenceSplDb(f32),
    SetCrossfeedEnabled(bool),
    SetCrossfeedPreset(CrossfeedPreset),
    SetMasterVolumeStep(u8),
    SetMasterMute(bool),
    RequestStatus(StatusSelector),
    SaveParameters,
    FactoryReset,
}

/// Byte codes the vendor request parser decodes into `ControlEvent`
/// (spec.md §6: "Each request is identified by a byte code"). Assigning
/// these here, rather than in the external parser, keeps one definition
/// shared by both sides of the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum VendorRequestCode {
    SetRate = 0x01,
    SetPreamp = 0x02,
    SetEqBypass = 0x03,
    SetEqBand = 0x04,
    SetChannelGain = 0x05,
    SetChannelMute = 0x06,
    SetChannelDelay = 0x07,
    SetLoudnessEnabled = 0x08,
    SetLoudnessReference = 0x09,
    SetCrossfeedEnabled = 0x0A,
    SetCrossfeedPreset = 0x0B,
    SetMasterVolume = 0x0C,
    SetMasterMute = 0x0D,
    GetStatus = 0x0E,
    SaveParameters = 0x0F,
    FactoryReset = 0x10,
}

/// Sink the Feedback Transmitter pushes its 10.14 fixed-point
/// samples-per-frame estimate into (spec.md §4.6, "Isochronous IN
/// endpoint"). Implemented by the external USB stack; the engine only
/// calls `send`.
pub trait FeedbackSink {
    /// `value_q14` is already the signed 10.14 fixed-point code the isochronous
    /// IN endpoint transmits verbatim.
    fn send(&mut self, value_q14: i32);
}

/// No-op sink for host-side tests and for packets produced before the USB
/// stack reports the IN endpoint as armed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFeedbackSink;

impl FeedbackSink for NullFeedbackSink {
    fn send(&mut self, _value_q14: i32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_request_codes_are_distinct() {
        let codes = [
            VendorRequestCode::SetRate,
            VendorRequestCode::SetPreamp,
            VendorRequestCode::SetEqBypass,
            VendorRequestCode::SetEqBand,
            VendorRequestCode::SetChannelGain,
            VendorRequestCode::SetChannelMute,
            VendorRequestCode::SetChannelDelay,
            VendorRequestCode::SetLoudnessEnabled,
            VendorRequestCode::SetLoudnessReference,
            VendorRequestCode::SetCrossfeedEnabled,
            VendorRequestCode::SetCrossfeedPreset,
            VendorRequestCode::SetMasterVolume,
            VendorRequestCode::SetMasterMute,
            VendorRequestCode::GetStatus,
            VendorRequestCode::SaveParameters,
            VendorRequestCode::FactoryReset,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in codes[i + 1..].iter() {
                assert_ne!(*a as u8, *b as u8);
            }
        }
    }

    #[test]
    fn null_feedback_sink_accepts_any_value() {
        let mut sink = NullFeedbackSink;
        sink.send(i32::MIN);
        sink.send(i32::MAX);
    }
}
