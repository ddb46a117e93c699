//! Platform-independent audio engine: ingest, the per-sample DSP pipeline,
//! the PCM->PDM handoff, the PDM modulator, S/PDIF encoding, the control
//! plane, and persistence. Everything here is `no_std` and exercised by
//! host-run unit tests; `crate::hw` wires it to actual RP2040 peripherals.

pub mod biquad;
pub mod channel;
pub mod clock_mgr;
pub mod config;
pub mod control;
pub mod crossfeed;
pub mod delay;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod filter_recipe;
pub mod gain;
pub mod ingest;
pub mod loudness;
pub mod modulator;
pub mod numeric;
pub mod pcm_pdm_queue;
pub mod persist;
pub mod spdif;
pub mod status;
pub mod usb_iface;
