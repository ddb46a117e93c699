#![cfg_attr(not(test), no_std)]
//! RP2040 dual-core USB Audio Class sound card with an on-device DSP
//! engine. `dsp` is plain `no_std` logic exercised by host tests; `hw` is
//! the PIO/DMA/multicore glue that only runs as real firmware (see
//! `src/main.rs`).

pub mod dsp;
pub mod hw;
