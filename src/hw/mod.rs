//! Hardware-facing glue: PIO programs, DMA wiring, Core B bring-up and the
//! watchdog pet gate. Everything above this module (`dsp::*`) is plain
//! `no_std` logic exercised by host tests; everything in here touches
//! `rp2040_hal` types and is exercised only by running firmware.

pub mod multicore;
pub mod pdm_pio;
pub mod spdif_pio;
pub mod watchdog;
