//! Compile-time constants shared across the DSP pipeline.
//!
//! Sample rate, buffer depths and table sizes are fixed at build time, not
//! runtime-configurable beyond the documented rate list (see SPEC_FULL.md
//! #10.3 and spec.md #1 Non-goals).

/// Supported isochronous sample rates, Hz.
pub const SUPPORTED_RATES_HZ: [u32; 3] = [44_100, 48_000, 96_000];

/// Fallback rate when the host requests something unsupported (spec.md §7).
pub const DEFAULT_RATE_HZ: u32 = 44_100;

/// Maximum stereo samples carried by one USB isochronous OUT packet.
pub const MAX_PACKET_SAMPLES: usize = 96;
/// Minimum stereo samples carried by one USB isochronous OUT packet.
pub const MIN_PACKET_SAMPLES: usize = 32;

/// Up to 10 bands per master (input-side) EQ channel.
pub const MAX_MASTER_BANDS: usize = 10;
/// Up to 10 bands per output-side EQ channel (L/R), budget allows 2-10 for Sub.
pub const MAX_OUTPUT_BANDS: usize = 10;
/// Sub channel is budget-constrained to at least 2 bands.
pub const MIN_SUB_BANDS: usize = 2;
/// This build's Sub EQ band count, within the `MIN_SUB_BANDS..=MAX_OUTPUT_BANDS`
/// platform budget (spec.md §3 "2-10 bands"). Sub doesn't need the full
/// 10-band budget L/R get; 4 low-shelf/peaking bands cover a crossover plus
/// room correction.
pub const SUB_BAND_COUNT: usize = 4;

const _: () = assert!(SUB_BAND_COUNT >= MIN_SUB_BANDS);
const _: () = assert!(SUB_BAND_COUNT <= MAX_OUTPUT_BANDS);

/// Delay line length per channel: 8192 samples, power of two (spec.md §3).
pub const DELAY_LINE_LEN: usize = 8192;
pub const DELAY_LINE_MASK: usize = DELAY_LINE_LEN - 1;
/// A channel delay must always leave at least one sample of headroom so the
/// read offset never collides with the write index (spec.md §3 invariant).
pub const MAX_DELAY_SAMPLES: usize = DELAY_LINE_LEN - 1;

/// PCM→PDM SPSC ring entries; 8-bit head/tail so wraparound is implicit.
pub const PCM_PDM_RING_LEN: usize = 256;

/// PDM DMA ring buffer, 32-bit words.
pub const PDM_DMA_RING_WORDS: usize = 2048;
pub const PDM_DMA_RING_MASK: usize = PDM_DMA_RING_WORDS - 1;
/// Samples synthesize to 8 words (256 bits) of oversampled PDM output.
pub const PDM_WORDS_PER_SAMPLE: usize = 8;
/// Oversampling ratio: 256x the PCM sample rate.
pub const PDM_OVERSAMPLE: u32 = 256;
/// Cushion, in PCM samples, the PDM loop tries to keep between its write
/// index and the DMA read pointer.
pub const PDM_TARGET_LEAD_SAMPLES: usize = 4;

/// S/PDIF buffer pool: eight buffers of 192 stereo samples (one block).
pub const SPDIF_POOL_DEPTH: usize = 8;
pub const SPDIF_BLOCK_SAMPLES: usize = 192;
/// Free-buffer watermark separating producer (callback) and consumer (DMA).
pub const SPDIF_WATERMARK: usize = 4;

/// 91 discrete master-volume steps (0..=90), spec.md §3/§6.
pub const VOLUME_STEPS: usize = 91;

/// PDM modulator clip threshold, ~90% of full Q16 scale (spec.md §4.5).
/// Stored in the same domain as the offset-centered 17-bit feedback target.
pub const PDM_CLIP_THRESH: i32 = 29491; // 0.9 * 32768, rounded

/// Leakage shift applied once per PCM sample to both integrators (spec.md §4.5).
pub const PDM_LEAKAGE_SHIFT: u32 = 16;

/// Interaural time delay modeled by the crossfeed allpass stage, in
/// microseconds (spec.md §3).
pub const CROSSFEED_ITD_US: u32 = 220;

/// Approximate added latency (in samples) of the S/PDIF buffering pipeline
/// and the PDM DMA ring, used to compute the Sub channel's automatic
/// alignment offset (spec.md §3).
pub const SPDIF_PIPELINE_LATENCY_SAMPLES: i32 = 384;
pub const PDM_PIPELINE_LATENCY_SAMPLES: i32 = 256;

/// Reference full-scale magnitude for s16 PCM.
pub const S16_FULL_SCALE: i32 = 32768;

/// Gap, in milliseconds, after which Audio Ingest treats a stream as having
/// stalled and resets drift tracking (spec.md §4.1).
pub const PACKET_GAP_RESET_MS: u32 = 50;
/// Lower bound, in milliseconds, of a gap counted as an underrun rather than
/// ordinary inter-packet jitter (spec.md §4.1).
pub const PACKET_GAP_UNDERRUN_MS: u32 = 2;

/// Drift correction is only trusted after this many microseconds of
/// continuous audio (spec.md §4.6).
pub const DRIFT_STABILIZE_US: u64 = 1_000_000;
/// Proportional drift-correction gain (spec.md §4.6, "hand-tuned").
pub const DRIFT_GAIN_Q16: i64 = 64; // empirically mild; see SPEC_FULL #9 note
/// Correction cap, in 10.14 fixed-point units (0.5 samples/frame).
pub const DRIFT_CORRECTION_CAP_Q14: i32 = 1 << 13; // 0.5 * 2^14

/// Critical sections protecting a coefficient-slot copy must complete well
/// under this many CPU cycles (spec.md §5 "critical section duration
/// budget" of < 10 us at 125 MHz sys clock).
pub const MAX_CRITICAL_SECTION_CYCLES: u32 = 1_250;
