//! S/PDIF transport: PIO bit-banger plus the DMA-fed buffer pool (spec.md
//! §4.3, §6). The buffer pool is plain array/index bookkeeping with no
//! hardware types, so it is exercised by host tests the way the rest of
//! `dsp::*` is; only [`SpdifOutputDriver`] below touches `rp2040_hal`.
//!
//! Transport shape is the teacher's own `src/main.rs` DMA chaining idiom
//! (`single_buffer::Config` to prime two buffers, then `double_buffer`
//! ping-pong via `read_next`), generalized from two fixed buffers to an
//! `SPDIF_POOL_DEPTH`-deep producer/consumer pool with a watermark.

use rp2040_hal as hal;

use hal::dma::{double_buffer, single_buffer, DMAExt};
use hal::pio::{PIOExt, PinDir, ShiftDirection, StateMachineIndex};

use crate::dsp::config::{SPDIF_BLOCK_SAMPLES, SPDIF_POOL_DEPTH, SPDIF_WATERMARK};
use crate::dsp::spdif::SpdifEncoder;

/// One encoded block: `SPDIF_BLOCK_SAMPLES` stereo frames, 4 words each
/// (spec.md §4.3: "192 stereo samples = 384 subframes = ~3072 bytes").
pub type SpdifBlock = [u32; SPDIF_BLOCK_SAMPLES * 4];

/// A block of silence, with a correctly biphase-marked (but all-zero sample)
/// waveform, for the DMA IRQ to substitute on pool-empty underrun (spec.md
/// §4.3 "transmit a pre-encoded silence block and increment an underrun
/// counter"). Channel-status bits don't depend on sample value, so any rate
/// produces the same bit pattern here.
pub fn silence_block() -> SpdifBlock {
    let mut encoder = SpdifEncoder::new(48_000);
    let mut block = [0u32; SPDIF_BLOCK_SAMPLES * 4];
    for frame in block.chunks_exact_mut(4) {
        frame.copy_from_slice(&encoder.encode_frame(0, 0));
    }
    block
}

/// Producer/consumer handoff for `SPDIF_POOL_DEPTH` blocks (spec.md §3
/// "S/PDIF buffer pool"). The audio callback (producer) fills a free block
/// and submits it; the DMA IRQ (consumer) takes the next ready block, and
/// releases it back to the free list once the transfer completes.
///
/// Free and ready lists are each a fixed-capacity stack/queue of block
/// indices rather than the blocks themselves, so swapping which block is
/// "in flight" never moves 3 KiB of audio data.
pub struct SpdifPool {
    blocks: [SpdifBlock; SPDIF_POOL_DEPTH],
    free: [u8; SPDIF_POOL_DEPTH],
    free_len: usize,
    ready: [u8; SPDIF_POOL_DEPTH],
    ready_head: usize,
    ready_len: usize,
    underrun_count: u32,
}

impl SpdifPool {
    pub fn new() -> Self {
        let mut free = [0u8; SPDIF_POOL_DEPTH];
        for (i, slot) in free.iter_mut().enumerate() {
            *slot = i as u8;
        }
        Self {
            blocks: [[0u32; SPDIF_BLOCK_SAMPLES * 4]; SPDIF_POOL_DEPTH],
            free,
            free_len: SPDIF_POOL_DEPTH,
            ready: [0u8; SPDIF_POOL_DEPTH],
            ready_head: 0,
            ready_len: 0,
            underrun_count: 0,
        }
    }

    pub fn free_count(&self) -> usize {
        self.free_len
    }

    /// Below this many free blocks the producer should slow down / the
    /// caller should treat the pool as saturated (spec.md §3 "watermark of
    /// four free buffers separates callback and DMA").
    pub fn below_watermark(&self) -> bool {
        self.free_len < SPDIF_WATERMARK
    }

    /// Producer: claim a free block index to encode into.
    pub fn acquire_for_fill(&mut self) -> Option<usize> {
        if self.free_len == 0 {
            return None;
        }
        self.free_len -= 1;
        Some(self.free[self.free_len] as usize)
    }

    pub fn block_mut(&mut self, idx: usize) -> &mut SpdifBlock {
        &mut self.blocks[idx]
    }

    pub fn block(&self, idx: usize) -> &SpdifBlock {
        &self.blocks[idx]
    }

    /// Producer: hand a filled block to the consumer.
    pub fn submit_ready(&mut self, idx: usize) {
        let slot = (self.ready_head + self.ready_len) % SPDIF_POOL_DEPTH;
        self.ready[slot] = idx as u8;
        self.ready_len += 1;
    }

    /// Consumer: take the next block to transmit, if any are ready. Returns
    /// `None` when the pool is empty; the caller substitutes
    /// [`silence_block`] and counts an underrun.
    pub fn take_ready(&mut self) -> Option<usize> {
        if self.ready_len == 0 {
            return None;
        }
        let idx = self.ready[self.ready_head];
        self.ready_head = (self.ready_head + 1) % SPDIF_POOL_DEPTH;
        self.ready_len -= 1;
        Some(idx as usize)
    }

    /// Consumer: release a finished block back to the free list.
    pub fn release(&mut self, idx: usize) {
        self.free[self.free_len] = idx as u8;
        self.free_len += 1;
    }

    pub fn note_underrun(&mut self) {
        self.underrun_count = self.underrun_count.saturating_add(1);
    }

    pub fn underrun_count(&self) -> u32 {
        self.underrun_count
    }
}

impl Default for SpdifPool {
    fn default() -> Self {
        Self::new()
    }
}

/// PIO program: shift one bit per state machine cycle onto the output pin.
/// Each FIFO word already holds the literal biphase-mark line levels
/// (`SpdifEncoder::encode_frame`'s job), so unlike the teacher's I2S program
/// there is no side-set clock/word-select to generate here — the sample
/// clock *is* the PIO clock, divided to the target bit rate by
/// `clock_mgr::pio_divider`.
pub fn program() -> pio::Program<32> {
    pio_proc::pio_asm!(
        "
        .wrap_target
            out pins, 1
        .wrap
        "
    )
    .program
}

/// Owns the installed PIO state machine's TX FIFO and a double-buffered DMA
/// transfer cycling through the pool (spec.md §4.3 "Transport"). Generic
/// over the two DMA channels so a second instance (a second independent
/// S/PDIF output) can be built against different channels, per the
/// "multi-instance contract"; actual IRQ dispatch across instances is a
/// caller-owned registry (see module doc), not modeled here.
pub struct SpdifOutputDriver<CH1, CH2, TX> {
    transfer: Option<double_buffer::Transfer<CH1, CH2, &'static mut SpdifBlock, TX, double_buffer::ReadNext<&'static mut SpdifBlock>>>,
    /// In-flight half's pool index, so the next `service()` call knows which
    /// block to release once that transfer completes.
    in_flight_idx: Option<usize>,
    silence: &'static mut SpdifBlock,
}

impl<CH1, CH2, TX> SpdifOutputDriver<CH1, CH2, TX>
where
    CH1: hal::dma::SingleChannel,
    CH2: hal::dma::SingleChannel,
    TX: hal::dma::WriteTarget<TransmittedWord = u32>,
{
    /// Primes the DMA chain with the two buffers the teacher's `main.rs`
    /// also primes before entering the ping-pong loop, then starts it.
    /// `buf_a`/`buf_b` are pool-owned blocks already filled via `pool`
    /// (typically both the pool's silence content, at boot); their pool
    /// indices are `start_idx_a`/`start_idx_b`.
    pub fn new(
        ch1: CH1,
        ch2: CH2,
        tx: TX,
        buf_a: &'static mut SpdifBlock,
        buf_b: &'static mut SpdifBlock,
        start_idx_b: usize,
        silence: &'static mut SpdifBlock,
    ) -> Self {
        let first = single_buffer::Config::new(ch1, &mut *buf_a, tx).start();
        let (ch1, buf_a, tx) = first.wait();
        let transfer = double_buffer::Config::new((ch1, ch2), buf_a, tx).start().read_next(buf_b);
        Self { transfer: Some(transfer), in_flight_idx: Some(start_idx_b), silence }
    }

    /// Poll once per main-loop iteration. When the in-flight half completes,
    /// releases the drained block back to `pool` and queues the next ready
    /// block (or the silence block on pool-empty underrun, which is
    /// transmitted without being considered "in flight" for release
    /// purposes).
    pub fn service(&mut self, pool: &mut SpdifPool) {
        let transfer = match self.transfer.take() {
            Some(t) => t,
            None => return,
        };
        if !transfer.is_done() {
            self.transfer = Some(transfer);
            return;
        }
        let (finished_buf, next_transfer) = transfer.wait();
        if let Some(idx) = self.in_flight_idx.take() {
            pool.release(idx);
        }

        match pool.take_ready() {
            Some(idx) => {
                // SAFETY: `pool` lives in a `cortex_m::singleton!`-allocated
                // static for the life of the program; the borrow checker
                // only sees the shorter lifetime of the `&mut SpdifPool`
                // parameter above.
                let next_buf: &'static mut SpdifBlock =
                    unsafe { core::mem::transmute::<&mut SpdifBlock, &'static mut SpdifBlock>(pool.block_mut(idx)) };
                self.in_flight_idx = Some(idx);
                self.transfer = Some(next_transfer.read_next(next_buf));
                // `finished_buf` becomes the next free-standing scratch
                // buffer; stash it by swapping it into `silence`'s slot is
                // unnecessary since `silence` is a separate static — drop
                // it back into the pool's keeping by overwriting the
                // now-unused local, matching the teacher's `next_buf`/
                // `tx_buf` swap in `main.rs`.
                let _ = finished_buf;
            }
            None => {
                pool.note_underrun();
                self.in_flight_idx = None;
                self.transfer = Some(next_transfer.read_next(&mut *self.silence));
                let _ = finished_buf;
            }
        }
    }
}

/// Install `program()` into `sm`'s PIO block and configure it for the
/// S/PDIF bit clock (spec.md §4.3 "Rate change"). `div_int`/`div_frac` come
/// from `clock_mgr::pio_divider(sys_clk_hz, rate_hz * 64)` — 64 bit-cells
/// per stereo frame (32 per subframe, two subframes). Mirrors the teacher's
/// own `pio.install(...)` then `PIOBuilder::from_program(installed)` call
/// shape in `main.rs`, generalized over which PIO block/state machine the
/// caller picked.
pub fn configure_state_machine<P: PIOExt, SM: StateMachineIndex>(
    pio: &mut hal::pio::PIO<P>,
    sm: hal::pio::UninitStateMachine<(P, SM)>,
    out_pin: u8,
    div_int: u16,
    div_frac: u8,
) -> (hal::pio::StateMachine<(P, SM), hal::pio::Stopped>, hal::pio::Tx<(P, SM)>) {
    let installed = pio.install(&program()).expect("spdif program fits the PIO instruction memory");
    let (mut sm, _rx, tx) = hal::pio::PIOBuilder::from_program(installed)
        .out_pins(out_pin, 1)
        .clock_divisor_fixed_point(div_int, div_frac)
        .out_shift_direction(ShiftDirection::Left)
        .pull_threshold(32)
        .autopull(true)
        .build(sm);
    sm.set_pindirs([(out_pin, PinDir::Output)]);
    (sm, tx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_starts_full_and_free_count_matches_depth() {
        let pool = SpdifPool::new();
        assert_eq!(pool.free_count(), SPDIF_POOL_DEPTH);
        assert!(!pool.below_watermark());
    }

    #[test]
    fn fill_submit_take_release_round_trips_index() {
        let mut pool = SpdifPool::new();
        let idx = pool.acquire_for_fill().unwrap();
        pool.block_mut(idx)[0] = 0xDEAD_BEEF;
        pool.submit_ready(idx);
        let taken = pool.take_ready().unwrap();
        assert_eq!(taken, idx);
        assert_eq!(pool.block(taken)[0], 0xDEAD_BEEF);
        pool.release(taken);
        assert_eq!(pool.free_count(), SPDIF_POOL_DEPTH);
    }

    #[test]
    fn exhausting_free_list_reaches_watermark_then_empty() {
        let mut pool = SpdifPool::new();
        for _ in 0..(SPDIF_POOL_DEPTH - SPDIF_WATERMARK) {
            pool.acquire_for_fill().unwrap();
        }
        assert!(!pool.below_watermark());
        pool.acquire_for_fill().unwrap();
        assert!(pool.below_watermark());
        for _ in 0..SPDIF_WATERMARK + 1 {
            pool.acquire_for_fill();
        }
        assert!(pool.acquire_for_fill().is_none());
    }

    #[test]
    fn take_ready_on_empty_pool_reports_none_for_underrun_substitution() {
        let mut pool = SpdifPool::new();
        assert!(pool.take_ready().is_none());
        pool.note_underrun();
        assert_eq!(pool.underrun_count(), 1);
    }

    #[test]
    fn silence_block_is_not_all_zero_bits() {
        // The encoded waveform carries preamble/parity transitions even for
        // silent samples; it must not literally be all-zero words.
        let block = silence_block();
        assert!(block.iter().any(|w| *w != 0));
    }
}
