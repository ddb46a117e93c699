//! PDM transport: PIO bit-banger plus the circular DMA ring feeding it
//! (spec.md §4.5, §6). Unlike the S/PDIF side, PDM has no block boundary —
//! a single DMA channel cycles through `PdmModulator`'s 2048-word ring
//! forever, re-triggering itself (`chain_to` pointing at its own config)
//! instead of ping-ponging between two buffers. Grounded on the teacher's
//! PIO-install/`PIOBuilder` idiom in `main.rs`, generalized from a
//! one-shot/double-buffer transfer to an indefinitely-repeating ring read.

use rp2040_hal as hal;

use hal::pac;
use hal::pio::{PIOExt, PinDir, ShiftDirection, StateMachineIndex};

use crate::dsp::config::{PDM_DMA_RING_MASK, PDM_DMA_RING_WORDS};

/// Backing storage for the DMA ring; owned by `PdmModulator` (spec.md §3
/// "PDM DMA ring"), re-exported here as the type the driver's ring-transfer
/// configuration borrows.
pub type PdmRingWords = [u32; PDM_DMA_RING_WORDS];

/// PIO program: shift one bit per cycle onto the PDM output pin, same
/// one-instruction loop as the S/PDIF program — the modulator has already
/// converted each sample into literal pin levels, so the PIO side is pure
/// bit-banging with no framing of its own.
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

/// Install `program()` and configure the state machine for the PDM bit
/// clock (spec.md §6: "1-bit stream on one GPIO at `rate * 256` Hz").
/// `div_int`/`div_frac` come from
/// `clock_mgr::pio_divider(sys_clk_hz, clock_mgr::pdm_bit_clock_hz(rate_hz))`.
pub fn configure_state_machine<P: PIOExt, SM: StateMachineIndex>(
    pio: &mut hal::pio::PIO<P>,
    sm: hal::pio::UninitStateMachine<(P, SM)>,
    out_pin: u8,
    div_int: u16,
    div_frac: u8,
) -> (hal::pio::StateMachine<(P, SM), hal::pio::Stopped>, hal::pio::Tx<(P, SM)>) {
    let installed = pio.install(&program()).expect("pdm program fits the PIO instruction memory");
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

/// PIO1 peripheral base address and its SM0 TX FIFO register offset
/// (RP2040 datasheet §2.7.2 register listing). PDM always drives PIO1
/// state machine 0 in this build (`configure_state_machine` is called with
/// `sm1`, PIO1's first state machine, in `main.rs`).
const PIO1_BASE: u32 = 0x5030_0000;
const PIO_TXF0_OFFSET: u32 = 0x10;
const PDM_TX_FIFO_ADDR: u32 = PIO1_BASE + PIO_TXF0_OFFSET;

/// DREQ number for PIO1 SM0's TX FIFO (RP2040 datasheet table 2.5.3: PIO0
/// TX0-3 are DREQs 0-3, PIO1 TX0-3 are DREQs 8-11).
const PDM_TX_DREQ: u32 = 8;

/// DMA channel dedicated to the PDM ring. Channels 0/1 drive the S/PDIF
/// ping-pong (`SpdifOutputDriver`); this is the next channel free.
pub const PDM_DMA_CHANNEL: usize = 2;

// `DMA_CHn_CTRL_TRIG`/`CH_AL1_CTRL` bit layout (RP2040 datasheet §2.5.3),
// built by hand rather than through PAC field builders so this doesn't
// depend on one particular svd2rust field-naming convention.
const CTRL_EN: u32 = 1 << 0;
const CTRL_DATA_SIZE_WORD: u32 = 0b10 << 2;
const CTRL_INCR_READ: u32 = 1 << 4;
const CTRL_RING_SEL_READ: u32 = 0 << 10;
const CTRL_RING_SIZE_SHIFT: u32 = 6;
const CTRL_CHAIN_TO_SHIFT: u32 = 11;
const CTRL_TREQ_SEL_SHIFT: u32 = 15;

/// Drives a DMA channel around `ring` forever, re-arming itself on
/// completion (spec.md §3 "A DMA channel cycles through it forever at the
/// PDM bit clock"). Uses the channel's own ring-wrap hardware
/// (`CH_AL1_CTRL.RING_SEL` = 0 wraps the read address, `RING_SIZE` set to
/// `log2(PDM_DMA_RING_WORDS * 4)` bytes) and `CHAIN_TO` pointed at its own
/// channel number, so the transfer repeats indefinitely with no software
/// re-triggering. `PdmModulator`'s `lead_words`/`recover_if_underrun`
/// accounting (spec.md §4.5 steps 1-2) stays the single source of truth for
/// how far ahead Core B has written; `current_read_index` below reads the
/// same channel's hardware read pointer back for that accounting.
pub struct PdmRingDriver {
    started: bool,
}

impl PdmRingDriver {
    pub fn new() -> Self {
        Self { started: false }
    }

    /// One-time start: point DMA channel `PDM_DMA_CHANNEL` at `ring`'s ring-
    /// wrapped read address and PIO1 SM0's TX FIFO as a fixed write address,
    /// and arm it for an unbounded transfer count. Idempotent.
    ///
    /// # Safety
    /// Must run at most once, after PIO1 SM0 is configured for PDM output
    /// and before anything reads DMA channel `PDM_DMA_CHANNEL`'s read
    /// pointer via `current_read_index`. No other code may touch that
    /// channel afterward.
    pub unsafe fn start(&mut self, ring: &'static PdmRingWords) {
        if self.started {
            return;
        }

        let dma = &*pac::DMA::PTR;
        let ch = &dma.ch[PDM_DMA_CHANNEL];
        let ring_size_log2_bytes = (PDM_DMA_RING_WORDS * core::mem::size_of::<u32>()).trailing_zeros();

        ch.ch_read_addr.write(|w| w.bits(ring.as_ptr() as u32));
        ch.ch_write_addr.write(|w| w.bits(PDM_TX_FIFO_ADDR));
        ch.ch_trans_count.write(|w| w.bits(u32::MAX));

        let ctrl = CTRL_EN
            | CTRL_DATA_SIZE_WORD
            | CTRL_INCR_READ
            | CTRL_RING_SEL_READ
            | (ring_size_log2_bytes << CTRL_RING_SIZE_SHIFT)
            | ((PDM_DMA_CHANNEL as u32) << CTRL_CHAIN_TO_SHIFT)
            | (PDM_TX_DREQ << CTRL_TREQ_SEL_SHIFT);
        ch.ch_al1_ctrl.write(|w| w.bits(ctrl));

        self.started = true;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl Default for PdmRingDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Current hardware read pointer into `ring`, as a word index (spec.md
/// §4.5 step 1: "observe DMA read index"). `ring` must be the same buffer
/// passed to `PdmRingDriver::start`.
pub fn current_read_index(ring: &'static PdmRingWords) -> usize {
    // SAFETY: only reads DMA channel PDM_DMA_CHANNEL's read-address
    // register; no peripheral state is mutated.
    let read_addr = unsafe { (*pac::DMA::PTR).ch[PDM_DMA_CHANNEL].ch_read_addr.read().bits() };
    let ring_base = ring.as_ptr() as u32;
    ((read_addr.wrapping_sub(ring_base)) / core::mem::size_of::<u32>() as u32) as usize & PDM_DMA_RING_MASK
}
