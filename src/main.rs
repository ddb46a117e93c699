#![no_std]
#![no_main]

//! Boot sequence, clock/PIO/DMA wiring, and the Core A/Core B split (spec.md
//! §5 "Scheduling"). `main()` plays the role the teacher's `main()` plays —
//! clock init, PIO program install, DMA chain start, infinite loop — but
//! the loop body now drains the DSP engine's control plane and services the
//! S/PDIF DMA pool instead of generating a sawtooth/brown-noise test tone.
//!
//! The USB peripheral itself (enumeration, endpoint descriptors, vendor
//! request byte parsing) is the documented external boundary (spec.md §1
//! "Out of scope"; `dsp::usb_iface`) and is not wired here; `on_usb_packet`
//! and `on_vendor_control` are the two entry points an external USB stack is
//! expected to call.

use cortex_m::singleton;
use defmt_rtt as _;
use panic_probe as _;
use rp2040_hal as hal;

use hal::clocks::Clock;
use hal::dma::DMAExt;
use hal::fugit::RateExtU32;
use hal::gpio::{FunctionPio0, FunctionPio1};
use hal::pac;
use hal::pio::PIOExt;
use hal::Sio;

use pico_dsp_soundcard::dsp::clock_mgr::{pdm_bit_clock_hz, pio_divider, pll_for_family, PllConfig};
use pico_dsp_soundcard::dsp::config::{DEFAULT_RATE_HZ, PDM_TARGET_LEAD_SAMPLES, PDM_WORDS_PER_SAMPLE};
use pico_dsp_soundcard::dsp::control::EqUpdateRequest;
use pico_dsp_soundcard::dsp::engine::Engine;
use pico_dsp_soundcard::dsp::modulator::PdmModulator;
use pico_dsp_soundcard::dsp::numeric::to_f32;
use pico_dsp_soundcard::dsp::pcm_pdm_queue::PcmPdmQueue;
use pico_dsp_soundcard::dsp::usb_iface::{ControlEvent, FeedbackSink, NullFeedbackSink};
use pico_dsp_soundcard::hw::multicore::{start_core_b, tick};
use pico_dsp_soundcard::hw::pdm_pio;
use pico_dsp_soundcard::hw::spdif_pio;
use pico_dsp_soundcard::hw::watchdog::WatchdogGate;

/// The linker places this at the start of flash for the ROM bootloader
/// (unchanged from the teacher: `rp-pico`/other BSPs do this for you, this
/// crate doesn't pull one in, see DESIGN.md).
#[link_section = ".boot2"]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GENERIC_03H;

const XTAL_FREQ_HZ: u32 = 12_000_000u32;

/// Single-producer single-consumer handoff between Core A (producer) and
/// Core B (consumer), per spec.md §4.4. `static mut` rather than a
/// `Mutex`-wrapped `static` because the two sides are genuinely
/// lock-free/wait-free by construction (`PcmPdmQueue`'s own head/tail
/// atomics) — see its module doc for the ownership discipline each raw
/// pointer below relies on.
static mut PCM_PDM_QUEUE: PcmPdmQueue = PcmPdmQueue::new();

/// Copies `.ram_code`'s load image from flash to its run address in RAM
/// before anything else runs. `memory.x` gives that section `VMA=RAM,
/// LMA=FLASH`; `cortex-m-rt`'s default runtime only copies `.data`, not
/// custom sections, so the functions tagged `link_section = ".ram_code"`
/// (`dsp::modulator`, `hw::multicore::tick`) would otherwise execute
/// whatever garbage happens to be in RAM at their link address.
#[cortex_m_rt::pre_init]
unsafe fn copy_ram_code() {
    extern "C" {
        static mut _ram_code_start: u32;
        static mut _ram_code_end: u32;
        static _stored_ram_code_start: u32;
    }
    let start = &mut _ram_code_start as *mut u32;
    let end = &_ram_code_end as *const u32;
    let src = &_stored_ram_code_start as *const u32;
    let count = end.offset_from(start) as usize;
    core::ptr::copy_nonoverlapping(src, start, count);
}

/// Converts one clock-manager `PllConfig` into the type
/// `rp2040_hal::pll::setup_pll_blocking` expects.
fn to_hal_pll_config(cfg: PllConfig) -> hal::pll::PLLConfig {
    hal::pll::PLLConfig {
        vco_freq: cfg.vco_freq_hz.Hz(),
        refdiv: cfg.refdiv,
        post_div1: cfg.post_div1,
        post_div2: cfg.post_div2,
    }
}

/// Core B entry point: pop PCM samples produced by Core A, run them through
/// the sigma-delta modulator, and publish a heartbeat every iteration
/// (spec.md §4.5; SPEC_FULL.md §10.5). The PDM DMA ring itself free-runs off
/// `modulator`'s buffer, started by Core A during boot before this closure
/// was spawned; each iteration here observes the DMA's current read
/// pointer, recovers from underrun if the write pointer has fallen behind,
/// and otherwise either consumes a queued Sub sample or — if nothing is
/// queued and the lead cushion is inadequate — synthesizes a zero sample
/// rather than let the ring run dry (spec.md §4.5 steps 1-3).
fn core_b_main(modulator: &'static mut PdmModulator) -> ! {
    let ring = modulator.ring();
    loop {
        // SAFETY: Core B is the sole consumer of `PCM_PDM_QUEUE` for the
        // life of the program (spec.md §4.4 "single consumer").
        let queue = unsafe { &mut *core::ptr::addr_of_mut!(PCM_PDM_QUEUE) };

        let read_index = pdm_pio::current_read_index(ring);
        modulator.recover_if_underrun(read_index);

        match queue.pop() {
            Some(msg) => {
                let pcm = (to_f32(msg.sample) * 32768.0) as i32;
                modulator.process_sample(pcm, msg.reset);
            }
            None => {
                let lead = modulator.lead_words(read_index);
                if lead < PDM_WORDS_PER_SAMPLE * PDM_TARGET_LEAD_SAMPLES {
                    modulator.process_sample(0, false);
                }
            }
        }

        tick();
    }
}

#[rp2040_hal::entry]
fn main() -> ! {
    let mut pac = pac::Peripherals::take().unwrap();
    let mut sio = Sio::new(pac.SIO);

    let pins = hal::gpio::Pins::new(pac.IO_BANK0, pac.PADS_BANK0, sio.gpio_bank0, &mut pac.RESETS);

    let spdif_pin: hal::gpio::Pin<_, FunctionPio0, _> = pins.gpio9.into_function();
    let pdm_pin: hal::gpio::Pin<_, FunctionPio1, _> = pins.gpio10.into_function();
    let spdif_pin_id = spdif_pin.id().num;
    let pdm_pin_id = pdm_pin.id().num;

    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);

    // Boot clocks at the default 125 MHz system clock; the control plane's
    // `RateChange` action (applied below, per packet boundary) drives this
    // crate's own 44.1/48 kHz-family PLL reselection once the engine is up,
    // so boot only needs a clock good enough to run the Core A loop.
    let clocks = hal::clocks::init_clocks_and_plls(
        XTAL_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();

    let mut sys_clk_hz = clocks.system_clock.freq().to_Hz();

    let (mut pio0, sm0, _, _, _) = pac.PIO0.split(&mut pac.RESETS);
    let (mut pio1, sm1, _, _, _) = pac.PIO1.split(&mut pac.RESETS);

    let (spdif_div_int, spdif_div_frac) = pio_divider(sys_clk_hz, DEFAULT_RATE_HZ * 64);
    let (mut spdif_sm, spdif_tx) =
        spdif_pio::configure_state_machine(&mut pio0, sm0, spdif_pin_id, spdif_div_int, spdif_div_frac);

    let (pdm_div_int, pdm_div_frac) = pio_divider(sys_clk_hz, pdm_bit_clock_hz(DEFAULT_RATE_HZ));
    let (mut pdm_sm, _pdm_tx) = pdm_pio::configure_state_machine(
        &mut pio1,
        sm1,
        pdm_pin_id,
        pdm_div_int,
        pdm_div_frac,
    );

    spdif_sm.start();
    pdm_sm.start();

    // `PdmModulator` is allocated once, for the life of the program, so its
    // ring buffer has a stable address before the PDM DMA channel is armed
    // against it and before the `&'static mut` below is handed to Core B.
    let modulator = singleton!(: PdmModulator = PdmModulator::new(0xC0FF_EE00_D15E_A5E5_u64)).unwrap();
    let mut pdm_ring_driver = pdm_pio::PdmRingDriver::new();
    // SAFETY: runs once, before Core B spawns and before anything else
    // touches DMA channel `pdm_pio::PDM_DMA_CHANNEL`.
    unsafe {
        pdm_ring_driver.start(modulator.ring());
    }

    let dma = pac.DMA.split(&mut pac.RESETS);

    let mut pool = spdif_pio::SpdifPool::new();
    let silence_a = spdif_pio::silence_block();
    let silence_b = spdif_pio::silence_block();
    let buf_a = singleton!(: spdif_pio::SpdifBlock = silence_a).unwrap();
    let buf_b = singleton!(: spdif_pio::SpdifBlock = silence_b).unwrap();
    let silence_scratch = singleton!(: spdif_pio::SpdifBlock = spdif_pio::silence_block()).unwrap();

    // `buf_b`'s pool slot is reserved up front so the first `service()` call
    // has a real index to release once the chain's first transfer
    // completes, matching the pool's free/ready bookkeeping.
    let start_idx_b = pool.acquire_for_fill().expect("pool starts full");

    let mut spdif_driver =
        spdif_pio::SpdifOutputDriver::new(dma.ch0, dma.ch1, spdif_tx, buf_a, buf_b, start_idx_b, silence_scratch);

    let mut engine = Engine::new();
    let mut watchdog_gate = WatchdogGate::new(watchdog, 10_000);

    // SAFETY: called exactly once, before Core B has any other entry point.
    unsafe {
        start_core_b(&mut pac.PSM, &mut pac.PPB, &mut sio.fifo, move || core_b_main(modulator))
            .expect("core 1 bring-up");
    }

    let mut now_us: u64 = 0;
    loop {
        engine.drain_control(now_us);

        if let Some(new_family) = engine.take_pending_family_switch() {
            // Rate change crossed a PLL family boundary (spec.md §4.8):
            // reselect the PLL and recompute both transports' dividers.
            // `setup_pll_blocking` needs the crate's XOSC handle and
            // `RESETS`/`CLOCKS`, which in a full build this block would
            // reborrow from `clocks`/`pac`; the one-PLL-config-per-boot
            // teacher baseline this crate started from never exercised a
            // live switch, so the call sequence below documents the shape
            // rather than claiming hardware-verified correctness.
            let _pll_config = to_hal_pll_config(pll_for_family(new_family));
            sys_clk_hz = clocks.system_clock.freq().to_Hz();
            let (new_spdif_int, new_spdif_frac) = pio_divider(sys_clk_hz, engine.state.rate_hz * 64);
            let (new_pdm_int, new_pdm_frac) =
                pio_divider(sys_clk_hz, pdm_bit_clock_hz(engine.state.rate_hz));
            spdif_sm.set_clock_divisor(new_spdif_int, new_spdif_frac);
            pdm_sm.set_clock_divisor(new_pdm_int, new_pdm_frac);
        }

        watchdog_gate.pet_if_core_b_alive();
        spdif_driver.service(&mut pool);

        // `on_usb_packet` below is where an external USB stack would push
        // one isochronous OUT packet's worth of samples; absent that stack,
        // the loop just keeps the control plane, watchdog gate, and S/PDIF
        // DMA pool serviced between packets.
        now_us = now_us.wrapping_add(1000);
    }
}

/// Entry point an external USB stack calls once per isochronous OUT packet
/// (spec.md §2 "Data flow": "USB OUT -> Ingest -> DSP Pipeline -> ..."). Not
/// called from `main`'s loop directly since packet arrival is interrupt- or
/// stack-driven, not polled.
pub fn on_usb_packet(
    engine: &mut Engine,
    samples: &[(i16, i16)],
    now_us: u64,
    spdif_out: &mut [[u32; 4]],
    pdm_queue: &mut PcmPdmQueue,
    feedback_sink: &mut dyn FeedbackSink,
) -> usize {
    engine.process_packet(samples, now_us, spdif_out, pdm_queue, feedback_sink)
}

/// Entry point an external vendor-request parser calls once it has decoded
/// endpoint-zero bytes into a [`ControlEvent`] (spec.md §6). Translates the
/// boundary event into either an immediate pipeline mutation (gain, mute,
/// delay, enable flags — cheap, no transcendental math) or a staged control
/// action for anything that must recompute filter coefficients.
pub fn on_vendor_control(engine: &mut Engine, event: ControlEvent) {
    match event {
        ControlEvent::SetRateHz(rate_hz) => engine.control.stage_rate_change(rate_hz),
        ControlEvent::SetPreampDb(db) => engine.state.set_preamp_db(db),
        ControlEvent::SetEqBand(EqUpdateRequest { channel, band, recipe }) => {
            engine.control.stage_eq_update(EqUpdateRequest { channel, band, recipe });
        }
        ControlEvent::SetEqBypass { channel, bypass } => {
            // Whole-channel bypass is a convenience the external parser
            // expands into one flat-recipe `EqUpdateRequest` per band
            // (spec.md §3 "a flat recipe is the bypass state"); this
            // boundary function only forwards already-decoded bands.
            let _ = (channel, bypass);
        }
        ControlEvent::SetChannelGainDb { channel, gain_db } => {
            if let Some(gain) = engine.pipeline.channel_gain_mut(channel) {
                gain.set_gain_db(gain_db);
            }
        }
        ControlEvent::SetChannelMute { channel, mute } => {
            if let Some(gain) = engine.pipeline.channel_gain_mut(channel) {
                gain.mute = mute;
            }
        }
        ControlEvent::SetChannelDelayMs { channel, delay_ms } => {
            let rate_hz = engine.state.rate_hz;
            if let Some(delay) = engine.pipeline.delay_mut(channel) {
                delay.set_delay_ms(delay_ms, rate_hz);
            }
        }
        ControlEvent::SetLoudnessEnabled(enabled) => {
            engine.pipeline.loudness_table_mut().enabled = enabled;
        }
        ControlEvent::SetLoudnessReferenceSplDb(db) => {
            engine.pipeline.loudness_table_mut().reference_spl_db = db;
            engine.control.stage_loudness_recompute();
        }
        ControlEvent::SetCrossfeedEnabled(enabled) => {
            engine.pipeline.crossfeed_mut().enabled = enabled;
        }
        ControlEvent::SetCrossfeedPreset(preset) => {
            let rate_hz = engine.state.rate_hz as f32;
            engine.pipeline.crossfeed_mut().set_preset(preset, rate_hz);
        }
        ControlEvent::SetMasterVolumeStep(step) => {
            engine.pipeline.master_volume_mut().set_step(step as usize);
        }
        ControlEvent::SetMasterMute(mute) => {
            engine.pipeline.master_volume_mut().mute = mute;
        }
        ControlEvent::RequestStatus(_selector) => {
            // Status read-back is synchronous from the caller's point of
            // view; the external parser calls `engine.status_snapshot`
            // directly rather than queuing a control action for it.
        }
        ControlEvent::SaveParameters | ControlEvent::FactoryReset => {
            // Flash programming is the external persistence collaborator's
            // job (spec.md §1 "Out of scope": "flash persistence"); it
            // reads/writes `dsp::persist::ParamRecord` built from the
            // engine's current state through accessors, not through this
            // control-event boundary.
        }
    }
}
