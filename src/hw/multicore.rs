//! Core B bring-up and heartbeat publication (spec.md §5 "Scheduling": "Two
//! parallel hardware threads of execution"; SPEC_FULL.md §10.5 resolves the
//! §9 "Watchdog and Core B" design gap via this heartbeat).
//!
//! The teacher never splits work across cores, so the bring-up sequence
//! below follows `rp2040-hal`'s own documented `Multicore`/`Stack` shape
//! rather than adapting teacher code; the heartbeat counter itself follows
//! the crate's existing `core::sync::atomic` idiom from
//! `dsp::pcm_pdm_queue`.

use core::sync::atomic::{AtomicU32, Ordering};

use rp2040_hal as hal;

use hal::multicore::{Multicore, Stack};
use hal::pac;
use hal::sio::SioFifo;

use crate::dsp::error::EngineError;

/// Core B's stack, sized generously above the PDM loop's needs (no
/// recursion, fixed-size locals only) since a stack overflow here would
/// corrupt adjacent RAM silently rather than fault.
pub static mut CORE_B_STACK: Stack<8192> = Stack::new();

static HEARTBEAT: AtomicU32 = AtomicU32::new(0);

/// Called once per PDM loop iteration on Core B (spec.md §4.5 "Runs forever
/// on Core B. Per iteration: ..."). A wrapping counter is enough; Core A
/// only checks whether it has moved, not its absolute value.
#[inline]
#[cfg_attr(not(test), link_section = ".ram_code")]
pub fn tick() {
    HEARTBEAT.fetch_add(1, Ordering::Relaxed);
}

/// Tracks whether Core B's heartbeat has advanced since the last check
/// (SPEC_FULL.md §10.5). Core A holds one instance and polls it once per
/// main-loop iteration, right before petting the watchdog.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatMonitor {
    last_seen: u32,
}

impl HeartbeatMonitor {
    pub fn new() -> Self {
        Self { last_seen: HEARTBEAT.load(Ordering::Relaxed) }
    }

    /// Returns `true` if the heartbeat has advanced since the last call
    /// (spec.md §9 resolution: "Core A's pet path requires heartbeat
    /// progress"). Updates the watermark regardless of the result so a
    /// stalled Core B is detected exactly once per stall, not repeatedly.
    pub fn is_alive(&mut self) -> bool {
        Self::advanced(&mut self.last_seen, HEARTBEAT.load(Ordering::Relaxed))
    }

    /// Pure transition check, factored out so it can be exercised with
    /// local counter values instead of the process-global `HEARTBEAT`.
    fn advanced(last_seen: &mut u32, current: u32) -> bool {
        let moved = current != *last_seen;
        *last_seen = current;
        moved
    }
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts Core B running `entry` on its own stack (spec.md §5 "Two parallel
/// hardware threads of execution"). `entry` never returns; it is expected
/// to run the PDM modulator loop, calling [`tick`] once per iteration.
///
/// # Safety
/// Must be called exactly once, from Core A, before any other code touches
/// `CORE_B_STACK`.
pub unsafe fn start_core_b<F>(
    psm: &mut pac::PSM,
    ppb: &mut pac::PPB,
    fifo: &mut SioFifo,
    entry: F,
) -> Result<(), EngineError>
where
    F: FnOnce() -> ! + Send + 'static,
{
    let mut mc = Multicore::new(psm, ppb, fifo);
    let cores = mc.cores();
    let core1 = &mut cores[1];
    core1.spawn(&mut CORE_B_STACK.mem, entry).map_err(|_| EngineError::Core1StartFailed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advanced_counter_reports_alive_exactly_once() {
        let mut last_seen = 5;
        assert!(HeartbeatMonitor::advanced(&mut last_seen, 6));
        assert!(!HeartbeatMonitor::advanced(&mut last_seen, 6));
    }

    #[test]
    fn wrapped_counter_still_counts_as_advanced() {
        let mut last_seen = u32::MAX;
        assert!(HeartbeatMonitor::advanced(&mut last_seen, 0));
    }
}
