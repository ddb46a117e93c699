//! Watchdog pet gate (spec.md §5 "A software watchdog on Core A resets the
//! device if the main loop stalls"; §9 "Watchdog and Core B", resolved by
//! SPEC_FULL.md §10.5 into the rule below).
//!
//! The teacher constructs `hal::Watchdog` purely to hand it to
//! `init_clocks_and_plls` and never starts or feeds it; this module is the
//! part the teacher left out.

use rp2040_hal as hal;

use crate::hw::multicore::HeartbeatMonitor;

/// Wraps `hal::Watchdog` with the heartbeat-gated pet rule: Core A only
/// feeds the watchdog when Core B's heartbeat has advanced since the last
/// main-loop iteration (spec.md §9 option (a), the one this design takes).
/// A deadlocked Core B therefore eventually starves the pet path too, and
/// the whole device resets rather than silently losing only the subwoofer
/// output.
pub struct WatchdogGate {
    watchdog: hal::Watchdog,
    heartbeat: HeartbeatMonitor,
}

impl WatchdogGate {
    /// `timeout_us` should comfortably exceed one audio packet period (1 ms)
    /// plus the PDM loop's own iteration period, so ordinary scheduling
    /// jitter never trips it.
    pub fn new(mut watchdog: hal::Watchdog, timeout_us: u32) -> Self {
        watchdog.start(timeout_us.into());
        Self { watchdog, heartbeat: HeartbeatMonitor::new() }
    }

    /// Call once per Core A main-loop iteration, after draining the control
    /// plane and before waiting for the next packet (spec.md §5 "The main
    /// loop between packets pets the watchdog"). Returns whether the pet
    /// actually happened, so a caller that also logs can report a stall in
    /// progress.
    pub fn pet_if_core_b_alive(&mut self) -> bool {
        if self.heartbeat.is_alive() {
            self.watchdog.feed();
            true
        } else {
            false
        }
    }
}
