//! Boot-time error taxonomy (SPEC_FULL.md #10.2).
//!
//! Everything past boot follows spec.md §7's propagation policy: the audio
//! loop is infallible. `EngineError` only covers the "only reachable from
//! misconfiguration" boot-time failures named in §7.

/// Fatal, boot-time-only failures. A panic here is the documented escape
/// hatch (spec.md §7 "Fatal"); `main` is expected to `unwrap()` these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum EngineError {
    /// A PIO program did not fit in the target state machine's instruction
    /// memory, or both PIO blocks were already saturated.
    PioProgramInstallFailed,
    /// The requested DMA channel was already claimed.
    DmaChannelUnavailable,
    /// `init_clocks_and_plls` could not lock the requested PLL configuration.
    ClockInitFailed,
    /// Core B did not acknowledge bring-up within the bounded spin-wait.
    Core1StartFailed,
}

impl core::fmt::Display for EngineError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            EngineError::PioProgramInstallFailed => "PIO program install failed",
            EngineError::DmaChannelUnavailable => "DMA channel unavailable",
            EngineError::ClockInitFailed => "clock/PLL init failed",
            EngineError::Core1StartFailed => "core 1 bring-up failed",
        };
        f.write_str(msg)
    }
}
