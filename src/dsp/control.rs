//! Control Plane: priority-ordered draining of pending parameter updates
//! between packets (spec.md §4.7).
//!
//! Vendor control requests (spec.md §6) stage updates here rather than
//! mutating engine state directly; the main loop calls `drain_next` once
//! per pending item, highest priority first, and applies the returned
//! `ControlAction` itself using the compute-then-commit discipline
//! (transcendental math outside any critical section, only the final
//! coefficient-slot copy briefly suspends interrupts).

use crate::dsp::channel::ChannelId;
use crate::dsp::filter_recipe::FilterRecipe;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqUpdateRequest {
    pub channel: ChannelId,
    pub band: usize,
    pub recipe: FilterRecipe,
}

/// One drained update, carrying the payload the caller needs to apply it
/// (spec.md §4.7 bullets, in priority order).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlAction {
    RateChange(u32),
    EqUpdate(EqUpdateRequest),
    LoudnessRecompute,
    CrossfeedRecompute,
}

/// Staged updates plus the flags that say which are pending. At most one
/// staged value per kind — a later `stage_*` call before the previous one
/// drains simply overwrites it, matching "the control plane stages the
/// update ... the main loop applies it" (spec.md §6): only the latest
/// value the host asked for needs to land.
#[derive(Default)]
pub struct ControlPlane {
    staged_rate_hz: Option<u32>,
    staged_eq: Option<EqUpdateRequest>,
    loudness_pending: bool,
    crossfeed_pending: bool,
}

impl ControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_rate_change(&mut self, rate_hz: u32) {
        self.staged_rate_hz = Some(rate_hz);
    }

    pub fn stage_eq_update(&mut self, request: EqUpdateRequest) {
        self.staged_eq = Some(request);
    }

    pub fn stage_loudness_recompute(&mut self) {
        self.loudness_pending = true;
    }

    pub fn stage_crossfeed_recompute(&mut self) {
        self.crossfeed_pending = true;
    }

    pub fn has_pending(&self) -> bool {
        self.staged_rate_hz.is_some()
            || self.staged_eq.is_some()
            || self.loudness_pending
            || self.crossfeed_pending
    }

    /// Pop the single highest-priority pending update, clearing its flag.
    /// Priority order: rate change > EQ update > loudness recompute >
    /// crossfeed recompute (spec.md §4.7). Call repeatedly until `None` to
    /// fully drain a packet boundary.
    pub fn drain_next(&mut self) -> Option<ControlAction> {
        if let Some(rate_hz) = self.staged_rate_hz.take() {
            return Some(ControlAction::RateChange(rate_hz));
        }
        if let Some(req) = self.staged_eq.take() {
            return Some(ControlAction::EqUpdate(req));
        }
        if self.loudness_pending {
            self.loudness_pending = false;
            return Some(ControlAction::LoudnessRecompute);
        }
        if self.crossfeed_pending {
            self.crossfeed_pending = false;
            return Some(ControlAction::CrossfeedRecompute);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::filter_recipe::FilterRecipe;

    fn eq_req() -> EqUpdateRequest {
        EqUpdateRequest { channel: ChannelId::MasterL, band: 0, recipe: FilterRecipe::flat() }
    }

    #[test]
    fn drains_in_priority_order_regardless_of_staging_order() {
        let mut cp = ControlPlane::new();
        cp.stage_crossfeed_recompute();
        cp.stage_loudness_recompute();
        cp.stage_eq_update(eq_req());
        cp.stage_rate_change(48_000);

        assert_eq!(cp.drain_next(), Some(ControlAction::RateChange(48_000)));
        assert_eq!(cp.drain_next(), Some(ControlAction::EqUpdate(eq_req())));
        assert_eq!(cp.drain_next(), Some(ControlAction::LoudnessRecompute));
        assert_eq!(cp.drain_next(), Some(ControlAction::CrossfeedRecompute));
        assert_eq!(cp.drain_next(), None);
    }

    #[test]
    fn empty_plane_has_nothing_pending() {
        let mut cp = ControlPlane::new();
        assert!(!cp.has_pending());
        assert_eq!(cp.drain_next(), None);
    }

    #[test]
    fn restaging_before_drain_keeps_only_latest() {
        let mut cp = ControlPlane::new();
        cp.stage_rate_change(44_100);
        cp.stage_rate_change(96_000);
        assert_eq!(cp.drain_next(), Some(ControlAction::RateChange(96_000)));
        assert_eq!(cp.drain_next(), None);
    }

    #[test]
    fn has_pending_reflects_partial_drain() {
        let mut cp = ControlPlane::new();
        cp.stage_loudness_recompute();
        cp.stage_crossfeed_recompute();
        assert!(cp.has_pending());
        cp.drain_next();
        assert!(cp.has_pending());
        cp.drain_next();
        assert!(!cp.has_pending());
    }
}
