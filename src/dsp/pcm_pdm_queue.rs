//! Single-producer single-consumer lock-free ring carrying PCM samples from
//! the audio callback (Core A) to the PDM modulator (Core B) (spec.md §4.4).
//!
//! 256 entries, 8-bit head/tail so wraparound is implicit. The payload store
//! happens-before the head store (release), and the consumer's tail store is
//! likewise release-ordered so the producer's "is it full" check
//! (acquire-loads `tail`) observes consumed slots promptly. A `Sync`-safe
//! design requires no locks because each index is written by exactly one
//! core (spec.md §3/§5 invariant).

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::dsp::config::PCM_PDM_RING_LEN;
use crate::dsp::numeric::{Sample, ZERO_SAMPLE};

const _: () = assert!(PCM_PDM_RING_LEN == 256, "ring length must match the implicit 8-bit wrap");

/// `{sample, reset}` (spec.md §3). `reset` is carried but not currently
/// asserted by the producer; the consumer treats a set flag as "zero the
/// integrators and emit silence this sample."
#[derive(Debug, Clone, Copy, Default)]
pub struct PcmPdmMessage {
    pub sample: Sample,
    pub reset: bool,
}

/// Fixed-capacity SPSC ring. `head` is only written by the producer, `tail`
/// only by the consumer; both use `u8` so increments wrap for free.
pub struct PcmPdmQueue {
    slots: [PcmPdmMessage; PCM_PDM_RING_LEN],
    head: AtomicU8,
    tail: AtomicU8,
    /// Producer-side counter of dropped samples (ring full), spec.md §4.4.
    overrun_count: AtomicU32,
}

impl PcmPdmQueue {
    pub const fn new() -> Self {
        Self {
            slots: [PcmPdmMessage { sample: ZERO_SAMPLE, reset: false }; PCM_PDM_RING_LEN],
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
            overrun_count: AtomicU32::new(0),
        }
    }

    pub fn overrun_count(&self) -> u32 {
        self.overrun_count.load(Ordering::Relaxed)
    }

    /// Producer side (Core A / audio callback). Computes `next_head`; if it
    /// equals `tail` the queue is full and the sample is dropped with the
    /// overrun counter incremented (spec.md §4.4). Otherwise the payload is
    /// written first, then `head` is published with a release store.
    ///
    /// # Safety contract
    /// Must only be called from the single producer context (Core A).
    pub fn push(&mut self, msg: PcmPdmMessage) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let next_head = head.wrapping_add(1);
        let tail = self.tail.load(Ordering::Acquire);
        if next_head == tail {
            self.overrun_count.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.slots[head as usize] = msg;
        self.head.store(next_head, Ordering::Release);
        true
    }

    /// Consumer side (Core B / PDM loop). `true` when a sample was popped.
    ///
    /// # Safety contract
    /// Must only be called from the single consumer context (Core B).
    pub fn pop(&mut self) -> Option<PcmPdmMessage> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        let msg = self.slots[tail as usize];
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(msg)
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }
}

impl Default for PcmPdmQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::numeric::{from_f32, to_f32};

    #[test]
    fn push_pop_preserves_order_and_values() {
        let mut q = PcmPdmQueue::new();
        for i in 0..50 {
            assert!(q.push(PcmPdmMessage { sample: from_f32(i as f32), reset: false }));
        }
        for i in 0..50 {
            let m = q.pop().unwrap();
            assert_eq!(to_f32(m.sample), i as f32);
        }
        assert!(q.pop().is_none());
    }

    #[test]
    fn full_ring_drops_and_counts_overrun() {
        let mut q = PcmPdmQueue::new();
        // Capacity is RING_LEN - 1 (one slot always kept empty to
        // distinguish full from empty).
        let capacity = PCM_PDM_RING_LEN - 1;
        for i in 0..capacity {
            assert!(q.push(PcmPdmMessage { sample: from_f32(i as f32), reset: false }));
        }
        assert!(!q.push(PcmPdmMessage { sample: from_f32(999.0), reset: false }));
        assert_eq!(q.overrun_count(), 1);
    }

    #[test]
    fn consumed_never_exceeds_produced_plus_one() {
        // spec.md §8: for any interleaving, items consumed <= items produced + 1.
        let mut q = PcmPdmQueue::new();
        let mut produced = 0usize;
        let mut consumed = 0usize;
        for i in 0..1000 {
            if i % 3 != 0 {
                if q.push(PcmPdmMessage { sample: from_f32(i as f32), reset: false }) {
                    produced += 1;
                }
            } else if q.pop().is_some() {
                consumed += 1;
            }
            assert!(consumed <= produced + 1);
        }
    }

    #[test]
    fn no_duplication_or_reorder_under_interleaving() {
        let mut q = PcmPdmQueue::new();
        let mut next_push = 0i64;
        let mut next_expected_pop = 0i64;
        for step in 0..5000 {
            if step % 2 == 0 {
                if q.push(PcmPdmMessage { sample: from_f32(next_push as f32), reset: false }) {
                    next_push += 1;
                }
            } else if let Some(m) = q.pop() {
                assert_eq!(to_f32(m.sample), next_expected_pop as f32);
                next_expected_pop += 1;
            }
        }
    }
}
