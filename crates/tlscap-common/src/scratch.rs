//! Per-CPU record storage standing in for a heap.
//!
//! A [`CaptureRecord`] is far larger than the 512-byte BPF stack, so it is
//! built in a preallocated slot. Each CPU owns one slot, and a probe runs to
//! completion with preemption disabled, so the slot is exclusively the
//! caller's for the duration of `acquire`. Nothing survives across calls.

use crate::record::CaptureRecord;

pub trait ScratchPool {
    /// Run `f` on this CPU's slot. `None` only if the pool was never created.
    fn acquire<R>(&self, f: impl FnOnce(&mut CaptureRecord) -> R) -> Option<R>;
}
