//! Fixed-slot ring for hardware submission.
//!
//! One flat allocation split into N equal slots. The render thread fills the
//! slot at `next_slot`, hands a borrow of it to the buffer queue, and only
//! then advances. The hardware never writes here.

use slotsink_core::{SampleSpec, SlotGeometry};

/// N slots of `slot_size` bytes each plus the fill cursor.
pub struct SlotRing {
    /// The underlying storage, `slot_size * slot_count` bytes.
    storage: Box<[u8]>,
    /// Bytes per slot (frame-aligned).
    slot_size: usize,
    /// Number of slots N.
    slot_count: usize,
    /// Next slot to fill.
    next_slot: usize,
    /// Used for the zero-level pattern.
    spec: SampleSpec,
}

impl SlotRing {
    /// Allocate a ring for `geometry`, pre-filled with silence.
    pub fn new(geometry: &SlotGeometry) -> Self {
        let spec = *geometry.spec();
        let mut storage = vec![0u8; geometry.buffer_bytes()].into_boxed_slice();
        spec.fill_silence(&mut storage);

        Self {
            storage,
            slot_size: geometry.slot_size(),
            slot_count: geometry.slot_count(),
            next_slot: 0,
            spec,
        }
    }

    pub const fn slot_size(&self) -> usize {
        self.slot_size
    }

    pub const fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Index of the next slot to fill.
    pub const fn next_slot(&self) -> usize {
        self.next_slot
    }

    /// Copy `source` into slot `index`, padding with silence.
    ///
    /// Always writes exactly `slot_size` bytes. Returns how many bytes came
    /// from `source`; anything beyond one slot is ignored.
    pub fn fill(&mut self, index: usize, source: &[u8]) -> usize {
        let copied = source.len().min(self.slot_size);
        let spec = self.spec;
        let slot = self.slot_mut(index);

        if copied < slot.len() {
            spec.fill_silence(slot);
        }
        slot[..copied].copy_from_slice(&source[..copied]);
        copied
    }

    /// Overwrite slot `index` with the zero-level pattern.
    pub fn fill_silence(&mut self, index: usize) {
        let spec = self.spec;
        spec.fill_silence(self.slot_mut(index));
    }

    /// Contents of slot `index`.
    pub fn slot(&self, index: usize) -> &[u8] {
        let start = (index % self.slot_count) * self.slot_size;
        &self.storage[start..start + self.slot_size]
    }

    fn slot_mut(&mut self, index: usize) -> &mut [u8] {
        let start = (index % self.slot_count) * self.slot_size;
        &mut self.storage[start..start + self.slot_size]
    }

    /// Move the cursor to the following slot, wrapping at N.
    pub fn advance(&mut self) -> usize {
        self.next_slot = (self.next_slot + 1) % self.slot_count;
        self.next_slot
    }
}
