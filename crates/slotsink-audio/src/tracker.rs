//! Queue depth tracking.
//!
//! The device's own queue-state report is the only source of truth for how
//! many slots are in flight. The completion callback can race a submission,
//! so no local counter is kept alongside it.

use slotsink_core::HwResult;
use tracing::warn;

use crate::hardware::BufferQueue;

/// Mirrors the device's outstanding-slot count.
#[derive(Debug, Clone)]
pub struct QueueTracker {
    slot_count: usize,
    last_observed: usize,
}

impl QueueTracker {
    pub const fn new(slot_count: usize) -> Self {
        Self {
            slot_count,
            last_observed: 0,
        }
    }

    /// Ask the device how many submitted slots have not completed yet.
    ///
    /// The result is always in `[0, N]`.
    pub fn outstanding_count(&mut self, queue: &dyn BufferQueue) -> HwResult<usize> {
        let queued = queue.queued()?;
        if queued > self.slot_count {
            warn!(
                "Device reports {} queued slots, capacity is {}",
                queued, self.slot_count
            );
        }

        self.last_observed = queued.min(self.slot_count);
        Ok(self.last_observed)
    }

    /// Result of the most recent successful query.
    pub const fn last_observed(&self) -> usize {
        self.last_observed
    }
}
