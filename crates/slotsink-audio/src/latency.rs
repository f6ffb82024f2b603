//! Latency target and backpressure control.
//!
//! The controller turns the engine's requested latency into `buffer_count`,
//! the number of slots the render loop keeps in flight, and derives the values
//! republished to the engine. It lives on the render thread; other threads
//! reach it through [`ControlMessage::RequestLatency`].
//!
//! [`ControlMessage::RequestLatency`]: crate::ControlMessage::RequestLatency

use std::time::Duration;

use slotsink_core::SlotGeometry;
use tracing::debug;

/// Values republished to the engine after a latency change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyUpdate {
    /// Slots kept in flight.
    pub buffer_count: usize,
    /// Largest single request, `slot_size * buffer_count`.
    pub max_request: usize,
    /// Lowest latency the sink can honour (one slot).
    pub min_latency: Duration,
    /// Highest latency the sink can honour (N - 1 slots).
    pub max_latency: Duration,
}

/// Owner of the in-flight slot target.
#[derive(Debug, Clone)]
pub struct LatencyController {
    geometry: SlotGeometry,
    buffer_count: usize,
}

impl LatencyController {
    /// Start at the minimum target of one slot.
    pub const fn new(geometry: &SlotGeometry) -> Self {
        Self {
            geometry: *geometry,
            buffer_count: 1,
        }
    }

    /// Current in-flight target.
    pub const fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    /// Apply a latency request and return what to republish.
    pub fn update(&mut self, requested: Option<Duration>) -> LatencyUpdate {
        let requested = requested.unwrap_or(self.geometry.max_latency());
        let buffer_count = buffer_count_for(
            requested,
            self.geometry.slot_duration(),
            self.geometry.slot_count(),
        );

        if buffer_count != self.buffer_count {
            debug!(
                "Latency target {:?} -> {} slots (was {})",
                requested, buffer_count, self.buffer_count
            );
            self.buffer_count = buffer_count;
        }

        self.published()
    }

    /// Values for the current target.
    pub fn published(&self) -> LatencyUpdate {
        LatencyUpdate {
            buffer_count: self.buffer_count,
            max_request: self.geometry.slot_size() * self.buffer_count,
            min_latency: self.geometry.slots_to_duration(1),
            max_latency: self.geometry.slots_to_duration(self.geometry.max_buffer_count()),
        }
    }

    /// Latency represented by `outstanding` slots in the device queue.
    pub fn latency_for(&self, outstanding: usize) -> Duration {
        self.geometry.slots_to_duration(outstanding)
    }
}

/// Slots needed to cover `requested`, clamped to `[1, slot_count - 1]`.
///
/// Rounds to the nearest whole slot; an exact half rounds down so the sink
/// never buffers more than was asked for on a tie.
pub fn buffer_count_for(requested: Duration, slot_duration: Duration, slot_count: usize) -> usize {
    let requested = requested.as_micros();
    let slot = slot_duration.as_micros().max(1);
    let nearest = (2 * requested + slot - 1) / (2 * slot);
    let max = slot_count.saturating_sub(1).max(1) as u128;

    nearest.clamp(1, max) as usize
}
