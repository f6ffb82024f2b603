//! # slotsink-audio
//!
//! Real-time bridge between a pull-style audio renderer and a push-style,
//! fixed-slot hardware buffer queue.
//!
//! Features:
//! - Slot ring owned by a single render thread, never shared
//! - Backpressure driven by the device's own queue-depth report
//! - Allocation-free completion → wake hand-off
//! - Ordered hardware bring-up with reverse-order release on any failure

pub mod buffer;
pub mod control;
pub mod hardware;
pub mod latency;
pub mod sink;
pub mod source;
pub mod tracker;
pub mod wait;
pub mod wake;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use control::{ControlMessage, EngineState, PipelineEvent, PipelineState};
pub use hardware::{Backend, BufferQueue, HwObject, PlayState, Player, PlayerParams};
pub use latency::{LatencyController, LatencyUpdate};
pub use sink::SlotSink;
pub use source::{AudioSource, ToneSource};
pub use worker::RenderStats;
