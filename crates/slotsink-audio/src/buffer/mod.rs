//! Slot storage for the render thread.

pub mod slots;

pub use slots::SlotRing;
