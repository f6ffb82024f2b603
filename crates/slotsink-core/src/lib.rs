//! # slotsink-core
//!
//! Core types, configuration, and error handling for the slotsink audio
//! bridge: sample specifications, module-argument parsing and the validated
//! slot geometry every other crate works from.

pub mod config;
pub mod error;
pub mod modargs;
pub mod sample;

pub use config::{SinkConfig, SlotGeometry};
pub use error::{Error, HwError, HwResult, Result};
pub use modargs::ModArgs;
pub use sample::{SampleFormat, SampleSpec};
