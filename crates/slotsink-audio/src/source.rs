//! The engine side of the pipeline.
//!
//! The render thread pulls one slot's worth of mixed audio at a time from an
//! [`AudioSource`]. Sources run on the render thread and should return
//! promptly; a slow pull delays the next submission.

use std::f32::consts::TAU;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use slotsink_core::{SampleFormat, SampleSpec};
use tracing::trace;

use crate::control::EngineState;

/// Pull-style audio renderer feeding the sink.
pub trait AudioSource: Send {
    /// Render up to `n_bytes` of audio in the sink's sample format.
    ///
    /// While playing the source is expected to satisfy the whole request.
    /// `None` means end of data; the sink pads the slot with silence.
    fn pull(&mut self, n_bytes: usize) -> Option<Bytes>;

    /// Forget anything that was about to be rendered.
    fn process_rewind(&mut self) {}

    /// Engine state at pipeline start.
    fn current_state(&self) -> EngineState {
        EngineState::Playing
    }

    /// Latency the engine wants at pipeline start; `None` for unspecified.
    fn requested_latency(&self) -> Option<Duration> {
        None
    }
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn pull(&mut self, n_bytes: usize) -> Option<Bytes> {
        (**self).pull(n_bytes)
    }

    fn process_rewind(&mut self) {
        (**self).process_rewind();
    }

    fn current_state(&self) -> EngineState {
        (**self).current_state()
    }

    fn requested_latency(&self) -> Option<Duration> {
        (**self).requested_latency()
    }
}

/// Endless sine tone.
#[derive(Debug, Clone)]
pub struct ToneSource {
    spec: SampleSpec,
    frequency: f32,
    amplitude: f32,
    /// Position within the current cycle, `[0, 1)`.
    phase: f32,
    requested_latency: Option<Duration>,
}

impl ToneSource {
    pub fn new(spec: SampleSpec, frequency: f32) -> Self {
        Self {
            spec,
            frequency,
            amplitude: 0.5,
            phase: 0.0,
            requested_latency: None,
        }
    }

    /// Peak level in `[0, 1]`.
    #[must_use]
    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub const fn with_latency(mut self, latency: Option<Duration>) -> Self {
        self.requested_latency = latency;
        self
    }

    fn next_sample(&mut self) -> f32 {
        let sample = (self.phase * TAU).sin() * self.amplitude;
        self.phase += self.frequency / self.spec.rate as f32;
        self.phase -= self.phase.floor();
        sample
    }
}

impl AudioSource for ToneSource {
    fn pull(&mut self, n_bytes: usize) -> Option<Bytes> {
        let frame_size = self.spec.frame_size();
        let frames = n_bytes / frame_size;
        let mut buf = BytesMut::with_capacity(frames * frame_size);

        for _ in 0..frames {
            let sample = self.next_sample();
            for _ in 0..self.spec.channels {
                put_sample(&mut buf, self.spec.format, sample);
            }
        }
        Some(buf.freeze())
    }

    fn process_rewind(&mut self) {
        trace!("Tone rewound");
    }

    fn requested_latency(&self) -> Option<Duration> {
        self.requested_latency
    }
}

/// Encode one normalized sample.
fn put_sample(buf: &mut BytesMut, format: SampleFormat, sample: f32) {
    let sample = sample.clamp(-1.0, 1.0);
    match format {
        SampleFormat::U8 => buf.put_u8((sample * 127.0 + 128.0) as u8),
        SampleFormat::S16Le => buf.put_i16_le((sample * f32::from(i16::MAX)) as i16),
        SampleFormat::S16Be => buf.put_i16((sample * f32::from(i16::MAX)) as i16),
        SampleFormat::S32Le => buf.put_i32_le((f64::from(sample) * f64::from(i32::MAX)) as i32),
        SampleFormat::F32Le => buf.put_f32_le(sample),
    }
}
