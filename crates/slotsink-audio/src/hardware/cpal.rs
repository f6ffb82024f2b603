//! System output device via cpal.
//!
//! The host stands in for the audio engine object, the default output device
//! for the output mix, and an output stream for the player. The stream's data
//! callback drains queued slots and fires the completion notifier each time
//! one has been fully consumed.
//!
//! The callback never waits for the render thread: it only `try_lock`s the
//! queue and plays silence for that period if the lock is taken. The render
//! thread holds the lock only to move slot buffers in and out, never while
//! copying audio.

use std::collections::VecDeque;
use std::sync::Arc;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BufferSize, Device, SampleRate, Stream, StreamConfig,
};
use parking_lot::Mutex;
use slotsink_core::{HwError, HwResult, SampleFormat};
use tracing::{debug, error, info};

use super::{Backend, BufferQueue, HwObject, PlayState, Player, PlayerParams};
use crate::wake::CompletionNotifier;

/// Backend for the default cpal host and output device.
///
/// Host and device handles are looked up again where needed instead of being
/// stored, so the backend itself stays `Send`.
#[derive(Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub const fn new() -> Self {
        Self
    }
}

fn default_device() -> HwResult<Device> {
    cpal::default_host().default_output_device().ok_or_else(|| {
        error!("No output device found");
        HwError::Code(HwError::RESOURCE_ERROR)
    })
}

impl Backend for CpalBackend {
    fn create_engine(&mut self) -> HwResult<Box<dyn HwObject>> {
        let host = cpal::default_host();
        debug!("Audio host: {:?}", host.id());
        Ok(Box::new(CpalObject { name: "engine" }))
    }

    fn create_output_mix(&mut self) -> HwResult<Box<dyn HwObject>> {
        let device = default_device()?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio output device: {device_name}");
        Ok(Box::new(CpalObject { name: "output mix" }))
    }

    fn create_player(
        &mut self,
        params: &PlayerParams,
        notifier: CompletionNotifier,
    ) -> HwResult<Player> {
        let device = default_device()?;

        let supported = device.default_output_config().map_err(|e| {
            error!("Failed to get output config: {e}");
            HwError::Code(HwError::RESOURCE_ERROR)
        })?;
        let config = StreamConfig {
            channels: u16::from(params.spec.channels),
            sample_rate: SampleRate(params.spec.rate),
            buffer_size: BufferSize::Default,
        };
        debug!(
            "Output stream: {}Hz, {} channels, device format {:?}",
            params.spec.rate,
            params.spec.channels,
            supported.sample_format()
        );

        let shared = Arc::new(Mutex::new(QueueState {
            slots: VecDeque::with_capacity(params.slot_count),
            spare: Vec::with_capacity(params.slot_count),
            capacity: params.slot_count,
            cursor: 0,
            format: params.spec.format,
            play_state: PlayState::Stopped,
        }));

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &config, shared.clone(), notifier)?
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &config, shared.clone(), notifier)?
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &config, shared.clone(), notifier)?
            }
            other => {
                error!("Unsupported device sample format: {other:?}");
                return Err(HwError::Code(HwError::CONTENT_UNSUPPORTED));
            }
        };
        stream.play().map_err(|e| {
            error!("Failed to start stream: {e}");
            HwError::Code(HwError::RESOURCE_ERROR)
        })?;

        Ok(Player {
            object: Box::new(CpalPlayer {
                stream: Some(stream),
            }),
            queue: Box::new(CpalQueue { shared }),
        })
    }
}

struct CpalObject {
    name: &'static str,
}

impl HwObject for CpalObject {
    fn name(&self) -> &'static str {
        self.name
    }

    fn destroy(&mut self) {}
}

struct CpalPlayer {
    stream: Option<Stream>,
}

impl HwObject for CpalPlayer {
    fn name(&self) -> &'static str {
        "player"
    }

    fn destroy(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!("Failed to pause stream: {e}");
            }
        }
    }
}

struct QueueState {
    slots: VecDeque<Vec<u8>>,
    spare: Vec<Vec<u8>>,
    capacity: usize,
    /// Read position inside the front slot.
    cursor: usize,
    format: SampleFormat,
    play_state: PlayState,
}

impl QueueState {
    /// Next sample of the front slot, retiring the slot once consumed.
    fn next_sample(&mut self, notifier: &CompletionNotifier) -> Option<f32> {
        let format = self.format;
        let width = format.bytes_per_sample();
        let front = self.slots.front()?;
        let bytes = front.get(self.cursor..self.cursor + width)?;

        let sample = match format {
            SampleFormat::U8 => (f32::from(bytes[0]) - 128.0) / 128.0,
            _ => f32::from(i16::from_le_bytes([bytes[0], bytes[1]])) / 32768.0,
        };

        self.cursor += width;
        if self.cursor >= front.len() {
            self.cursor = 0;
            if let Some(slot) = self.slots.pop_front() {
                self.spare.push(slot);
            }
            notifier.notify();
        }
        Some(sample)
    }
}

struct CpalQueue {
    shared: Arc<Mutex<QueueState>>,
}

impl BufferQueue for CpalQueue {
    fn enqueue(&mut self, data: &[u8]) -> HwResult<()> {
        let mut slot = {
            let mut state = self.shared.lock();
            if state.slots.len() >= state.capacity {
                return Err(HwError::BufferInsufficient);
            }
            state.spare.pop().unwrap_or_default()
        };

        // Only the render thread enqueues, so the room checked above is still there.
        slot.clear();
        slot.extend_from_slice(data);
        self.shared.lock().slots.push_back(slot);
        Ok(())
    }

    fn queued(&self) -> HwResult<usize> {
        Ok(self.shared.lock().slots.len())
    }

    fn clear(&mut self) -> HwResult<()> {
        let mut state = self.shared.lock();
        state.cursor = 0;
        while let Some(slot) = state.slots.pop_front() {
            state.spare.push(slot);
        }
        Ok(())
    }

    fn set_play_state(&mut self, play_state: PlayState) -> HwResult<()> {
        self.shared.lock().play_state = play_state;
        Ok(())
    }
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &Device,
    config: &StreamConfig,
    shared: Arc<Mutex<QueueState>>,
    notifier: CompletionNotifier,
) -> HwResult<Stream> {
    let err_fn = |err| {
        error!("Audio stream error: {err}");
    };

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                fill_output(&shared, &notifier, data);
            },
            err_fn,
            None,
        )
        .map_err(|e| {
            error!("Failed to build stream: {e}");
            HwError::Code(HwError::RESOURCE_ERROR)
        })
}

/// Fill one device period from the queue, or with silence.
fn fill_output<T: cpal::SizedSample + cpal::FromSample<f32>>(
    shared: &Mutex<QueueState>,
    notifier: &CompletionNotifier,
    data: &mut [T],
) {
    let mut state = match shared.try_lock() {
        Some(state) if state.play_state == PlayState::Playing => state,
        _ => {
            for sample in data.iter_mut() {
                *sample = T::from_sample(0.0f32);
            }
            return;
        }
    };

    for sample in data.iter_mut() {
        let value = state.next_sample(notifier).unwrap_or(0.0);
        *sample = T::from_sample(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wake::wake_channel;

    fn queue_state(slots: &[&[u8]]) -> Mutex<QueueState> {
        Mutex::new(QueueState {
            slots: slots.iter().map(|slot| slot.to_vec()).collect(),
            spare: Vec::new(),
            capacity: 4,
            cursor: 0,
            format: SampleFormat::U8,
            play_state: PlayState::Playing,
        })
    }

    #[test]
    fn test_callback_drains_slots() {
        let shared = queue_state(&[&[0xff, 0xff], &[0x00]]);
        let (notifier, wake) = wake_channel();
        let mut data = [1.0f32; 4];

        fill_output(&shared, &notifier, &mut data);
        assert!(data[0] > 0.9 && data[1] > 0.9);
        assert!((data[2] + 1.0).abs() < f32::EPSILON);
        // Queue ran dry
        assert!(data[3].abs() < f32::EPSILON);
        assert!(wake.try_take());
        assert!(shared.lock().slots.is_empty());
        assert_eq!(shared.lock().spare.len(), 2);
    }

    #[test]
    fn test_callback_plays_silence_while_locked() {
        let shared = queue_state(&[&[0xff, 0xff]]);
        let (notifier, wake) = wake_channel();
        let mut data = [1.0f32; 2];

        let guard = shared.lock();
        fill_output(&shared, &notifier, &mut data);
        drop(guard);

        assert!(data.iter().all(|sample| sample.abs() < f32::EPSILON));
        assert!(!wake.try_take());
        assert_eq!(shared.lock().slots.len(), 1);
    }

    #[test]
    fn test_callback_silent_when_stopped() {
        let shared = queue_state(&[&[0xff]]);
        shared.lock().play_state = PlayState::Stopped;
        let (notifier, _wake) = wake_channel();
        let mut data = [1.0f32; 1];

        fill_output(&shared, &notifier, &mut data);
        assert!(data[0].abs() < f32::EPSILON);
        assert_eq!(shared.lock().slots.len(), 1);
    }
}
