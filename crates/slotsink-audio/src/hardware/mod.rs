//! Hardware abstraction.
//!
//! A [`Backend`] creates three objects in order: the audio engine, the output
//! mix, and the player together with its [`BufferQueue`]. [`Hardware`] owns
//! the result and releases everything in reverse creation order, whether
//! bring-up fails halfway or the pipeline shuts down normally.

#[cfg(feature = "cpal")]
pub mod cpal;
pub mod sim;
mod stack;

pub use stack::ObjectStack;

use std::time::Duration;

use slotsink_core::{Error, HwError, HwResult, Result, SampleSpec, SlotGeometry};
use tracing::{debug, error, warn};

use crate::wake::CompletionNotifier;

/// Player transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Playing,
}

/// What the player is created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerParams {
    pub spec: SampleSpec,
    pub slot_size: usize,
    pub slot_count: usize,
    pub slot_duration: Duration,
}

impl From<&SlotGeometry> for PlayerParams {
    fn from(geometry: &SlotGeometry) -> Self {
        Self {
            spec: *geometry.spec(),
            slot_size: geometry.slot_size(),
            slot_count: geometry.slot_count(),
            slot_duration: geometry.slot_duration(),
        }
    }
}

/// A device object that must be explicitly destroyed.
pub trait HwObject {
    /// Short name used in logs, e.g. "output mix".
    fn name(&self) -> &'static str;

    /// Release the device-side resource. Called exactly once.
    fn destroy(&mut self);
}

/// Fixed-capacity FIFO of slots owned by the player.
///
/// `enqueue` borrows the slot only for the duration of the call; backends
/// that need the bytes until completion copy them.
pub trait BufferQueue {
    /// Submit one slot. Fails with `BufferInsufficient` when full.
    fn enqueue(&mut self, data: &[u8]) -> HwResult<()>;

    /// Number of submitted slots that have not finished playing.
    fn queued(&self) -> HwResult<usize>;

    /// Drop every queued slot without playing it.
    fn clear(&mut self) -> HwResult<()>;

    fn set_play_state(&mut self, state: PlayState) -> HwResult<()>;
}

/// The player object and its buffer queue.
pub struct Player {
    pub object: Box<dyn HwObject>,
    pub queue: Box<dyn BufferQueue>,
}

/// Factory for the device objects a pipeline needs.
///
/// Moved onto the render thread before any method is called.
pub trait Backend: Send {
    fn create_engine(&mut self) -> HwResult<Box<dyn HwObject>>;

    fn create_output_mix(&mut self) -> HwResult<Box<dyn HwObject>>;

    /// Create the player. `notifier` must be called once per completed slot.
    fn create_player(
        &mut self,
        params: &PlayerParams,
        notifier: CompletionNotifier,
    ) -> HwResult<Player>;
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn create_engine(&mut self) -> HwResult<Box<dyn HwObject>> {
        (**self).create_engine()
    }

    fn create_output_mix(&mut self) -> HwResult<Box<dyn HwObject>> {
        (**self).create_output_mix()
    }

    fn create_player(
        &mut self,
        params: &PlayerParams,
        notifier: CompletionNotifier,
    ) -> HwResult<Player> {
        (**self).create_player(params, notifier)
    }
}

/// Realized device objects plus the player's buffer queue.
pub struct Hardware {
    queue: Box<dyn BufferQueue>,
    objects: ObjectStack,
    released: bool,
}

impl Hardware {
    /// Create engine, output mix, and player, then start playback.
    ///
    /// On any failure the objects created so far are released in reverse
    /// order before the error is returned.
    pub fn realize(
        backend: &mut dyn Backend,
        params: &PlayerParams,
        notifier: CompletionNotifier,
    ) -> Result<Self> {
        let mut objects = ObjectStack::new();

        let engine = backend
            .create_engine()
            .map_err(|e| failed("create engine", e))?;
        objects.push(engine);

        let output_mix = backend
            .create_output_mix()
            .map_err(|e| failed("create output mix", e))?;
        objects.push(output_mix);

        let player = backend
            .create_player(params, notifier)
            .map_err(|e| failed("create player", e))?;
        objects.push(player.object);

        let mut hardware = Self {
            queue: player.queue,
            objects,
            released: false,
        };
        hardware
            .queue
            .set_play_state(PlayState::Playing)
            .map_err(|e| failed("set play state", e))?;

        debug!("Hardware realized: {} objects", hardware.objects.len());
        Ok(hardware)
    }

    pub fn queue(&self) -> &dyn BufferQueue {
        self.queue.as_ref()
    }

    pub fn queue_mut(&mut self) -> &mut dyn BufferQueue {
        self.queue.as_mut()
    }

    /// Stop the player, clear the queue, and release every object.
    ///
    /// In-flight slots are not waited for. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(e) = self.queue.set_play_state(PlayState::Stopped) {
            warn!("Failed to stop player: hardware error {}", e.code());
        }
        if let Err(e) = self.queue.clear() {
            warn!("Failed to clear buffer queue: hardware error {}", e.code());
        }
        self.objects.release_all();
    }
}

impl Drop for Hardware {
    fn drop(&mut self) {
        self.release();
    }
}

fn failed(operation: &'static str, err: HwError) -> Error {
    error!("{} failed: hardware error {}", operation, err.code());
    Error::hardware(operation, err)
}
