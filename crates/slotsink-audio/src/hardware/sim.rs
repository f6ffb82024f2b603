//! Simulated device.
//!
//! A buffer queue drained by a clock thread that "plays" one slot per slot
//! duration while the player is in the playing state, then fires the
//! completion notifier. Used by the CLI when no real device is wanted and by
//! the end-to-end tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use slotsink_core::{HwError, HwResult};
use tracing::{debug, error, trace};

use super::{Backend, BufferQueue, HwObject, PlayState, Player, PlayerParams};
use crate::wake::CompletionNotifier;

/// Receives every slot the simulated device finishes playing.
pub type PlaybackTap = Box<dyn FnMut(&[u8]) + Send>;

/// Backend producing simulated device objects.
#[derive(Default)]
pub struct SimulatedBackend {
    tap: Option<PlaybackTap>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand played slots to `tap`, in playback order.
    pub fn with_tap(tap: impl FnMut(&[u8]) + Send + 'static) -> Self {
        Self {
            tap: Some(Box::new(tap)),
        }
    }
}

impl Backend for SimulatedBackend {
    fn create_engine(&mut self) -> HwResult<Box<dyn HwObject>> {
        Ok(Box::new(SimObject { name: "engine" }))
    }

    fn create_output_mix(&mut self) -> HwResult<Box<dyn HwObject>> {
        Ok(Box::new(SimObject { name: "output mix" }))
    }

    fn create_player(
        &mut self,
        params: &PlayerParams,
        notifier: CompletionNotifier,
    ) -> HwResult<Player> {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                slots: VecDeque::with_capacity(params.slot_count),
                spare: (0..params.slot_count)
                    .map(|_| Vec::with_capacity(params.slot_size))
                    .collect(),
                capacity: params.slot_count,
                play_state: PlayState::Stopped,
                running: true,
            }),
            cond: Condvar::new(),
        });

        let period = params.slot_duration;
        let tap = self.tap.take();
        let dac_shared = shared.clone();
        let thread = thread::Builder::new()
            .name("slotsink-sim-dac".to_string())
            .spawn(move || run_dac(&dac_shared, period, &notifier, tap))
            .map_err(|e| {
                error!("Failed to spawn simulated DAC thread: {e}");
                HwError::Code(HwError::RESOURCE_ERROR)
            })?;

        Ok(Player {
            object: Box::new(SimPlayer {
                shared: shared.clone(),
                thread: Some(thread),
            }),
            queue: Box::new(SimQueue { shared }),
        })
    }
}

struct SimObject {
    name: &'static str,
}

impl HwObject for SimObject {
    fn name(&self) -> &'static str {
        self.name
    }

    fn destroy(&mut self) {
        trace!("Simulated {} destroyed", self.name);
    }
}

struct QueueState {
    slots: VecDeque<Vec<u8>>,
    /// Recycled slot copies.
    spare: Vec<Vec<u8>>,
    capacity: usize,
    play_state: PlayState,
    running: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    cond: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock()
    }
}

/// Buffer queue of the simulated player.
pub struct SimQueue {
    shared: Arc<Shared>,
}

impl BufferQueue for SimQueue {
    fn enqueue(&mut self, data: &[u8]) -> HwResult<()> {
        let mut state = self.shared.lock();
        if !state.running {
            return Err(HwError::Code(HwError::PRECONDITIONS_VIOLATED));
        }
        if state.slots.len() >= state.capacity {
            return Err(HwError::BufferInsufficient);
        }

        let mut slot = state.spare.pop().unwrap_or_default();
        slot.clear();
        slot.extend_from_slice(data);
        state.slots.push_back(slot);
        self.shared.cond.notify_one();
        Ok(())
    }

    fn queued(&self) -> HwResult<usize> {
        Ok(self.shared.lock().slots.len())
    }

    fn clear(&mut self) -> HwResult<()> {
        let mut state = self.shared.lock();
        while let Some(slot) = state.slots.pop_front() {
            state.spare.push(slot);
        }
        Ok(())
    }

    fn set_play_state(&mut self, play_state: PlayState) -> HwResult<()> {
        let mut state = self.shared.lock();
        if !state.running {
            return Err(HwError::Code(HwError::PRECONDITIONS_VIOLATED));
        }
        state.play_state = play_state;
        self.shared.cond.notify_one();
        Ok(())
    }
}

struct SimPlayer {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl HwObject for SimPlayer {
    fn name(&self) -> &'static str {
        "player"
    }

    fn destroy(&mut self) {
        self.shared.lock().running = false;
        self.shared.cond.notify_all();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Simulated DAC thread panicked");
            }
        }
    }
}

/// Clock loop: the front slot plays for one period, then completes.
fn run_dac(
    shared: &Shared,
    period: Duration,
    notifier: &CompletionNotifier,
    mut tap: Option<PlaybackTap>,
) {
    debug!("Simulated DAC started, {:?} per slot", period);
    let mut deadline = Instant::now() + period;
    let mut state = shared.lock();

    while state.running {
        if state.play_state != PlayState::Playing || state.slots.is_empty() {
            shared.cond.wait_for(&mut state, period);
            deadline = Instant::now() + period;
            continue;
        }

        let now = Instant::now();
        if now < deadline {
            shared.cond.wait_until(&mut state, deadline);
            continue;
        }

        let Some(slot) = state.slots.pop_front() else {
            continue;
        };
        deadline += period;
        if deadline < now {
            deadline = now + period;
        }

        let slot = MutexGuard::unlocked(&mut state, || {
            if let Some(tap) = tap.as_mut() {
                tap(&slot);
            }
            notifier.notify();
            slot
        });
        state.spare.push(slot);
    }

    debug!("Simulated DAC stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests use unwrap for brevity
mod tests {
    use super::*;
    use crate::wake::wake_channel;
    use slotsink_core::SinkConfig;

    fn params() -> PlayerParams {
        let geometry = SinkConfig::from_modargs("rate=48000 slot_usec=2000 buffer=1536")
            .unwrap()
            .geometry()
            .unwrap();
        PlayerParams::from(&geometry)
    }

    #[test]
    fn test_rejects_when_full() {
        let params = params();
        assert_eq!(params.slot_count, 4);
        let (notifier, _wake) = wake_channel();
        let mut backend = SimulatedBackend::new();
        let mut player = backend.create_player(&params, notifier).unwrap();

        let slot = vec![0u8; params.slot_size];
        for _ in 0..params.slot_count {
            player.queue.enqueue(&slot).unwrap();
        }
        assert_eq!(player.queue.queued(), Ok(4));
        assert_eq!(player.queue.enqueue(&slot), Err(HwError::BufferInsufficient));

        player.queue.clear().unwrap();
        assert_eq!(player.queue.queued(), Ok(0));
        player.object.destroy();
    }

    #[test]
    fn test_plays_in_order_and_notifies() {
        let params = params();
        let played = Arc::new(Mutex::new(Vec::new()));
        let sink = played.clone();
        let mut backend = SimulatedBackend::with_tap(move |slot: &[u8]| sink.lock().push(slot[0]));

        let (notifier, wake) = wake_channel();
        let mut player = backend.create_player(&params, notifier).unwrap();
        for marker in 1..=3u8 {
            player.queue.enqueue(&vec![marker; params.slot_size]).unwrap();
        }
        player.queue.set_play_state(PlayState::Playing).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut woken = false;
        while (played.lock().len() < 3 || !woken) && Instant::now() < deadline {
            woken |= wake.try_take();
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(*played.lock(), vec![1, 2, 3]);
        assert!(woken);
        assert_eq!(player.queue.queued(), Ok(0));
        player.object.destroy();
    }

    #[test]
    fn test_stopped_player_holds_slots() {
        let params = params();
        let (notifier, _wake) = wake_channel();
        let mut backend = SimulatedBackend::new();
        let mut player = backend.create_player(&params, notifier).unwrap();

        player.queue.enqueue(&vec![0u8; params.slot_size]).unwrap();
        thread::sleep(params.slot_duration * 5);
        assert_eq!(player.queue.queued(), Ok(1));
        player.object.destroy();
    }

    #[test]
    fn test_destroyed_player_rejects_slots() {
        let params = params();
        let (notifier, _wake) = wake_channel();
        let mut backend = SimulatedBackend::new();
        let mut player = backend.create_player(&params, notifier).unwrap();

        player.object.destroy();
        assert_eq!(
            player.queue.enqueue(&vec![0u8; params.slot_size]),
            Err(HwError::Code(HwError::PRECONDITIONS_VIOLATED))
        );
    }
}
