//! The render thread.
//!
//! [`RenderWorker`] owns the slot ring, the realized hardware, the queue
//! tracker and the latency controller. Each tick it refills the device queue
//! up to the latency target, then blocks in [`wait_any`] until a slot
//! completes, a control message arrives, or one slot duration passes.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use slotsink_core::{Error, HwResult, Result, SlotGeometry};
use tracing::{debug, error, info, trace, warn};

use crate::buffer::SlotRing;
use crate::control::{ControlMessage, EngineState, PipelineEvent, PipelineState};
use crate::hardware::{Backend, Hardware, PlayerParams};
use crate::latency::{LatencyController, LatencyUpdate};
use crate::source::AudioSource;
use crate::tracker::QueueTracker;
use crate::wait::{wait_any, WaitReason};
use crate::wake::{wake_channel, WakeReceiver};

/// Counters kept by the render thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Slots accepted by the device.
    pub submitted: u64,
    /// Slots filled with the zero level instead of engine audio.
    pub silence_slots: u64,
    /// Submissions refused because the device queue was full.
    pub queue_full: u64,
    /// Ticks skipped because the queue state could not be read.
    pub query_failures: u64,
}

/// How a render tick ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    /// The pipeline is not in a rendering state.
    Idle,
    /// The in-flight target is met.
    Backpressure,
    /// The device refused the slot; it is kept for the next tick.
    QueueFull,
    /// The queue state could not be read; retried next tick.
    QueryFailed,
    /// Unrecoverable hardware error. The pipeline has failed.
    Fatal,
}

pub(crate) struct RenderWorker {
    geometry: SlotGeometry,
    /// Declared before `ring`: released before the slots it may still borrow.
    hardware: Hardware,
    ring: SlotRing,
    tracker: QueueTracker,
    latency: LatencyController,
    source: Box<dyn AudioSource>,
    state: PipelineState,
    shared_state: Arc<RwLock<PipelineState>>,
    control_rx: Receiver<ControlMessage>,
    event_tx: Sender<PipelineEvent>,
    wake: WakeReceiver,
    /// The slot at `next_slot` is filled but not yet accepted by the device.
    pending_submit: bool,
    rewind_requested: bool,
    teardown_requested: bool,
    stats: RenderStats,
}

impl RenderWorker {
    /// Realize the hardware and allocate the ring.
    ///
    /// On error every hardware object created so far is already released.
    pub(crate) fn open(
        geometry: SlotGeometry,
        backend: &mut dyn Backend,
        source: Box<dyn AudioSource>,
        shared_state: Arc<RwLock<PipelineState>>,
        control_rx: Receiver<ControlMessage>,
        event_tx: Sender<PipelineEvent>,
    ) -> Result<Self> {
        let (notifier, wake) = wake_channel();
        let hardware = Hardware::realize(backend, &PlayerParams::from(&geometry), notifier)?;

        Ok(Self {
            geometry,
            hardware,
            ring: SlotRing::new(&geometry),
            tracker: QueueTracker::new(geometry.slot_count()),
            latency: LatencyController::new(&geometry),
            source,
            state: PipelineState::Initializing,
            shared_state,
            control_rx,
            event_tx,
            wake,
            pending_submit: false,
            rewind_requested: false,
            teardown_requested: false,
            stats: RenderStats::default(),
        })
    }

    /// Leave `Initializing` and publish the initial latency values.
    pub(crate) fn start(&mut self) {
        match self.source.requested_latency() {
            Some(latency) => self.apply_latency(Some(latency)),
            None => self.publish_latency(self.latency.published()),
        }

        self.set_state(PipelineState::Playing);
        let engine_state = self.source.current_state();
        if !engine_state.is_playing() {
            debug!("Engine starts {:?}, rendering silence", engine_state);
            self.set_state(PipelineState::Suspended);
        }
    }

    #[cfg(test)]
    pub(crate) const fn state(&self) -> PipelineState {
        self.state
    }

    #[cfg(test)]
    pub(crate) const fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Refill the device queue up to the latency target.
    pub(crate) fn render_tick(&mut self) -> TickOutcome {
        if !self.state.is_rendering() {
            return TickOutcome::Idle;
        }
        if self.rewind_requested {
            self.process_rewind();
        }

        // The device never holds more than N slots.
        for _ in 0..self.geometry.slot_count() {
            let outstanding = match self.tracker.outstanding_count(self.hardware.queue()) {
                Ok(outstanding) => outstanding,
                Err(e) => {
                    warn!("Buffer queue state query failed: hardware error {}", e.code());
                    self.stats.query_failures += 1;
                    return TickOutcome::QueryFailed;
                }
            };
            if outstanding >= self.latency.buffer_count() {
                return TickOutcome::Backpressure;
            }

            if !self.pending_submit {
                self.render_slot();
            }
            match self.submit_slot().map_err(|e| Error::hardware("enqueue", e)) {
                Ok(()) => {}
                Err(e) if !e.is_fatal() => {
                    trace!("Buffer queue full, retrying slot {}", self.ring.next_slot());
                    self.stats.queue_full += 1;
                    return TickOutcome::QueueFull;
                }
                Err(e) => {
                    self.fail(&e);
                    return TickOutcome::Fatal;
                }
            }
        }

        TickOutcome::Backpressure
    }

    /// Fill the slot at the cursor from the engine, or with silence.
    fn render_slot(&mut self) {
        let index = self.ring.next_slot();
        let slot_size = self.ring.slot_size();

        let chunk = if self.state == PipelineState::Playing {
            self.source.pull(slot_size)
        } else {
            None
        };
        match chunk {
            Some(chunk) => {
                let copied = self.ring.fill(index, &chunk);
                if copied < slot_size {
                    trace!("Short render: {} of {} bytes, padded", copied, slot_size);
                }
            }
            None => {
                self.ring.fill_silence(index);
                self.stats.silence_slots += 1;
            }
        }
        self.pending_submit = true;
    }

    /// Hand the slot at the cursor to the device and advance on success.
    fn submit_slot(&mut self) -> HwResult<()> {
        let index = self.ring.next_slot();
        self.hardware.queue_mut().enqueue(self.ring.slot(index))?;

        self.pending_submit = false;
        self.ring.advance();
        self.stats.submitted += 1;
        trace!("Submitted slot {}", index);
        Ok(())
    }

    fn process_rewind(&mut self) {
        debug!("Rewind, discarding pending slot: {}", self.pending_submit);
        self.rewind_requested = false;
        self.pending_submit = false;
        self.source.process_rewind();
    }

    /// Enter `Failed` and ask the owner, once, to tear the pipeline down.
    fn fail(&mut self, err: &Error) {
        error!("{err}, requesting teardown");
        self.set_state(PipelineState::Failed);

        if let Error::Hardware { operation, code } = *err {
            if !self.teardown_requested {
                self.teardown_requested = true;
                self.emit(PipelineEvent::TeardownRequested { operation, code });
            }
        }
    }

    fn set_engine_state(&mut self, engine_state: EngineState) {
        let next = match engine_state {
            EngineState::Playing => PipelineState::Playing,
            EngineState::Suspended => PipelineState::Suspended,
            EngineState::Initializing => return,
        };
        if self.state.can_transition_to(next) {
            self.set_state(next);
        }
    }

    fn apply_latency(&mut self, requested: Option<Duration>) {
        let update = self.latency.update(requested);
        self.publish_latency(update);
    }

    fn publish_latency(&mut self, update: LatencyUpdate) {
        self.emit(PipelineEvent::LatencyRange {
            min: update.min_latency,
            max: update.max_latency,
        });
        self.emit(PipelineEvent::MaxRequest(update.max_request));
        let latency = self.current_latency();
        self.emit(PipelineEvent::Latency(latency));
    }

    /// Outstanding slots times the slot duration.
    fn current_latency(&mut self) -> Duration {
        if self.state == PipelineState::Failed {
            return Duration::ZERO;
        }
        let outstanding = match self.tracker.outstanding_count(self.hardware.queue()) {
            Ok(outstanding) => outstanding,
            Err(e) => {
                warn!("Latency query failed: hardware error {}", e.code());
                self.tracker.last_observed()
            }
        };
        self.latency.latency_for(outstanding)
    }

    /// Returns false when the thread should exit.
    pub(crate) fn handle_control(&mut self, message: ControlMessage) -> bool {
        match message {
            ControlMessage::Shutdown => return false,
            ControlMessage::Rewind => self.rewind_requested = true,
            ControlMessage::SetEngineState(engine_state) => self.set_engine_state(engine_state),
            ControlMessage::RequestLatency(latency) => {
                if self.state.is_rendering() {
                    self.apply_latency(latency);
                }
            }
            ControlMessage::QueryLatency(reply) => {
                let _ = reply.send(self.current_latency());
            }
        }
        true
    }

    /// Render loop. Returns once shut down, hardware released.
    pub(crate) fn run(mut self) -> RenderStats {
        info!(
            "Render thread started: {} slots of {:?}",
            self.geometry.slot_count(),
            self.geometry.slot_duration()
        );
        let timeout = self.geometry.slot_duration();

        loop {
            if self.render_tick() == TickOutcome::Fatal {
                self.await_shutdown();
                break;
            }

            match wait_any(&self.wake, &self.control_rx, timeout) {
                WaitReason::Wake | WaitReason::Timeout => {}
                WaitReason::Control(message) => {
                    if !self.handle_control(message) {
                        info!("Render thread shutting down");
                        break;
                    }
                }
                WaitReason::Disconnected => {
                    debug!("Control channel closed, shutting down");
                    break;
                }
            }
        }

        self.shutdown()
    }

    /// After a failure nothing touches the device until the owner says so.
    fn await_shutdown(&mut self) {
        loop {
            match self.control_rx.recv() {
                Ok(ControlMessage::Shutdown) | Err(_) => break,
                Ok(ControlMessage::QueryLatency(reply)) => {
                    let _ = reply.send(Duration::ZERO);
                }
                Ok(message) => debug!("Ignoring {:?} in failed state", message),
            }
        }
    }

    /// Stop the player, clear the queue, release the hardware.
    pub(crate) fn shutdown(mut self) -> RenderStats {
        if self.state == PipelineState::Playing {
            self.set_state(PipelineState::Suspended);
        }
        self.hardware.release();
        self.set_state(PipelineState::Stopped);

        let stats = self.stats;
        info!(
            "Render thread stopped: {} slots submitted, {} silent, {} queue full, {} query failures",
            stats.submitted, stats.silence_slots, stats.queue_full, stats.query_failures
        );
        stats
    }

    fn set_state(&mut self, new_state: PipelineState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }
        if !old_state.can_transition_to(new_state) {
            warn!("Ignoring state change {:?} -> {:?}", old_state, new_state);
            return;
        }

        self.state = new_state;
        *self.shared_state.write() = new_state;
        debug!("State changed: {:?} -> {:?}", old_state, new_state);
        self.emit(PipelineEvent::StateChanged(new_state));
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.event_tx.send(event);
    }
}
