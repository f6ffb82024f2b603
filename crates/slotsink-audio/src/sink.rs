//! Owner handle for a running pipeline.
//!
//! [`SlotSink::start`] spawns the render thread, which realizes the hardware
//! itself (device handles are not necessarily `Send`) and reports back before
//! `start` returns. After that the handle only talks to the thread through
//! the control channel and reads the mirrored state.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use slotsink_core::{Error, Result, SlotGeometry};
use tracing::{debug, error, info, warn};

use crate::control::{ControlMessage, EngineState, PipelineEvent, PipelineState};
use crate::hardware::Backend;
use crate::source::AudioSource;
use crate::worker::{RenderStats, RenderWorker};

/// How long hardware bring-up may take.
const INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a latency query waits for the render thread.
const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// A running sink pipeline.
pub struct SlotSink {
    control_tx: Sender<ControlMessage>,
    event_rx: Receiver<PipelineEvent>,
    state: Arc<RwLock<PipelineState>>,
    geometry: SlotGeometry,
    thread: Option<JoinHandle<RenderStats>>,
}

impl SlotSink {
    /// Bring up the hardware on a new render thread and start rendering.
    ///
    /// Returns the bring-up error if any hardware object cannot be created;
    /// whatever was created by then has been released.
    pub fn start<B, S>(geometry: SlotGeometry, backend: B, source: S) -> Result<Self>
    where
        B: Backend + 'static,
        S: AudioSource + 'static,
    {
        let (control_tx, control_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let (init_tx, init_rx) = bounded::<Result<()>>(1);
        let state = Arc::new(RwLock::new(PipelineState::Initializing));

        let thread_state = state.clone();
        let mut backend = backend;
        let thread = thread::Builder::new()
            .name("slotsink-render".to_string())
            .spawn(move || {
                match RenderWorker::open(
                    geometry,
                    &mut backend,
                    Box::new(source),
                    thread_state,
                    control_rx,
                    event_tx,
                ) {
                    Ok(mut worker) => {
                        worker.start();
                        let _ = init_tx.send(Ok(()));
                        worker.run()
                    }
                    Err(e) => {
                        let _ = init_tx.send(Err(e));
                        RenderStats::default()
                    }
                }
            })
            .map_err(|e| Error::Thread(format!("failed to spawn render thread: {e}")))?;

        match init_rx.recv_timeout(INIT_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(RecvTimeoutError::Timeout) => {
                error!("Hardware bring-up timed out after {:?}", INIT_TIMEOUT);
                let _ = control_tx.send(ControlMessage::Shutdown);
                return Err(Error::Thread("hardware bring-up timed out".into()));
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
                return Err(Error::Thread("render thread exited during bring-up".into()));
            }
        }

        info!(
            "Sink started: {} | {} slots x {} bytes",
            geometry.spec(),
            geometry.slot_count(),
            geometry.slot_size()
        );

        Ok(Self {
            control_tx,
            event_rx,
            state,
            geometry,
            thread: Some(thread),
        })
    }

    pub const fn geometry(&self) -> &SlotGeometry {
        &self.geometry
    }

    /// Current pipeline state.
    pub fn state(&self) -> PipelineState {
        *self.state.read()
    }

    /// Events published by the render thread.
    pub const fn events(&self) -> &Receiver<PipelineEvent> {
        &self.event_rx
    }

    fn send(&self, message: ControlMessage) -> Result<()> {
        self.control_tx
            .send(message)
            .map_err(|_| Error::Disconnected)
    }

    /// The engine stopped producing audio; keep the device fed with silence.
    pub fn suspend(&self) -> Result<()> {
        self.set_engine_state(EngineState::Suspended)
    }

    pub fn resume(&self) -> Result<()> {
        self.set_engine_state(EngineState::Playing)
    }

    pub fn set_engine_state(&self, state: EngineState) -> Result<()> {
        self.send(ControlMessage::SetEngineState(state))
    }

    /// Ask for a new target latency; `None` uses the configured maximum.
    pub fn request_latency(&self, latency: Option<Duration>) -> Result<()> {
        self.send(ControlMessage::RequestLatency(latency))
    }

    /// Discard the slot about to be submitted and rewind the source.
    pub fn rewind(&self) -> Result<()> {
        self.send(ControlMessage::Rewind)
    }

    /// Audio currently queued in the device, as time.
    pub fn latency(&self) -> Result<Duration> {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(ControlMessage::QueryLatency(reply_tx))?;

        reply_rx.recv_timeout(REPLY_TIMEOUT).map_err(|e| match e {
            RecvTimeoutError::Timeout => Error::Thread("latency query timed out".into()),
            RecvTimeoutError::Disconnected => Error::Disconnected,
        })
    }

    /// Stop the pipeline and wait for the render thread to exit.
    ///
    /// Later calls return empty statistics.
    pub fn shutdown(&mut self) -> Result<RenderStats> {
        let Some(thread) = self.thread.take() else {
            return Ok(RenderStats::default());
        };

        debug!("Shutting down sink");
        if self.control_tx.send(ControlMessage::Shutdown).is_err() {
            debug!("Render thread already gone");
        }
        thread
            .join()
            .map_err(|_| Error::Thread("render thread panicked".into()))
    }
}

impl Drop for SlotSink {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Sink shutdown failed: {e}");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests use unwrap for brevity
mod tests {
    use super::*;
    use crate::hardware::sim::SimulatedBackend;
    use crate::testing::{ScriptedBackend, ScriptedSource};
    use parking_lot::Mutex;
    use slotsink_core::{HwError, SinkConfig};
    use std::time::Instant;

    fn geometry(modargs: &str) -> SlotGeometry {
        SinkConfig::from_modargs(modargs)
            .unwrap()
            .geometry()
            .unwrap()
    }

    fn wait_for_event(sink: &SlotSink, wanted: &PipelineEvent) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match sink.events().recv_timeout(left) {
                Ok(event) if &event == wanted => return true,
                Ok(_) => {}
                Err(_) => return false,
            }
        }
        false
    }

    #[test]
    fn test_start_and_shutdown() {
        let geometry = geometry("format=u8 rate=8000 channels=2");
        let (backend, device) = ScriptedBackend::new(geometry.slot_count());

        let mut sink = SlotSink::start(geometry, backend, ScriptedSource::new()).unwrap();
        assert_eq!(sink.state(), PipelineState::Playing);
        assert_eq!(sink.latency().unwrap(), Duration::from_millis(10));

        let stats = sink.shutdown().unwrap();
        assert_eq!(stats.submitted, 1);
        assert_eq!(sink.state(), PipelineState::Stopped);
        assert!(device.state().log.ends_with(&[
            "stop".to_string(),
            "clear".to_string(),
            "destroy player".to_string(),
            "destroy output mix".to_string(),
            "destroy engine".to_string()
        ]));

        assert_eq!(sink.shutdown().unwrap(), RenderStats::default());
        assert!(matches!(sink.latency(), Err(Error::Disconnected)));
    }

    #[test]
    fn test_init_failure_is_returned() {
        let geometry = geometry("format=u8 rate=8000 channels=2");
        let (backend, device) = ScriptedBackend::new(geometry.slot_count());
        device.state().fail_create = Some(("create player", HwError::FEATURE_UNSUPPORTED));

        let result = SlotSink::start(geometry, backend, ScriptedSource::new());
        assert_eq!(
            result.err().and_then(|e| e.hardware_code()),
            Some(HwError::FEATURE_UNSUPPORTED)
        );
        assert_eq!(
            device.state().log,
            vec![
                "create engine",
                "create output mix",
                "destroy output mix",
                "destroy engine"
            ]
        );
    }

    #[test]
    fn test_fatal_error_requests_teardown() {
        let geometry = geometry("format=u8 rate=8000 channels=2");
        let (backend, device) = ScriptedBackend::new(geometry.slot_count());
        device
            .state()
            .enqueue_script
            .push_back(Err(HwError::Code(HwError::RESOURCE_LOST)));

        let mut sink = SlotSink::start(geometry, backend, ScriptedSource::new()).unwrap();
        assert!(wait_for_event(
            &sink,
            &PipelineEvent::TeardownRequested {
                operation: "enqueue",
                code: HwError::RESOURCE_LOST,
            }
        ));
        assert_eq!(sink.state(), PipelineState::Failed);
        assert_eq!(sink.latency().unwrap(), Duration::ZERO);

        sink.shutdown().unwrap();
        assert_eq!(sink.state(), PipelineState::Stopped);
        assert_eq!(device.state().submit_calls, 1);
    }

    #[test]
    fn test_suspend_and_resume() {
        let geometry = geometry("format=u8 rate=8000 channels=2");
        let (backend, _device) = ScriptedBackend::new(geometry.slot_count());
        let sink = SlotSink::start(geometry, backend, ScriptedSource::new()).unwrap();

        sink.suspend().unwrap();
        assert!(wait_for_event(
            &sink,
            &PipelineEvent::StateChanged(PipelineState::Suspended)
        ));
        sink.resume().unwrap();
        assert!(wait_for_event(
            &sink,
            &PipelineEvent::StateChanged(PipelineState::Playing)
        ));
    }

    #[test]
    fn test_latency_request_republishes() {
        let geometry = geometry("format=u8 rate=8000 channels=2");
        let (backend, _device) = ScriptedBackend::new(geometry.slot_count());
        let sink = SlotSink::start(geometry, backend, ScriptedSource::new()).unwrap();

        sink.request_latency(Some(Duration::from_millis(55))).unwrap();
        assert!(wait_for_event(&sink, &PipelineEvent::MaxRequest(160 * 5)));
        assert_eq!(sink.latency().unwrap(), Duration::from_millis(50));
    }

    #[test]
    fn test_drop_releases_hardware() {
        let geometry = geometry("format=u8 rate=8000 channels=2");
        let (backend, device) = ScriptedBackend::new(geometry.slot_count());
        let sink = SlotSink::start(geometry, backend, ScriptedSource::new()).unwrap();

        drop(sink);
        assert_eq!(device.state().log.last().map(String::as_str), Some("destroy engine"));
    }

    #[test]
    fn test_simulated_device_plays_in_order() {
        // 40-byte slots of 5 ms
        let geometry = geometry("format=u8 rate=8000 channels=1 slot_usec=5000");
        let played = Arc::new(Mutex::new(Vec::new()));
        let tap = played.clone();
        let backend =
            SimulatedBackend::with_tap(move |slot: &[u8]| tap.lock().extend_from_slice(slot));

        let source = ScriptedSource::new();
        source.state().requested_latency = Some(Duration::from_millis(20));
        let mut sink = SlotSink::start(geometry, backend, source).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while played.lock().len() < 400 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let stats = sink.shutdown().unwrap();

        let played = played.lock();
        assert!(played.len() >= 400);
        assert_eq!(played[..400], ScriptedSource::pattern(400)[..]);
        assert_eq!(stats.queue_full, 0);
    }
}
