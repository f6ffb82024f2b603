//! Scripted hardware and engine doubles for deterministic tests.
//!
//! Nothing here runs on its own clock: tests decide when slots complete
//! (`ScriptHandle::complete`) and which calls fail.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use slotsink_core::{HwError, HwResult};

use crate::control::EngineState;
use crate::hardware::{Backend, BufferQueue, HwObject, PlayState, Player, PlayerParams};
use crate::source::AudioSource;
use crate::wake::CompletionNotifier;

/// Everything the scripted device recorded or was told to do.
#[derive(Debug, Default)]
pub struct ScriptState {
    /// Lifecycle calls, in order.
    pub log: Vec<String>,
    /// Accepted slots, in submission order.
    pub submitted: Vec<Vec<u8>>,
    pub outstanding: usize,
    pub capacity: usize,
    /// Results returned by the next enqueue calls before normal behaviour.
    pub enqueue_script: VecDeque<HwResult<()>>,
    /// Errors returned by the next queue-state queries.
    pub query_failures: VecDeque<HwError>,
    /// Fail the named creation step with this code.
    pub fail_create: Option<(&'static str, u32)>,
    /// Fail the next switch to `PlayState::Playing`.
    pub fail_play: Option<u32>,
    pub play_state: Option<PlayState>,
    pub notifier: Option<CompletionNotifier>,
    /// Every enqueue attempt, accepted or not.
    pub submit_calls: usize,
    /// Highest outstanding count ever reached.
    pub max_outstanding: usize,
}

/// Shared view of a [`ScriptState`].
#[derive(Debug, Clone)]
pub struct ScriptHandle(Arc<Mutex<ScriptState>>);

impl ScriptHandle {
    fn new(capacity: usize) -> Self {
        Self(Arc::new(Mutex::new(ScriptState {
            capacity,
            ..ScriptState::default()
        })))
    }

    pub fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.0.lock()
    }

    /// Finish playing up to `n` slots and fire the completion notifier.
    pub fn complete(&self, n: usize) {
        let notifier = {
            let mut state = self.state();
            state.outstanding = state.outstanding.saturating_sub(n);
            state.notifier.clone()
        };
        if let Some(notifier) = notifier {
            notifier.notify();
        }
    }
}

/// Buffer queue that records every call.
pub struct ScriptedQueue {
    handle: ScriptHandle,
}

impl ScriptedQueue {
    pub fn new(capacity: usize) -> (Self, ScriptHandle) {
        let handle = ScriptHandle::new(capacity);
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl BufferQueue for ScriptedQueue {
    fn enqueue(&mut self, data: &[u8]) -> HwResult<()> {
        let mut state = self.handle.state();
        state.submit_calls += 1;
        if let Some(Err(e)) = state.enqueue_script.pop_front() {
            return Err(e);
        }
        if state.outstanding >= state.capacity {
            return Err(HwError::BufferInsufficient);
        }

        state.submitted.push(data.to_vec());
        state.outstanding += 1;
        state.max_outstanding = state.max_outstanding.max(state.outstanding);
        Ok(())
    }

    fn queued(&self) -> HwResult<usize> {
        let mut state = self.handle.state();
        match state.query_failures.pop_front() {
            Some(e) => Err(e),
            None => Ok(state.outstanding),
        }
    }

    fn clear(&mut self) -> HwResult<()> {
        let mut state = self.handle.state();
        state.outstanding = 0;
        state.log.push("clear".into());
        Ok(())
    }

    fn set_play_state(&mut self, play_state: PlayState) -> HwResult<()> {
        let mut state = self.handle.state();
        if play_state == PlayState::Playing {
            if let Some(code) = state.fail_play.take() {
                return Err(HwError::from_code(code));
            }
        }
        let entry = match play_state {
            PlayState::Playing => "play",
            PlayState::Stopped => "stop",
        };
        state.log.push(entry.into());
        state.play_state = Some(play_state);
        Ok(())
    }
}

struct ScriptedObject {
    name: &'static str,
    handle: ScriptHandle,
}

impl HwObject for ScriptedObject {
    fn name(&self) -> &'static str {
        self.name
    }

    fn destroy(&mut self) {
        self.handle.state().log.push(format!("destroy {}", self.name));
    }
}

/// Backend whose objects log into a shared [`ScriptState`].
pub struct ScriptedBackend {
    handle: ScriptHandle,
}

impl ScriptedBackend {
    pub fn new(capacity: usize) -> (Self, ScriptHandle) {
        let handle = ScriptHandle::new(capacity);
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }

    fn create(&self, step: &'static str, name: &'static str) -> HwResult<Box<dyn HwObject>> {
        let mut state = self.handle.state();
        if let Some((failing, code)) = state.fail_create {
            if failing == step {
                return Err(HwError::from_code(code));
            }
        }
        state.log.push(step.into());
        Ok(Box::new(ScriptedObject {
            name,
            handle: self.handle.clone(),
        }))
    }
}

impl Backend for ScriptedBackend {
    fn create_engine(&mut self) -> HwResult<Box<dyn HwObject>> {
        self.create("create engine", "engine")
    }

    fn create_output_mix(&mut self) -> HwResult<Box<dyn HwObject>> {
        self.create("create output mix", "output mix")
    }

    fn create_player(
        &mut self,
        _params: &PlayerParams,
        notifier: CompletionNotifier,
    ) -> HwResult<Player> {
        let object = self.create("create player", "player")?;
        self.handle.state().notifier = Some(notifier);
        Ok(Player {
            object,
            queue: Box::new(ScriptedQueue {
                handle: self.handle.clone(),
            }),
        })
    }
}

/// What a [`ScriptedSource`] has been asked to do.
#[derive(Debug, Default)]
pub struct SourceState {
    pub pulls: usize,
    pub rewinds: usize,
    /// Next byte of the counting pattern.
    pub next: u8,
    pub engine_state: EngineState,
    pub requested_latency: Option<Duration>,
    /// Return `None` from every pull.
    pub exhausted: bool,
}

/// Engine double producing a counting byte pattern.
#[derive(Clone)]
pub struct ScriptedSource(Arc<Mutex<SourceState>>);

impl ScriptedSource {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(SourceState {
            engine_state: EngineState::Playing,
            ..SourceState::default()
        })))
    }

    pub fn state(&self) -> MutexGuard<'_, SourceState> {
        self.0.lock()
    }

    /// The first `len` bytes the source produces.
    pub fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| i as u8).collect()
    }
}

impl AudioSource for ScriptedSource {
    fn pull(&mut self, n_bytes: usize) -> Option<Bytes> {
        let mut state = self.state();
        state.pulls += 1;
        if state.exhausted {
            return None;
        }

        let start = state.next;
        state.next = start.wrapping_add(n_bytes as u8);
        Some((0..n_bytes).map(|i| start.wrapping_add(i as u8)).collect())
    }

    fn process_rewind(&mut self) {
        self.state().rewinds += 1;
    }

    fn current_state(&self) -> EngineState {
        self.state().engine_state
    }

    fn requested_latency(&self) -> Option<Duration> {
        self.state().requested_latency
    }
}
