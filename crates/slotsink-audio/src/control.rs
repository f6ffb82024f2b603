//! Messages between the sink owner and the render thread.

use std::time::Duration;

use crossbeam_channel::Sender;

/// Engine-side playback state, as reported by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Initializing,
    Playing,
    Suspended,
}

impl EngineState {
    /// Whether the engine is producing audio the sink should pull.
    pub const fn is_playing(self) -> bool {
        matches!(self, Self::Playing)
    }
}

/// State of the render pipeline.
///
/// `Initializing → Playing ⇄ Suspended`, any state `→ Failed` on an
/// unrecoverable hardware error, and `Failed | Suspended → Stopped` on
/// shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Initializing,
    Playing,
    Suspended,
    Failed,
    Stopped,
}

impl PipelineState {
    /// Whether the render loop fills and submits slots in this state.
    pub const fn is_rendering(self) -> bool {
        matches!(self, Self::Playing | Self::Suspended)
    }

    /// Whether `self → next` is an edge of the state machine.
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Stopped, _) => false,
            (_, Self::Failed) => !matches!(self, Self::Failed),
            (Self::Initializing | Self::Suspended, Self::Playing) => true,
            (Self::Playing, Self::Suspended) => true,
            (Self::Failed | Self::Suspended, Self::Stopped) => true,
            _ => false,
        }
    }
}

/// Requests routed into the render thread.
///
/// Everything that touches the ring, the hardware, or the latency target goes
/// through here so those stay owned by a single thread.
#[derive(Debug)]
pub enum ControlMessage {
    /// Stop the player, clear the queue, release hardware, exit.
    Shutdown,
    /// Discard whatever was about to be submitted and start fresh.
    Rewind,
    /// The engine entered a new state.
    SetEngineState(EngineState),
    /// The engine wants a new target latency; `None` means unspecified.
    RequestLatency(Option<Duration>),
    /// Reply with the current latency (outstanding slots × slot duration).
    QueryLatency(Sender<Duration>),
}

/// Notifications published by the render thread to the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Pipeline state changed.
    StateChanged(PipelineState),
    /// Latency range the sink can honour.
    LatencyRange { min: Duration, max: Duration },
    /// Largest single request the engine should expect, in bytes.
    MaxRequest(usize),
    /// Measured latency at the time of a latency update.
    Latency(Duration),
    /// The pipeline hit an unrecoverable hardware error and must be torn down.
    TeardownRequested { operation: &'static str, code: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_edges() {
        use PipelineState::*;

        assert!(Initializing.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Suspended));
        assert!(Suspended.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Failed));
        assert!(Suspended.can_transition_to(Stopped));
        assert!(Failed.can_transition_to(Stopped));

        assert!(!Playing.can_transition_to(Stopped));
        assert!(!Failed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Playing));
        assert!(!Stopped.can_transition_to(Playing));
        assert!(!Initializing.can_transition_to(Stopped));
    }

    #[test]
    fn test_rendering_states() {
        assert!(PipelineState::Playing.is_rendering());
        assert!(PipelineState::Suspended.is_rendering());
        assert!(!PipelineState::Failed.is_rendering());
        assert!(!PipelineState::Initializing.is_rendering());
        assert!(!EngineState::Suspended.is_playing());
    }
}
