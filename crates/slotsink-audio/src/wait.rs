//! The render thread's wait primitive.
//!
//! Blocks until the first of: a completion wake, a control message, or the
//! timeout. The timeout bounds how long a missed completion can stall the loop.

use std::time::Duration;

use crossbeam_channel::{select, Receiver};

use crate::control::ControlMessage;
use crate::wake::WakeReceiver;

/// Why [`wait_any`] returned.
#[derive(Debug)]
pub enum WaitReason {
    /// A slot completed.
    Wake,
    /// A control message arrived.
    Control(ControlMessage),
    /// Nothing happened within the timeout.
    Timeout,
    /// Every control sender is gone.
    Disconnected,
}

/// Wait on the wake signal and the control channel with an upper bound.
pub fn wait_any(
    wake: &WakeReceiver,
    control: &Receiver<ControlMessage>,
    timeout: Duration,
) -> WaitReason {
    select! {
        recv(control) -> msg => match msg {
            Ok(msg) => WaitReason::Control(msg),
            Err(_) => WaitReason::Disconnected,
        },
        recv(wake.receiver()) -> _ => WaitReason::Wake,
        default(timeout) => WaitReason::Timeout,
    }
}
