//! Completion → render-thread wake signal.
//!
//! The device calls [`CompletionNotifier::notify`] from its own callback
//! context each time a slot finishes playing. The render thread waits on the
//! matching [`WakeReceiver`]. Nothing else crosses this boundary.

use crossbeam_channel::{bounded, Receiver, Sender};

/// Create a connected notifier / receiver pair.
pub fn wake_channel() -> (CompletionNotifier, WakeReceiver) {
    let (tx, rx) = bounded(1);
    let keepalive = tx.clone();
    (CompletionNotifier { tx }, WakeReceiver { rx, _keepalive: keepalive })
}

/// Handle given to the hardware completion callback.
///
/// `notify` never blocks and never allocates: the channel has room for a
/// single token, and notifications that arrive while one is pending collapse
/// into it. The render thread re-queries the queue depth after every wake, so
/// a collapsed notification loses nothing.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    tx: Sender<()>,
}

impl CompletionNotifier {
    /// Tell the render thread something changed.
    #[inline]
    pub fn notify(&self) {
        // Full means a wake is already pending.
        let _ = self.tx.try_send(());
    }
}

/// Render-thread side of the wake signal.
#[derive(Debug)]
pub struct WakeReceiver {
    rx: Receiver<()>,
    /// Keeps the channel connected after the hardware drops its notifier.
    _keepalive: Sender<()>,
}

impl WakeReceiver {
    pub(crate) const fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

    /// Consume a pending wake token, if any.
    pub fn try_take(&self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests use unwrap for brevity
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_notifications_coalesce() {
        let (notifier, wake) = wake_channel();
        notifier.notify();
        notifier.notify();
        notifier.notify();

        assert!(wake.try_take());
        assert!(!wake.try_take());
    }

    #[test]
    fn test_survives_dropped_notifier() {
        let (notifier, wake) = wake_channel();
        drop(notifier);
        assert!(!wake.try_take());
        assert!(wake.receiver().try_recv().is_err());
    }

    #[test]
    fn test_notify_from_other_thread() {
        let (notifier, wake) = wake_channel();
        thread::spawn(move || notifier.notify()).join().unwrap();
        assert!(wake.try_take());
    }
}
