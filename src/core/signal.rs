//! Single-slot control mailbox between a controller and a running execution.
//!
//! The slot holds at most one pending [`Signal`]. Sending overwrites whatever
//! is still undelivered, so two signals sent between two drains coalesce and
//! only the later one is observed. This is lossy on purpose: the execution
//! only ever cares about the most recent instruction.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

pub const PAUSE: &str = "pause";
pub const RESUME: &str = "resume";
pub const STOP: &str = "stop";

/// A named, optionally-payloaded control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: String,
    pub payload: Option<String>,
}

impl Signal {
    pub fn custom(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
        }
    }

    pub fn pause() -> Self {
        Self::custom(PAUSE)
    }

    pub fn resume() -> Self {
        Self::custom(RESUME)
    }

    pub fn stop() -> Self {
        Self::custom(STOP)
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// `pause`, `resume` and `stop` are understood by every execution.
    pub fn is_builtin(&self) -> bool {
        is_builtin(&self.kind)
    }
}

pub fn is_builtin(kind: &str) -> bool {
    matches!(kind, PAUSE | RESUME | STOP)
}

/// The receiving end of the mailbox, owned by the execution.
#[derive(Debug, Default)]
pub struct SignalChannel {
    slot: Arc<Mutex<Option<Signal>>>,
}

/// The sending end, handed to the controller. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SignalSender {
    slot: Arc<Mutex<Option<Signal>>>,
}

impl SignalChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self) -> SignalSender {
        SignalSender {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Takes the pending signal, if any. Never blocks.
    pub fn try_receive(&self) -> Option<Signal> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl SignalSender {
    /// Places `signal` in the slot, returning the undelivered one it replaced.
    pub fn send(&self, signal: Signal) -> Option<Signal> {
        let displaced = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(signal);
        if let Some(ref lost) = displaced {
            log::debug!("Signal '{}' coalesced before delivery", lost.kind);
        }
        displaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_channel_yields_nothing() {
        let channel = SignalChannel::new();
        assert_eq!(channel.try_receive(), None);
        assert!(!channel.is_pending());
    }

    #[test]
    fn test_receive_clears_slot() {
        let channel = SignalChannel::new();
        channel.sender().send(Signal::pause());
        assert_eq!(channel.try_receive(), Some(Signal::pause()));
        assert_eq!(channel.try_receive(), None);
    }

    #[test]
    fn test_later_send_coalesces_earlier() {
        let channel = SignalChannel::new();
        let sender = channel.sender();

        assert_eq!(sender.send(Signal::custom("direction")), None);
        let displaced = sender.send(Signal::stop());
        assert_eq!(displaced, Some(Signal::custom("direction")));

        assert_eq!(channel.try_receive(), Some(Signal::stop()));
        assert_eq!(channel.try_receive(), None);
    }

    #[test]
    fn test_send_from_other_thread_is_visible() {
        let channel = SignalChannel::new();
        let sender = channel.sender();
        std::thread::spawn(move || {
            sender.send(Signal::custom("direction").with_payload("reverse"));
        })
        .join()
        .unwrap();

        let got = channel.try_receive().unwrap();
        assert_eq!(got.kind, "direction");
        assert_eq!(got.payload.as_deref(), Some("reverse"));
        assert!(!got.is_builtin());
    }
}
