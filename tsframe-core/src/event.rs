//! Event channel from a session's worker thread to whoever owns the session.
//!
//! Events are `{kind, arg1, arg2}` triples. The owner may already be gone;
//! sends to a closed channel are dropped silently.

use tokio::sync::mpsc;

/// What happened. The meaning of `arg1`/`arg2` depends on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Session thread started. No args.
    Started,
    /// Connection established. No args.
    Connected,
    /// Non-productive read, backing off. arg1 = bytes pending in the current frame.
    Backoff,
    /// Frame or read unit scored malformed. Blocking: arg1/arg2 = first two bytes.
    /// Non-blocking: arg1 = read size.
    Malformed,
    /// Transport error mid-stream. No args.
    ReadFailed,
    /// Session closed. arg1 = attempts, arg2 = well-formed.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEvent {
    pub kind: EventKind,
    pub arg1: u64,
    pub arg2: u64,
}

pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Sending half handed to the worker. A sink without a channel discards everything.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventSink {
    /// New sink plus the receiver the owner drains.
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn notify(&self, kind: EventKind, arg1: u64, arg2: u64) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(SessionEvent { kind, arg1, arg2 });
        }
    }
}
