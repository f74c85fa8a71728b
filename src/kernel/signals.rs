use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use super::Pid;

/// A coalescing wake-up: any number of `notify` calls before the
/// receiver wakes collapse into one re-scan.
#[derive(Clone)]
pub struct Wakeup {
    sender: Sender<()>,
    receiver: Receiver<()>,
}

impl Wakeup {
    fn new() -> Wakeup {
        let (sender, receiver) = bounded(1);
        Wakeup { sender, receiver }
    }

    pub fn notify(&self) {
        match self.sender.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => unreachable!("wakeup owns its receiver"),
        }
    }

    /// Blocks until notified or until `fallback` elapses. Returns
    /// `false` only on timeout.
    pub fn wait(&self, fallback: Duration) -> bool {
        match self.receiver.recv_timeout(fallback) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => unreachable!("wakeup owns its sender"),
        }
    }

    /// For waiting on this wakeup alongside other channels.
    pub fn receiver(&self) -> Receiver<()> {
        self.receiver.clone()
    }
}

/// A process entered BLOCKED for its `visit`-th time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockedEntry {
    pub pid: Pid,
    pub visit: u32,
}

/// Channels the scheduling tiers use to wake each other.
pub struct Signals {
    pub long_term: Wakeup,
    pub short_term: Wakeup,
    /// Only fired on shutdown; new work reaches the medium-term tier as
    /// blocked entries.
    pub medium_term: Wakeup,
    blocked_sender: Sender<BlockedEntry>,
    blocked_receiver: Receiver<BlockedEntry>,
}

impl Signals {
    pub fn new() -> Signals {
        let (blocked_sender, blocked_receiver) = unbounded();
        Signals {
            long_term: Wakeup::new(),
            short_term: Wakeup::new(),
            medium_term: Wakeup::new(),
            blocked_sender,
            blocked_receiver,
        }
    }

    pub fn process_blocked(&self, entry: BlockedEntry) {
        // The receiver lives as long as `self`.
        let _ = self.blocked_sender.send(entry);
    }

    pub fn blocked_entries(&self) -> Receiver<BlockedEntry> {
        self.blocked_receiver.clone()
    }
}

impl Default for Signals {
    fn default() -> Self {
        Signals::new()
    }
}
