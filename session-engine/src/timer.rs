//! Per-peer timer wheel (spec §4.4): a small ordered set of `(kind, deadline)` tuples.
//! Fleet sizes are in the hundreds and each peer carries at most eight timer kinds, so a
//! sorted `Vec` beats a heap on both simplicity and cache behaviour.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Hold,
    SendHold,
    Keepalive,
    ConnectRetry,
    IdleHold,
    IdleHoldReset,
    CarpUndemote,
    RestartTimeout,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    kind: TimerKind,
    deadline: Instant,
}

/// An ordered set of armed timers for one peer. `set` is idempotent: re-arming a kind
/// replaces its previous deadline rather than adding a second entry.
#[derive(Debug, Default)]
pub struct TimerWheel {
    entries: Vec<Entry>,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn set(&mut self, kind: TimerKind, after: Duration) {
        self.set_at(kind, Instant::now() + after);
    }

    pub fn set_at(&mut self, kind: TimerKind, deadline: Instant) {
        self.stop(kind);
        self.entries.push(Entry { kind, deadline });
    }

    pub fn stop(&mut self, kind: TimerKind) {
        self.entries.retain(|entry| entry.kind != kind);
    }

    pub fn stop_all(&mut self) {
        self.entries.clear();
    }

    pub fn running(&self, kind: TimerKind) -> bool {
        self.entries.iter().any(|entry| entry.kind == kind)
    }

    /// The earliest deadline across every armed timer, if any are armed.
    pub fn next_due_at(&self) -> Option<Instant> {
        self.entries.iter().map(|entry| entry.deadline).min()
    }

    /// Removes and returns the first timer whose deadline has passed, if any. Callers loop
    /// this until it returns `None` to drain every timer due in the same pass.
    pub fn next_due(&mut self, now: Instant) -> Option<TimerKind> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.deadline <= now)?;
        Some(self.entries.remove(index).kind)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
