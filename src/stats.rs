//! Dispatch counters shared between the dispatch loop and its workers.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated as events move through the router.
#[derive(Debug, Default)]
pub struct DispatchStats {
    events_received: AtomicU64,
    events_completed: AtomicU64,
    events_skipped: AtomicU64,
    handlers_invoked: AtomicU64,
    handler_failures: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Events dequeued by the dispatch loop
    pub events_received: u64,
    /// Executions that have returned their token
    pub events_completed: u64,
    /// Completed events that were malformed or had no handlers
    pub events_skipped: u64,
    pub handlers_invoked: u64,
    pub handler_failures: u64,
}

impl StatsSnapshot {
    /// Events dequeued whose execution has not finished yet.
    pub fn in_flight(&self) -> u64 {
        self.events_received.saturating_sub(self.events_completed)
    }
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.events_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invocation(&self, failed: bool) {
        self.handlers_invoked.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.handler_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_completed(&self) {
        self.events_completed.fetch_add(1, Ordering::Release);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_completed: self.events_completed.load(Ordering::Acquire),
            events_skipped: self.events_skipped.load(Ordering::Relaxed),
            handlers_invoked: self.handlers_invoked.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
        }
    }
}
