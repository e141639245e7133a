//! Feed metrics context
//!
//! Created once at the composition root and handed down as `Arc<FeedMetrics>`
//! to sessions, dispatchers and recovery managers. All counters are relaxed
//! atomics; they are for monitoring, not for synchronisation.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct FeedMetrics {
    pub messages_received: AtomicU64,
    pub messages_unparsable: AtomicU64,
    pub validation_problems: AtomicU64,
    pub messages_dispatched: AtomicU64,
    pub messages_without_dispatcher: AtomicU64,
    pub messages_from_disabled_producers: AtomicU64,
    pub mapping_failures: AtomicU64,
    pub handler_panics: AtomicU64,

    pub recoveries_started: AtomicU64,
    pub recoveries_completed: AtomicU64,
    pub recoveries_timed_out: AtomicU64,
    pub recoveries_rejected: AtomicU64,

    pub producers_down: AtomicU64,
    pub producers_up: AtomicU64,
}

/// Point-in-time copy of [`FeedMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedMetricsSnapshot {
    pub messages_received: u64,
    pub messages_unparsable: u64,
    pub validation_problems: u64,
    pub messages_dispatched: u64,
    pub messages_without_dispatcher: u64,
    pub messages_from_disabled_producers: u64,
    pub mapping_failures: u64,
    pub handler_panics: u64,
    pub recoveries_started: u64,
    pub recoveries_completed: u64,
    pub recoveries_timed_out: u64,
    pub recoveries_rejected: u64,
    pub producers_down: u64,
    pub producers_up: u64,
}

impl FeedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by one
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FeedMetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        FeedMetricsSnapshot {
            messages_received: load(&self.messages_received),
            messages_unparsable: load(&self.messages_unparsable),
            validation_problems: load(&self.validation_problems),
            messages_dispatched: load(&self.messages_dispatched),
            messages_without_dispatcher: load(&self.messages_without_dispatcher),
            messages_from_disabled_producers: load(&self.messages_from_disabled_producers),
            mapping_failures: load(&self.mapping_failures),
            handler_panics: load(&self.handler_panics),
            recoveries_started: load(&self.recoveries_started),
            recoveries_completed: load(&self.recoveries_completed),
            recoveries_timed_out: load(&self.recoveries_timed_out),
            recoveries_rejected: load(&self.recoveries_rejected),
            producers_down: load(&self.producers_down),
            producers_up: load(&self.producers_up),
        }
    }
}
