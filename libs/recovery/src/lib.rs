//! # Feed Recovery
//!
//! Decides *when* the feed consumer must ask the upstream to replay data:
//!
//! - [`Producer`] / [`ProducerManager`]: upstream sources and their registry,
//!   frozen once the feed opens
//! - [`TimestampTracker`]: system heartbeat and per-interest content freshness
//! - [`RecoveryOperation`]: the per-producer request/complete/timeout state machine
//! - [`ProducerRecoveryManager`] / [`FeedRecoveryManager`]: watchdog-driven
//!   coordination publishing [`ProducerStatusChange`] events
//!
//! Network I/O goes through the [`RecoveryRequestIssuer`] seam and time through
//! [`feed_types::Clock`] and [`Timer`], so the whole crate runs deterministically
//! under test.

pub mod error;
pub mod feed_recovery;
pub mod issuer;
pub mod operation;
pub mod producer;
pub mod producer_manager;
pub mod producer_recovery;
pub mod timer;
pub mod timestamp_tracker;

pub use error::{CommunicationError, ProducerError, RecoveryError, Result};
pub use feed_recovery::{FeedRecoveryManager, MessageObserver};
pub use issuer::RecoveryRequestIssuer;
pub use operation::{RecoveryKind, RecoveryOperation, RecoveryResult, StartOutcome};
pub use producer::{
    Producer, ProducerDescriptor, ProducerState, ProducerTiming, UNKNOWN_PRODUCER_ID,
};
pub use producer_manager::ProducerManager;
pub use producer_recovery::{
    ProducerRecoveryManager, ProducerStatusChange, ProducerStatusReason, RecoveryStatus,
};
pub use timer::{IntervalTimer, ManualTimer, TickFn, Timer};
pub use timestamp_tracker::TimestampTracker;
