//! # Odds Feed Types
//!
//! Shared vocabulary for every crate of the feed consumer:
//!
//! - **Identifiers**: [`Urn`] (`sr:match:123`) for events, sports and producers
//! - **Feed messages**: [`MessageKind`] and the structured [`FeedMessage`] handed
//!   over by the message receiver after deserialization
//! - **Message interests**: [`MessageInterest`] groups of routing keys a session
//!   listens to
//! - **Domain events**: typed events fanned out to application subscribers
//! - **Time**: the [`Clock`] seam used by every freshness and timeout decision
//! - **Metrics**: the [`FeedMetrics`] context passed down from the composition root
//! - **Subscribers**: isolated multicast lists used for every application callback
//!
//! ## Usage
//!
//! ```rust
//! use feed_types::{MessageInterest, Urn};
//!
//! let event: Urn = "sr:match:12345".parse().unwrap();
//! assert_eq!(event.id(), 12345);
//!
//! let keys = MessageInterest::LiveMessagesOnly.routing_keys(None);
//! assert!(keys.iter().any(|k| k.starts_with("*.*.live")));
//! ```

pub mod errors;
pub mod events;
pub mod identifiers;
pub mod interest;
pub mod messages;
pub mod metrics;
pub mod subscribers;
pub mod time;

pub use errors::{IdentifierError, InterestError};
pub use events::*;
pub use identifiers::Urn;
pub use interest::MessageInterest;
pub use messages::{FeedMessage, MessageKind, ProducerScope, RequestIdUsage};
pub use metrics::{FeedMetrics, FeedMetricsSnapshot};
pub use subscribers::{NotifyOutcome, SubscriptionId, Subscribers};
pub use time::{Clock, ManualClock, SystemClock};
