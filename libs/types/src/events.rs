//! Typed domain events delivered to application subscribers
//!
//! The message mapper builds these from a [`FeedMessage`](crate::FeedMessage)
//! and its raw payload. Every event-bound variant shares the [`EventMessage`]
//! header; the kind-specific fields carry what the mapper extracted from the
//! payload.

use crate::{MessageKind, Urn};
use bytes::Bytes;

/// Header shared by every event-bound domain event
#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    pub event_id: Urn,
    pub sport_id: Option<Urn>,
    /// Name of the consumer-facing resource type the event was routed as
    pub resource_type: &'static str,
    pub producer_id: u32,
    /// Generation timestamp, epoch milliseconds
    pub timestamp: i64,
    pub request_id: Option<i64>,
    /// Locales the mapper resolved names in
    pub locales: Vec<String>,
    /// Untouched payload, kept for audit and re-derivation use cases
    pub raw: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OddsChange {
    pub message: EventMessage,
    pub change_reason: Option<i32>,
    pub betting_status: Option<i32>,
    pub market_ids: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BetStop {
    pub message: EventMessage,
    pub market_status: Option<i32>,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BetCancel {
    pub message: EventMessage,
    /// Cancellation window, epoch milliseconds
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub market_ids: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BetSettlement {
    pub message: EventMessage,
    pub certainty: Option<i32>,
    pub market_ids: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixtureChange {
    pub message: EventMessage,
    pub change_type: Option<i32>,
    pub next_live_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollbackBetCancel {
    pub message: EventMessage,
    pub market_ids: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollbackBetSettlement {
    pub message: EventMessage,
    pub market_ids: Vec<i32>,
}

/// Reported once for every message that could not be processed
#[derive(Debug, Clone, PartialEq)]
pub struct UnparsableMessage {
    pub kind: MessageKind,
    /// Producer id text as far as it could be extracted
    pub producer_id: Option<String>,
    /// Event id text as far as it could be extracted
    pub event_id: Option<String>,
    pub raw: Bytes,
    pub reason: String,
}

/// Raised when a dispatcher (or the session owning it) closes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherClosed {
    pub name: String,
    pub resource_type: &'static str,
}

/// Any event-bound domain event, as produced by the mapper
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    OddsChange(OddsChange),
    BetStop(BetStop),
    BetCancel(BetCancel),
    BetSettlement(BetSettlement),
    FixtureChange(FixtureChange),
    RollbackBetCancel(RollbackBetCancel),
    RollbackBetSettlement(RollbackBetSettlement),
}

impl FeedEvent {
    pub fn kind(&self) -> MessageKind {
        match self {
            FeedEvent::OddsChange(_) => MessageKind::OddsChange,
            FeedEvent::BetStop(_) => MessageKind::BetStop,
            FeedEvent::BetCancel(_) => MessageKind::BetCancel,
            FeedEvent::BetSettlement(_) => MessageKind::BetSettlement,
            FeedEvent::FixtureChange(_) => MessageKind::FixtureChange,
            FeedEvent::RollbackBetCancel(_) => MessageKind::RollbackBetCancel,
            FeedEvent::RollbackBetSettlement(_) => MessageKind::RollbackBetSettlement,
        }
    }

    pub fn message(&self) -> &EventMessage {
        match self {
            FeedEvent::OddsChange(e) => &e.message,
            FeedEvent::BetStop(e) => &e.message,
            FeedEvent::BetCancel(e) => &e.message,
            FeedEvent::BetSettlement(e) => &e.message,
            FeedEvent::FixtureChange(e) => &e.message,
            FeedEvent::RollbackBetCancel(e) => &e.message,
            FeedEvent::RollbackBetSettlement(e) => &e.message,
        }
    }
}
