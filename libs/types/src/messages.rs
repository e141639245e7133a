//! Feed message model
//!
//! The message receiver deserializes the wire payload into a [`FeedMessage`]
//! before handing it to a session. Only the header fields that the routing,
//! validation and recovery layers need are modelled here; the full payload
//! stays in the raw bytes that travel alongside the message and is turned into
//! a domain event by the message mapper.

use crate::Urn;
use std::fmt;

/// Kind of message published on the feed, taken from the payload root element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MessageKind {
    OddsChange,
    BetStop,
    BetCancel,
    BetSettlement,
    FixtureChange,
    RollbackBetCancel,
    RollbackBetSettlement,
    Alive,
    SnapshotComplete,
    Unknown,
}

/// Whether a message kind carries a recovery request id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestIdUsage {
    Required,
    Optional,
    Forbidden,
}

impl MessageKind {
    /// All kinds that are delivered to application subscribers
    pub const EVENT_KINDS: [MessageKind; 7] = [
        MessageKind::OddsChange,
        MessageKind::BetStop,
        MessageKind::BetCancel,
        MessageKind::BetSettlement,
        MessageKind::FixtureChange,
        MessageKind::RollbackBetCancel,
        MessageKind::RollbackBetSettlement,
    ];

    /// Map a payload root element name (`odds_change`, `alive`, ...) to a kind
    pub fn from_root_element(name: &str) -> Self {
        match name {
            "odds_change" => MessageKind::OddsChange,
            "bet_stop" => MessageKind::BetStop,
            "bet_cancel" => MessageKind::BetCancel,
            "bet_settlement" => MessageKind::BetSettlement,
            "fixture_change" => MessageKind::FixtureChange,
            "rollback_bet_cancel" => MessageKind::RollbackBetCancel,
            "rollback_bet_settlement" => MessageKind::RollbackBetSettlement,
            "alive" => MessageKind::Alive,
            "snapshot_complete" => MessageKind::SnapshotComplete,
            _ => MessageKind::Unknown,
        }
    }

    /// Root element / routing key segment for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::OddsChange => "odds_change",
            MessageKind::BetStop => "bet_stop",
            MessageKind::BetCancel => "bet_cancel",
            MessageKind::BetSettlement => "bet_settlement",
            MessageKind::FixtureChange => "fixture_change",
            MessageKind::RollbackBetCancel => "rollback_bet_cancel",
            MessageKind::RollbackBetSettlement => "rollback_bet_settlement",
            MessageKind::Alive => "alive",
            MessageKind::SnapshotComplete => "snapshot_complete",
            MessageKind::Unknown => "unknown",
        }
    }

    /// Messages concerning a single sport event, delivered to subscribers
    pub fn is_event_message(&self) -> bool {
        Self::EVENT_KINDS.contains(self)
    }

    /// Messages consumed by the recovery layer and never dispatched
    pub fn is_system_message(&self) -> bool {
        matches!(self, MessageKind::Alive | MessageKind::SnapshotComplete)
    }

    pub fn request_id_usage(&self) -> RequestIdUsage {
        match self {
            MessageKind::SnapshotComplete => RequestIdUsage::Required,
            MessageKind::Alive => RequestIdUsage::Forbidden,
            _ => RequestIdUsage::Optional,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope of the data a producer publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ProducerScope {
    Live,
    Prematch,
    Virtual,
}

/// Structured feed message produced by the receiver's deserializer
#[derive(Debug, Clone, PartialEq)]
pub struct FeedMessage {
    pub kind: MessageKind,
    /// Producer (`product` attribute) that generated the message
    pub producer_id: u32,
    /// Generation timestamp at the producer, epoch milliseconds
    pub timestamp: i64,
    /// Raw `event_id` attribute, parsed into a [`Urn`] by consumers that need it
    pub event_id: Option<String>,
    /// Sport of the event, usually taken from the routing key
    pub sport_id: Option<Urn>,
    /// Correlates the message with a recovery request
    pub request_id: Option<i64>,
    /// `subscribed` flag of alive messages
    pub subscribed: Option<bool>,
    /// Local receive time, epoch milliseconds
    pub received_at: i64,
}

impl FeedMessage {
    /// Create a message of `kind` with every optional header left empty
    pub fn new(kind: MessageKind, producer_id: u32, timestamp: i64) -> Self {
        Self {
            kind,
            producer_id,
            timestamp,
            event_id: None,
            sport_id: None,
            request_id: None,
            subscribed: None,
            received_at: timestamp,
        }
    }

    /// Alive heartbeat with the given `subscribed` flag
    pub fn alive(producer_id: u32, timestamp: i64, subscribed: bool) -> Self {
        Self {
            subscribed: Some(subscribed),
            ..Self::new(MessageKind::Alive, producer_id, timestamp)
        }
    }

    /// Snapshot-complete marker closing recovery request `request_id`
    pub fn snapshot_complete(producer_id: u32, timestamp: i64, request_id: i64) -> Self {
        Self {
            request_id: Some(request_id),
            ..Self::new(MessageKind::SnapshotComplete, producer_id, timestamp)
        }
    }

    pub fn with_event(mut self, event_id: impl Into<String>, sport_id: Option<Urn>) -> Self {
        self.event_id = Some(event_id.into());
        self.sport_id = sport_id;
        self
    }

    pub fn with_request_id(mut self, request_id: i64) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_received_at(mut self, received_at: i64) -> Self {
        self.received_at = received_at;
        self
    }

    pub fn is_alive(&self) -> bool {
        self.kind == MessageKind::Alive
    }

    /// Parse the event id attribute, `None` when missing or malformed
    pub fn event_urn(&self) -> Option<Urn> {
        self.event_id.as_deref().and_then(|id| id.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_elements_map_to_kinds() {
        for kind in MessageKind::EVENT_KINDS {
            assert_eq!(MessageKind::from_root_element(kind.as_str()), kind);
            assert!(kind.is_event_message());
            assert!(!kind.is_system_message());
        }
        assert_eq!(MessageKind::from_root_element("alive"), MessageKind::Alive);
        assert_eq!(MessageKind::from_root_element("cashout"), MessageKind::Unknown);
    }

    #[test]
    fn request_id_rules() {
        assert_eq!(
            MessageKind::SnapshotComplete.request_id_usage(),
            RequestIdUsage::Required
        );
        assert_eq!(MessageKind::Alive.request_id_usage(), RequestIdUsage::Forbidden);
        assert_eq!(MessageKind::BetStop.request_id_usage(), RequestIdUsage::Optional);
    }

    #[test]
    fn event_urn_ignores_malformed_ids() {
        let message = FeedMessage::new(MessageKind::OddsChange, 1, 10).with_event("garbage", None);
        assert!(message.event_urn().is_none());

        let message = message.with_event("sr:match:42", Some(Urn::sport(1)));
        assert_eq!(message.event_urn(), Some(Urn::sr_match(42)));
    }
}
