//! Message mapper seam
//!
//! The mapper turns a structured feed message plus its raw payload into the
//! typed domain event application handlers receive. Full payload mapping
//! (markets, outcomes, localized names) lives with the reference-data caches;
//! [`HeaderMessageMapper`] only carries the header fields and is what the
//! consumer falls back to when no richer mapper is wired in.

use crate::error::MappingError;
use crate::resource_type::ResourceType;
use bytes::Bytes;
use feed_types::{
    BetCancel, BetSettlement, BetStop, EventMessage, FeedEvent, FeedMessage, FixtureChange,
    MessageKind, OddsChange, RollbackBetCancel, RollbackBetSettlement,
};

pub trait MessageMapper: Send + Sync {
    /// Build the domain event for `message`; the event kind must match the message kind
    fn map(
        &self,
        message: &FeedMessage,
        resource_type: ResourceType,
        locales: &[String],
        raw: &Bytes,
    ) -> Result<FeedEvent, MappingError>;
}

/// Builds events from the message header alone
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderMessageMapper;

impl MessageMapper for HeaderMessageMapper {
    fn map(
        &self,
        message: &FeedMessage,
        resource_type: ResourceType,
        locales: &[String],
        raw: &Bytes,
    ) -> Result<FeedEvent, MappingError> {
        let event_id = message.event_urn().ok_or_else(|| {
            MappingError::new(
                message.kind,
                format!("event id {:?} is not a valid URN", message.event_id),
            )
        })?;

        let header = EventMessage {
            event_id,
            sport_id: message.sport_id.clone(),
            resource_type: resource_type.name(),
            producer_id: message.producer_id,
            timestamp: message.timestamp,
            request_id: message.request_id,
            locales: locales.to_vec(),
            raw: raw.clone(),
        };

        let event = match message.kind {
            MessageKind::OddsChange => FeedEvent::OddsChange(OddsChange {
                message: header,
                change_reason: None,
                betting_status: None,
                market_ids: Vec::new(),
            }),
            MessageKind::BetStop => FeedEvent::BetStop(BetStop {
                message: header,
                market_status: None,
                groups: Vec::new(),
            }),
            MessageKind::BetCancel => FeedEvent::BetCancel(BetCancel {
                message: header,
                start_time: None,
                end_time: None,
                market_ids: Vec::new(),
            }),
            MessageKind::BetSettlement => FeedEvent::BetSettlement(BetSettlement {
                message: header,
                certainty: None,
                market_ids: Vec::new(),
            }),
            MessageKind::FixtureChange => FeedEvent::FixtureChange(FixtureChange {
                message: header,
                change_type: None,
                next_live_time: None,
            }),
            MessageKind::RollbackBetCancel => FeedEvent::RollbackBetCancel(RollbackBetCancel {
                message: header,
                market_ids: Vec::new(),
            }),
            MessageKind::RollbackBetSettlement => {
                FeedEvent::RollbackBetSettlement(RollbackBetSettlement {
                    message: header,
                    market_ids: Vec::new(),
                })
            }
            other => {
                return Err(MappingError::new(
                    other,
                    "message kind has no domain event",
                ))
            }
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_types::Urn;

    #[test]
    fn maps_header_fields() {
        let message = FeedMessage::new(MessageKind::BetStop, 1, 1_000)
            .with_event("sr:match:9", Some(Urn::sport(1)))
            .with_request_id(5);
        let raw = Bytes::from_static(b"<bet_stop/>");

        let event = HeaderMessageMapper
            .map(&message, ResourceType::MATCH, &["en".to_string()], &raw)
            .unwrap();
        assert_eq!(event.kind(), MessageKind::BetStop);
        let header = event.message();
        assert_eq!(header.event_id, Urn::sr_match(9));
        assert_eq!(header.resource_type, "match");
        assert_eq!(header.request_id, Some(5));
        assert_eq!(header.raw, raw);
    }

    #[test]
    fn rejects_missing_event_and_system_kinds() {
        let raw = Bytes::new();
        let no_event = FeedMessage::new(MessageKind::OddsChange, 1, 1_000);
        assert!(HeaderMessageMapper
            .map(&no_event, ResourceType::MATCH, &[], &raw)
            .is_err());

        let alive = FeedMessage::alive(1, 1_000, true).with_event("sr:match:1", None);
        let err = HeaderMessageMapper
            .map(&alive, ResourceType::MATCH, &[], &raw)
            .unwrap_err();
        assert_eq!(err.kind, MessageKind::Alive);
    }
}
