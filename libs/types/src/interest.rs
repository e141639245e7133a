//! # Message Interests
//!
//! A message interest is a named group of broker routing keys a session binds
//! to. Routing keys on the feed have eight segments:
//!
//! ```text
//! {priority}.{prematch}.{live}.{message_type}.{sport_id}.{urn_type}.{event_id}.{node_id}
//! ```
//!
//! Every user interest also binds the `snapshot_complete` keys so that recovery
//! completion reaches the session that requested it, and the `alive` keys that
//! feed the per-interest freshness tracking. The system-alive interest
//! is reserved for the internal session that watches broker-level heartbeats.

use crate::errors::InterestError;
use crate::Urn;
use std::collections::HashSet;
use std::fmt;

const SNAPSHOT_COMPLETE_KEY: &str = "-.-.-.snapshot_complete.-.-.-";
const ALIVE_KEY: &str = "-.-.-.alive.#";

/// Group of routing keys a session listens to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageInterest {
    AllMessages,
    LiveMessagesOnly,
    PrematchMessagesOnly,
    HighPriorityMessages,
    LowPriorityMessages,
    VirtualSportMessages,
    SpecifiedMatchesOnly(Vec<Urn>),
    SystemAliveMessages,
}

impl MessageInterest {
    /// Stable, human-readable name used for session naming and logging
    pub fn name(&self) -> &'static str {
        match self {
            MessageInterest::AllMessages => "all",
            MessageInterest::LiveMessagesOnly => "live",
            MessageInterest::PrematchMessagesOnly => "prematch",
            MessageInterest::HighPriorityMessages => "high_priority",
            MessageInterest::LowPriorityMessages => "low_priority",
            MessageInterest::VirtualSportMessages => "virtual",
            MessageInterest::SpecifiedMatchesOnly(_) => "specified_matches",
            MessageInterest::SystemAliveMessages => "system_alive",
        }
    }

    /// Interests delivering only virtual-sport content carry no real-time guarantee
    pub fn is_virtual_only(&self) -> bool {
        matches!(self, MessageInterest::VirtualSportMessages)
    }

    pub fn is_system(&self) -> bool {
        matches!(self, MessageInterest::SystemAliveMessages)
    }

    /// Routing keys to bind for this interest, optionally for a specific node
    pub fn routing_keys(&self, node_id: Option<i32>) -> Vec<String> {
        let base: Vec<String> = match self {
            MessageInterest::AllMessages => vec!["*.*.*.*.*.*.*".to_string()],
            MessageInterest::LiveMessagesOnly => vec!["*.*.live.*.*.*.*".to_string()],
            MessageInterest::PrematchMessagesOnly => vec!["*.pre.*.*.*.*.*".to_string()],
            MessageInterest::HighPriorityMessages => vec!["hi.*.*.*.*.*.*".to_string()],
            MessageInterest::LowPriorityMessages => vec!["lo.*.*.*.*.*.*".to_string()],
            MessageInterest::VirtualSportMessages => vec!["*.virt.*.*.*.*.*".to_string()],
            MessageInterest::SpecifiedMatchesOnly(events) => events
                .iter()
                .map(|urn| format!("*.*.*.*.*.{}:{}.{}", urn.prefix(), urn.kind(), urn.id()))
                .collect(),
            MessageInterest::SystemAliveMessages => {
                return vec![ALIVE_KEY.to_string()];
            }
        };

        let mut keys = Vec::with_capacity(base.len() * 2 + 3);
        for key in base.iter().map(String::as_str).chain([SNAPSHOT_COMPLETE_KEY]) {
            keys.push(format!("{}.-.#", key));
            if let Some(node) = node_id {
                keys.push(format!("{}.{}.#", key, node));
            }
        }
        keys.push(ALIVE_KEY.to_string());
        keys
    }

    /// Check that a set of interests can be opened side by side
    ///
    /// `AllMessages` already covers every other user interest, so combining it
    /// with anything else would deliver each message twice.
    pub fn validate_combination(interests: &[MessageInterest]) -> Result<(), InterestError> {
        if interests.is_empty() {
            return Err(InterestError::Empty);
        }

        let mut seen = HashSet::new();
        for interest in interests {
            if !seen.insert(interest) {
                return Err(InterestError::Duplicate(interest.name().to_string()));
            }
        }

        if interests.len() > 1 && interests.contains(&MessageInterest::AllMessages) {
            return Err(InterestError::AllCombined);
        }

        Ok(())
    }
}

impl fmt::Display for MessageInterest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_interests_bind_snapshot_complete_and_alive() {
        let keys = MessageInterest::PrematchMessagesOnly.routing_keys(None);
        assert_eq!(
            keys,
            vec![
                "*.pre.*.*.*.*.*.-.#".to_string(),
                "-.-.-.snapshot_complete.-.-.-.-.#".to_string(),
                "-.-.-.alive.#".to_string(),
            ]
        );
    }

    #[test]
    fn node_specific_keys_are_added() {
        let keys = MessageInterest::LiveMessagesOnly.routing_keys(Some(7));
        assert!(keys.contains(&"*.*.live.*.*.*.*.7.#".to_string()));
        assert!(keys.contains(&"-.-.-.snapshot_complete.-.-.-.7.#".to_string()));
        assert_eq!(keys.len(), 5);
    }

    #[test]
    fn specified_matches_bind_per_event() {
        let interest =
            MessageInterest::SpecifiedMatchesOnly(vec![Urn::sr_match(1), Urn::sr_match(2)]);
        let keys = interest.routing_keys(None);
        assert!(keys.contains(&"*.*.*.*.*.sr:match.1.-.#".to_string()));
        assert!(keys.contains(&"*.*.*.*.*.sr:match.2.-.#".to_string()));
    }

    #[test]
    fn system_alive_binds_only_alive() {
        assert_eq!(
            MessageInterest::SystemAliveMessages.routing_keys(Some(3)),
            vec!["-.-.-.alive.#".to_string()]
        );
    }

    #[test]
    fn combination_rules() {
        assert!(MessageInterest::validate_combination(&[
            MessageInterest::LiveMessagesOnly,
            MessageInterest::PrematchMessagesOnly,
        ])
        .is_ok());
        assert_eq!(
            MessageInterest::validate_combination(&[
                MessageInterest::AllMessages,
                MessageInterest::LiveMessagesOnly,
            ]),
            Err(InterestError::AllCombined)
        );
        assert_eq!(
            MessageInterest::validate_combination(&[
                MessageInterest::LiveMessagesOnly,
                MessageInterest::LiveMessagesOnly,
            ]),
            Err(InterestError::Duplicate("live".to_string()))
        );
        assert_eq!(
            MessageInterest::validate_combination(&[]),
            Err(InterestError::Empty)
        );
    }
}
