//! Feed health tracking
//!
//! Two independent signals decide whether a producer's feed is healthy:
//!
//! - the **system alive** heartbeat published by the broker for every producer;
//!   silence for `multiplier × max_inactivity` means the producer is gone
//! - the per-interest **content freshness**: the newest of the last user alive
//!   and the last regular message of each interest; one stale interest is
//!   enough for the producer to be "behind"
//!
//! All timestamps are epoch milliseconds as generated upstream.

use crate::producer::Producer;
use feed_types::{Clock, FeedMessage, MessageInterest};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InterestTimestamps {
    user_alive: i64,
    /// Only kept while fresher than `user_alive`
    non_alive: Option<i64>,
}

impl InterestTimestamps {
    fn freshest(&self) -> i64 {
        self.non_alive.map_or(self.user_alive, |t| t.max(self.user_alive))
    }
}

#[derive(Debug)]
struct TrackerState {
    system_alive: i64,
    interests: HashMap<MessageInterest, InterestTimestamps>,
}

pub struct TimestampTracker {
    producer: Arc<Producer>,
    clock: Arc<dyn Clock>,
    alive_violation_multiplier: u32,
    /// Interests that must stay fresh for the producer not to be behind
    realtime_interests: Vec<MessageInterest>,
    state: Mutex<TrackerState>,
}

impl TimestampTracker {
    /// Every timestamp starts at "now"; the system-alive interest is never tracked
    pub fn new(
        producer: Arc<Producer>,
        interests: &[MessageInterest],
        clock: Arc<dyn Clock>,
        alive_violation_multiplier: u32,
    ) -> Self {
        let now = clock.now_millis();
        let interests: HashMap<_, _> = interests
            .iter()
            .filter(|interest| !interest.is_system())
            .map(|interest| {
                (
                    interest.clone(),
                    InterestTimestamps {
                        user_alive: now,
                        non_alive: None,
                    },
                )
            })
            .collect();
        let realtime_interests = interests
            .keys()
            .filter(|interest| !interest.is_virtual_only())
            .cloned()
            .collect();

        Self {
            producer,
            clock,
            alive_violation_multiplier,
            realtime_interests,
            state: Mutex::new(TrackerState {
                system_alive: now,
                interests,
            }),
        }
    }

    /// Record a broker heartbeat; older heartbeats are ignored
    pub fn process_system_alive(&self, timestamp: i64) {
        let mut state = self.state.lock();
        if timestamp > state.system_alive {
            state.system_alive = timestamp;
        }
    }

    /// Record a message received on one of the tracked interests
    pub fn process_user_message(&self, interest: &MessageInterest, message: &FeedMessage) {
        let mut state = self.state.lock();
        let Some(entry) = state.interests.get_mut(interest) else {
            trace!(
                producer = self.producer.id(),
                %interest,
                "Message on untracked interest ignored"
            );
            return;
        };

        let timestamp = message.timestamp;
        if message.is_alive() {
            entry.user_alive = entry.user_alive.max(timestamp);
            if entry.non_alive.is_some_and(|t| t <= timestamp) {
                entry.non_alive = None;
            }
        } else if timestamp > entry.freshest() {
            entry.non_alive = Some(timestamp);
        }
    }

    pub fn system_alive_timestamp(&self) -> i64 {
        self.state.lock().system_alive
    }

    /// Oldest user alive across the tracked interests
    pub fn oldest_user_alive_timestamp(&self) -> Option<i64> {
        self.state
            .lock()
            .interests
            .values()
            .map(|entry| entry.user_alive)
            .min()
    }

    /// Newest content timestamp of `interest`
    pub fn freshest_timestamp(&self, interest: &MessageInterest) -> Option<i64> {
        self.state
            .lock()
            .interests
            .get(interest)
            .map(InterestTimestamps::freshest)
    }

    /// The broker heartbeat has been silent for longer than allowed
    pub fn is_alive_violated(&self) -> bool {
        let now = self.clock.now_millis();
        let system_alive = self.state.lock().system_alive;
        now.saturating_sub(system_alive) > self.alive_violation_window_millis()
    }

    /// Some real-time interest has not delivered content within the window
    pub fn is_behind(&self) -> bool {
        if self.producer.is_virtual_only() || self.realtime_interests.is_empty() {
            return false;
        }

        let now = self.clock.now_millis();
        let window = self.inactivity_window_millis();
        let state = self.state.lock();
        self.realtime_interests.iter().any(|interest| {
            state
                .interests
                .get(interest)
                .is_some_and(|entry| now.saturating_sub(entry.freshest()) > window)
        })
    }

    fn inactivity_window_millis(&self) -> i64 {
        i64::try_from(self.producer.max_inactivity_seconds())
            .unwrap_or(i64::MAX / 1000)
            .saturating_mul(1000)
    }

    fn alive_violation_window_millis(&self) -> i64 {
        self.inactivity_window_millis()
            .saturating_mul(i64::from(self.alive_violation_multiplier))
    }
}

impl std::fmt::Debug for TimestampTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TimestampTracker")
            .field("producer", &self.producer.id())
            .field("system_alive", &state.system_alive)
            .field("interests", &state.interests.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::test_support::producer;
    use feed_types::{ManualClock, MessageKind, ProducerScope};
    use proptest::prelude::*;
    use std::time::Duration;

    const START: i64 = 1_700_000_000_000;

    fn new_tracker(
        scopes: Vec<ProducerScope>,
        interests: &[MessageInterest],
    ) -> (TimestampTracker, ManualClock) {
        let clock = ManualClock::at_millis(START);
        let tracker = TimestampTracker::new(
            Arc::new(producer(1, scopes)),
            interests,
            Arc::new(clock.clone()),
            2,
        );
        (tracker, clock)
    }

    fn alive(timestamp: i64) -> FeedMessage {
        FeedMessage::alive(1, timestamp, true)
    }

    fn odds_change(timestamp: i64) -> FeedMessage {
        FeedMessage::new(MessageKind::OddsChange, 1, timestamp).with_event("sr:match:1", None)
    }

    #[test]
    fn older_non_alive_does_not_move_freshness_back() {
        let live = MessageInterest::LiveMessagesOnly;
        let (tracker, _) = new_tracker(vec![ProducerScope::Live], &[live.clone()]);

        tracker.process_user_message(&live, &alive(START + 10_000));
        tracker.process_user_message(&live, &odds_change(START + 5_000));
        assert_eq!(tracker.freshest_timestamp(&live), Some(START + 10_000));
    }

    #[test]
    fn fresher_non_alive_overrides_alive() {
        let live = MessageInterest::LiveMessagesOnly;
        let (tracker, clock) = new_tracker(vec![ProducerScope::Live], &[live.clone()]);

        tracker.process_user_message(&live, &alive(START + 1_000));
        tracker.process_user_message(&live, &odds_change(START + 15_000));
        assert_eq!(tracker.freshest_timestamp(&live), Some(START + 15_000));

        // 25s after the alive but only 11s after the odds change
        clock.advance(Duration::from_secs(26));
        assert!(!tracker.is_behind());

        // A later alive that is older than the odds change keeps it
        tracker.process_user_message(&live, &alive(START + 12_000));
        assert_eq!(tracker.freshest_timestamp(&live), Some(START + 15_000));

        // A newer alive supersedes it
        tracker.process_user_message(&live, &alive(START + 20_000));
        assert_eq!(tracker.freshest_timestamp(&live), Some(START + 20_000));
        assert_eq!(tracker.oldest_user_alive_timestamp(), Some(START + 20_000));
    }

    #[test]
    fn alive_violation_needs_twice_the_window() {
        let (tracker, clock) =
            new_tracker(vec![ProducerScope::Live], &[MessageInterest::LiveMessagesOnly]);

        clock.advance(Duration::from_secs(39));
        assert!(!tracker.is_alive_violated());
        clock.advance(Duration::from_secs(2));
        assert!(tracker.is_alive_violated());

        tracker.process_system_alive(clock.now_millis());
        assert!(!tracker.is_alive_violated());

        // Out of order heartbeat is ignored
        tracker.process_system_alive(START);
        assert_eq!(tracker.system_alive_timestamp(), clock.now_millis());
    }

    #[test]
    fn one_stale_interest_marks_tracker_behind() {
        let live = MessageInterest::LiveMessagesOnly;
        let prematch = MessageInterest::PrematchMessagesOnly;
        let (tracker, clock) = new_tracker(
            vec![ProducerScope::Live, ProducerScope::Prematch],
            &[live.clone(), prematch.clone()],
        );

        clock.advance(Duration::from_secs(15));
        tracker.process_user_message(&live, &alive(clock.now_millis()));
        assert!(!tracker.is_behind());

        clock.advance(Duration::from_secs(10));
        assert!(tracker.is_behind());

        tracker.process_user_message(&prematch, &alive(clock.now_millis()));
        assert!(!tracker.is_behind());
    }

    #[test]
    fn virtual_only_is_never_behind() {
        let virt = MessageInterest::VirtualSportMessages;
        let (tracker, clock) = new_tracker(vec![ProducerScope::Live], &[virt]);
        clock.advance(Duration::from_secs(600));
        assert!(!tracker.is_behind());

        let (tracker, clock) = new_tracker(
            vec![ProducerScope::Virtual],
            &[MessageInterest::AllMessages],
        );
        clock.advance(Duration::from_secs(600));
        assert!(!tracker.is_behind());
    }

    #[test]
    fn mixed_interests_ignore_virtual_staleness() {
        let live = MessageInterest::LiveMessagesOnly;
        let virt = MessageInterest::VirtualSportMessages;
        let (tracker, clock) = new_tracker(
            vec![ProducerScope::Live, ProducerScope::Virtual],
            &[live.clone(), virt],
        );

        clock.advance(Duration::from_secs(100));
        tracker.process_user_message(&live, &alive(clock.now_millis()));
        assert!(!tracker.is_behind());
    }

    #[test]
    fn untracked_interest_is_ignored() {
        let (tracker, _) =
            new_tracker(vec![ProducerScope::Live], &[MessageInterest::LiveMessagesOnly]);
        tracker.process_user_message(&MessageInterest::PrematchMessagesOnly, &alive(START + 1));
        assert_eq!(
            tracker.freshest_timestamp(&MessageInterest::PrematchMessagesOnly),
            None
        );
    }

    proptest! {
        #[test]
        fn freshness_never_moves_backwards(
            messages in prop::collection::vec((any::<bool>(), 0i64..120_000), 1..64)
        ) {
            let live = MessageInterest::LiveMessagesOnly;
            let (tracker, _) = new_tracker(vec![ProducerScope::Live], &[live.clone()]);

            let mut previous = tracker.freshest_timestamp(&live).unwrap_or_default();
            for (is_alive, offset) in messages {
                let message = if is_alive {
                    alive(START + offset)
                } else {
                    odds_change(START + offset)
                };
                tracker.process_user_message(&live, &message);
                let current = tracker.freshest_timestamp(&live).unwrap_or_default();
                prop_assert!(current >= previous);
                previous = current;
            }
        }
    }
}
