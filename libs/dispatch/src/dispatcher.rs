//! Entity dispatchers
//!
//! A dispatcher is the fan-out point of one resource type: the session maps a
//! message into a domain event and the dispatcher hands it to every handler
//! registered for that event kind. Handlers run synchronously on the message
//! path; a panicking handler is isolated from the others and from the caller.

use crate::error::{DispatchError, MappingError, Result};
use crate::mapper::MessageMapper;
use crate::resource_type::ResourceType;
use bytes::Bytes;
use feed_types::{
    BetCancel, BetSettlement, BetStop, DispatcherClosed, FeedEvent, FeedMessage, FeedMetrics,
    FixtureChange, MessageKind, NotifyOutcome, OddsChange, RollbackBetCancel,
    RollbackBetSettlement, SubscriptionId, Subscribers,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Dispatcher as seen by the [`DispatcherStore`](crate::DispatcherStore)
pub trait EntityDispatcher: Send + Sync {
    fn name(&self) -> &str;

    fn resource_type(&self) -> ResourceType;

    fn is_opened(&self) -> bool;

    fn open(&self) -> Result<()>;

    fn close(&self) -> Result<()>;

    /// Map `message` and deliver the event to the handlers of its kind
    fn dispatch(&self, message: &FeedMessage, raw: &Bytes) -> Result<()>;
}

pub struct SpecificEntityDispatcher {
    name: String,
    resource_type: ResourceType,
    opened: AtomicBool,
    locales: Vec<String>,
    mapper: Arc<dyn MessageMapper>,
    metrics: Arc<FeedMetrics>,
    odds_change: Subscribers<OddsChange>,
    bet_stop: Subscribers<BetStop>,
    bet_cancel: Subscribers<BetCancel>,
    bet_settlement: Subscribers<BetSettlement>,
    fixture_change: Subscribers<FixtureChange>,
    rollback_bet_cancel: Subscribers<RollbackBetCancel>,
    rollback_bet_settlement: Subscribers<RollbackBetSettlement>,
    closed: Subscribers<DispatcherClosed>,
}

impl SpecificEntityDispatcher {
    /// New dispatchers start closed
    pub fn new(
        name: impl Into<String>,
        resource_type: ResourceType,
        locales: Vec<String>,
        mapper: Arc<dyn MessageMapper>,
        metrics: Arc<FeedMetrics>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_type,
            opened: AtomicBool::new(false),
            locales,
            mapper,
            metrics,
            odds_change: Subscribers::new(),
            bet_stop: Subscribers::new(),
            bet_cancel: Subscribers::new(),
            bet_settlement: Subscribers::new(),
            fixture_change: Subscribers::new(),
            rollback_bet_cancel: Subscribers::new(),
            rollback_bet_settlement: Subscribers::new(),
            closed: Subscribers::new(),
        }
    }

    /// Locales handed to the mapper, default locale first
    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    pub fn on_odds_change<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&OddsChange) + Send + Sync + 'static,
    {
        self.odds_change.subscribe(handler)
    }

    pub fn on_bet_stop<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&BetStop) + Send + Sync + 'static,
    {
        self.bet_stop.subscribe(handler)
    }

    pub fn on_bet_cancel<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&BetCancel) + Send + Sync + 'static,
    {
        self.bet_cancel.subscribe(handler)
    }

    pub fn on_bet_settlement<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&BetSettlement) + Send + Sync + 'static,
    {
        self.bet_settlement.subscribe(handler)
    }

    pub fn on_fixture_change<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&FixtureChange) + Send + Sync + 'static,
    {
        self.fixture_change.subscribe(handler)
    }

    pub fn on_rollback_bet_cancel<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&RollbackBetCancel) + Send + Sync + 'static,
    {
        self.rollback_bet_cancel.subscribe(handler)
    }

    pub fn on_rollback_bet_settlement<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&RollbackBetSettlement) + Send + Sync + 'static,
    {
        self.rollback_bet_settlement.subscribe(handler)
    }

    pub fn on_closed<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&DispatcherClosed) + Send + Sync + 'static,
    {
        self.closed.subscribe(handler)
    }

    /// Number of handlers registered for `kind`; system kinds have none
    pub fn handler_count(&self, kind: MessageKind) -> usize {
        match kind {
            MessageKind::OddsChange => self.odds_change.len(),
            MessageKind::BetStop => self.bet_stop.len(),
            MessageKind::BetCancel => self.bet_cancel.len(),
            MessageKind::BetSettlement => self.bet_settlement.len(),
            MessageKind::FixtureChange => self.fixture_change.len(),
            MessageKind::RollbackBetCancel => self.rollback_bet_cancel.len(),
            MessageKind::RollbackBetSettlement => self.rollback_bet_settlement.len(),
            MessageKind::Alive | MessageKind::SnapshotComplete | MessageKind::Unknown => 0,
        }
    }

    fn deliver(&self, event: FeedEvent) -> NotifyOutcome {
        match event {
            FeedEvent::OddsChange(e) => self.odds_change.notify(&e),
            FeedEvent::BetStop(e) => self.bet_stop.notify(&e),
            FeedEvent::BetCancel(e) => self.bet_cancel.notify(&e),
            FeedEvent::BetSettlement(e) => self.bet_settlement.notify(&e),
            FeedEvent::FixtureChange(e) => self.fixture_change.notify(&e),
            FeedEvent::RollbackBetCancel(e) => self.rollback_bet_cancel.notify(&e),
            FeedEvent::RollbackBetSettlement(e) => self.rollback_bet_settlement.notify(&e),
        }
    }

    fn record_panics(&self, outcome: NotifyOutcome) {
        if outcome.panicked > 0 {
            self.metrics
                .handler_panics
                .fetch_add(outcome.panicked as u64, Ordering::Relaxed);
        }
    }
}

impl EntityDispatcher for SpecificEntityDispatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    fn is_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    fn open(&self) -> Result<()> {
        self.opened
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| already(&self.name, "open"))?;
        info!(dispatcher = %self.name, resource_type = %self.resource_type, "Dispatcher opened");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.opened
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| already(&self.name, "closed"))?;
        info!(dispatcher = %self.name, "Dispatcher closed");

        let outcome = self.closed.notify(&DispatcherClosed {
            name: self.name.clone(),
            resource_type: self.resource_type.name(),
        });
        self.record_panics(outcome);
        Ok(())
    }

    fn dispatch(&self, message: &FeedMessage, raw: &Bytes) -> Result<()> {
        if !message.kind.is_event_message() {
            return Err(DispatchError::UnsupportedMessage { kind: message.kind });
        }
        if !self.is_opened() {
            return Err(DispatchError::InvalidState(format!(
                "dispatcher '{}' is not open",
                self.name
            )));
        }
        if self.handler_count(message.kind) == 0 {
            debug!(dispatcher = %self.name, kind = ?message.kind, "No handler registered");
            return Ok(());
        }

        let event = self
            .mapper
            .map(message, self.resource_type, &self.locales, raw)
            .inspect_err(|_| FeedMetrics::incr(&self.metrics.mapping_failures))?;
        if event.kind() != message.kind {
            FeedMetrics::incr(&self.metrics.mapping_failures);
            return Err(DispatchError::Mapping(MappingError::new(
                message.kind,
                format!("mapper produced a {:?} event", event.kind()),
            )));
        }

        let outcome = self.deliver(event);
        FeedMetrics::incr(&self.metrics.messages_dispatched);
        if outcome.panicked > 0 {
            warn!(
                dispatcher = %self.name,
                kind = ?message.kind,
                panicked = outcome.panicked,
                "Event handlers panicked"
            );
        }
        self.record_panics(outcome);
        Ok(())
    }
}

fn already(name: &str, state: &str) -> DispatchError {
    DispatchError::InvalidState(format!("dispatcher '{}' is already {}", name, state))
}

impl std::fmt::Debug for SpecificEntityDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecificEntityDispatcher")
            .field("name", &self.name)
            .field("resource_type", &self.resource_type)
            .field("opened", &self.is_opened())
            .field("locales", &self.locales)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::HeaderMessageMapper;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn dispatcher(metrics: &Arc<FeedMetrics>) -> SpecificEntityDispatcher {
        SpecificEntityDispatcher::new(
            "matches",
            ResourceType::MATCH,
            vec!["en".to_string(), "de".to_string()],
            Arc::new(HeaderMessageMapper),
            Arc::clone(metrics),
        )
    }

    fn message(kind: MessageKind) -> FeedMessage {
        FeedMessage::new(kind, 1, 1_000).with_event("sr:match:7", None)
    }

    #[test]
    fn open_and_close_reject_repeated_calls() {
        let dispatcher = dispatcher(&Arc::new(FeedMetrics::new()));
        assert!(!dispatcher.is_opened());
        assert!(matches!(
            dispatcher.close(),
            Err(DispatchError::InvalidState(_))
        ));

        dispatcher.open().unwrap();
        assert!(matches!(dispatcher.open(), Err(DispatchError::InvalidState(_))));
        dispatcher.close().unwrap();
        assert!(!dispatcher.is_opened());
    }

    #[test]
    fn close_notifies_every_listener_despite_panics() {
        let metrics = Arc::new(FeedMetrics::new());
        let dispatcher = dispatcher(&metrics);
        let names = Arc::new(Mutex::new(Vec::new()));

        dispatcher.on_closed(|_| panic!("closing listener failed"));
        let sink = Arc::clone(&names);
        dispatcher.on_closed(move |closed| sink.lock().push(closed.name.clone()));

        dispatcher.open().unwrap();
        dispatcher.close().unwrap();
        assert_eq!(names.lock().clone(), vec!["matches".to_string()]);
        assert_eq!(metrics.snapshot().handler_panics, 1);
    }

    #[test]
    fn dispatch_reaches_only_handlers_of_the_kind() {
        let metrics = Arc::new(FeedMetrics::new());
        let dispatcher = dispatcher(&metrics);
        let odds = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&odds);
        dispatcher.on_odds_change(move |event| {
            assert_eq!(event.message.locales, vec!["en".to_string(), "de".to_string()]);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&stops);
        dispatcher.on_bet_stop(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.open().unwrap();

        dispatcher
            .dispatch(&message(MessageKind::OddsChange), &Bytes::new())
            .unwrap();
        assert_eq!(odds.load(Ordering::SeqCst), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 0);
        assert_eq!(metrics.snapshot().messages_dispatched, 1);
    }

    #[test]
    fn dispatch_without_handler_is_noop() {
        let dispatcher = dispatcher(&Arc::new(FeedMetrics::new()));
        dispatcher.open().unwrap();
        assert!(dispatcher
            .dispatch(&message(MessageKind::FixtureChange), &Bytes::new())
            .is_ok());
    }

    #[test]
    fn panicking_handler_does_not_stop_others() {
        let metrics = Arc::new(FeedMetrics::new());
        let dispatcher = dispatcher(&metrics);
        let calls = Arc::new(AtomicUsize::new(0));

        dispatcher.on_bet_settlement(|_| panic!("handler failed"));
        let counter = Arc::clone(&calls);
        dispatcher.on_bet_settlement(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.open().unwrap();

        dispatcher
            .dispatch(&message(MessageKind::BetSettlement), &Bytes::new())
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.snapshot().handler_panics, 1);
    }

    #[test]
    fn non_feed_messages_are_rejected() {
        let dispatcher = dispatcher(&Arc::new(FeedMetrics::new()));
        dispatcher.open().unwrap();
        for kind in [
            MessageKind::Alive,
            MessageKind::SnapshotComplete,
            MessageKind::Unknown,
        ] {
            assert_eq!(
                dispatcher.dispatch(&message(kind), &Bytes::new()),
                Err(DispatchError::UnsupportedMessage { kind })
            );
        }
    }

    #[test]
    fn closed_dispatcher_rejects_dispatch() {
        let dispatcher = dispatcher(&Arc::new(FeedMetrics::new()));
        assert!(matches!(
            dispatcher.dispatch(&message(MessageKind::OddsChange), &Bytes::new()),
            Err(DispatchError::InvalidState(_))
        ));
    }

    #[test]
    fn mapping_failure_is_reported() {
        struct WrongKindMapper;
        impl MessageMapper for WrongKindMapper {
            fn map(
                &self,
                message: &FeedMessage,
                resource_type: ResourceType,
                locales: &[String],
                raw: &Bytes,
            ) -> std::result::Result<FeedEvent, MappingError> {
                let bet_stop = FeedMessage {
                    kind: MessageKind::BetStop,
                    ..message.clone()
                };
                HeaderMessageMapper.map(&bet_stop, resource_type, locales, raw)
            }
        }

        let metrics = Arc::new(FeedMetrics::new());
        let dispatcher = SpecificEntityDispatcher::new(
            "matches",
            ResourceType::MATCH,
            Vec::new(),
            Arc::new(WrongKindMapper),
            Arc::clone(&metrics),
        );
        dispatcher.on_odds_change(|_| {});
        dispatcher.open().unwrap();

        let err = dispatcher
            .dispatch(&message(MessageKind::OddsChange), &Bytes::new())
            .unwrap_err();
        assert!(matches!(err, DispatchError::Mapping(_)));
        assert_eq!(metrics.snapshot().mapping_failures, 1);
    }
}
