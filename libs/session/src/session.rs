//! # Feed Session
//!
//! A session binds one [`MessageInterest`] to the message receiver and runs a
//! worker task that pushes every inbound payload through the pipeline:
//!
//! ```text
//! receiver ─▶ deserialization ok? ──no──▶ unparsable
//!                 │ yes
//!                 ▼
//!             validate ──Failure──▶ unparsable
//!                 │ (ProblemsDetected ─▶ unparsable, continue)
//!                 ▼
//!             observers (recovery tracking)
//!                 │ alive / snapshot_complete stop here
//!                 ▼
//!             producer enabled? ─▶ DispatcherStore ─▶ most specific open dispatcher
//! ```
//!
//! Every message is reported at most once on the unparsable channel. Handlers
//! run synchronously on the worker, so a slow handler delays the session.
//!
//! Closing is cooperative: the worker finishes the message in hand and stops
//! before taking the next one. When the receiver drops the channel on its own
//! the session closes itself, observers get `on_connection_down` and the
//! `closed` handlers fire.

use crate::error::{Result, SessionError};
use crate::extractor::{MessageDataExtractor, XmlBasicDataExtractor};
use crate::receiver::{MessageReceiver, ReceiverEvent};
use crate::validator::{FeedMessageValidator, MessageValidator, ValidationResult};
use bytes::Bytes;
use feed_config::FeedConfig;
use feed_dispatch::{
    DefaultTypeMapper, DispatchError, DispatcherStore, EntityDispatcher, HeaderMessageMapper,
    MessageMapper, ResourceType, SpecificEntityDispatcher, TypeMapper,
};
use feed_recovery::{MessageObserver, ProducerManager};
use feed_types::{
    BetCancel, BetSettlement, BetStop, Clock, DispatcherClosed, FeedMessage, FeedMetrics,
    FixtureChange, MessageInterest, OddsChange, RollbackBetCancel, RollbackBetSettlement,
    SubscriptionId, Subscribers, SystemClock, UnparsableMessage,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument, Span};

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Message processing shared between the session and its worker
struct Pipeline {
    name: String,
    interest: MessageInterest,
    opened: AtomicBool,
    producers: Arc<ProducerManager>,
    validator: Arc<dyn MessageValidator>,
    extractor: Arc<dyn MessageDataExtractor>,
    observers: Vec<Arc<dyn MessageObserver>>,
    store: Arc<DispatcherStore>,
    generic: Arc<SpecificEntityDispatcher>,
    unparsable: Subscribers<UnparsableMessage>,
    metrics: Arc<FeedMetrics>,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<ReceiverEvent>,
        mut stop: watch::Receiver<bool>,
    ) {
        debug!("Session worker started");
        loop {
            tokio::select! {
                biased;
                _ = stop.changed() => break,
                event = events.recv() => match event {
                    Some(event) => self.process(event).await,
                    None => {
                        self.on_channel_lost().await;
                        break;
                    }
                },
            }
        }
        debug!("Session worker stopped");
    }

    async fn on_channel_lost(&self) {
        if self
            .opened
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let at = self.clock.now();
        warn!(%at, "Message channel closed while session is open");
        for observer in &self.observers {
            observer.on_connection_down(at).await;
        }
        if let Err(e) = self.generic.close() {
            debug!(error = %e, "Dispatcher already closed");
        }
    }

    async fn process(&self, event: ReceiverEvent) {
        FeedMetrics::incr(&self.metrics.messages_received);
        match event {
            ReceiverEvent::DeserializationFailed { raw, reason } => {
                FeedMetrics::incr(&self.metrics.messages_unparsable);
                self.report_unparsable(&raw, format!("deserialization failed: {}", reason));
            }
            ReceiverEvent::Message { message, raw } => self.process_message(message, raw).await,
        }
    }

    async fn process_message(&self, message: FeedMessage, raw: Bytes) {
        let mut reported = false;
        match self.validator.validate(&message) {
            ValidationResult::Success => {}
            ValidationResult::ProblemsDetected(problems) => {
                FeedMetrics::incr(&self.metrics.validation_problems);
                self.report_unparsable(&raw, problems.join("; "));
                reported = true;
            }
            ValidationResult::Failure(reason) => {
                FeedMetrics::incr(&self.metrics.messages_unparsable);
                self.report_unparsable(&raw, reason);
                return;
            }
        }

        for observer in &self.observers {
            observer.on_message(&self.interest, &message).await;
        }

        if message.kind.is_system_message() {
            return;
        }

        if !self.producers.get(message.producer_id).is_enabled() {
            FeedMetrics::incr(&self.metrics.messages_from_disabled_producers);
            debug!(
                producer = message.producer_id,
                kind = ?message.kind,
                "Dropping message from disabled producer"
            );
            return;
        }

        let Some(event_id) = message.event_urn() else {
            if !reported {
                FeedMetrics::incr(&self.metrics.messages_unparsable);
                self.report_unparsable(&raw, "event id is not a valid URN".to_string());
            }
            return;
        };

        let Some(dispatcher) = self.store.get(&event_id, message.sport_id.as_ref()) else {
            FeedMetrics::incr(&self.metrics.messages_without_dispatcher);
            debug!(%event_id, kind = ?message.kind, "No open dispatcher for event");
            return;
        };

        match dispatcher.dispatch(&message, &raw) {
            Ok(()) => {}
            Err(DispatchError::Mapping(e)) => {
                warn!(%event_id, error = %e, "Message could not be mapped");
                if !reported {
                    FeedMetrics::incr(&self.metrics.messages_unparsable);
                    self.report_unparsable(&raw, e.to_string());
                }
            }
            Err(e) => {
                warn!(
                    %event_id,
                    dispatcher = dispatcher.name(),
                    error = %e,
                    "Dispatch failed"
                );
            }
        }
    }

    fn report_unparsable(&self, raw: &Bytes, reason: String) {
        let basic = self.extractor.basic_data(raw);
        warn!(
            kind = ?basic.kind,
            producer = basic.producer_id.as_deref().unwrap_or("-"),
            event_id = basic.event_id.as_deref().unwrap_or("-"),
            %reason,
            "Unparsable message"
        );

        let outcome = self.unparsable.notify(&UnparsableMessage {
            kind: basic.kind,
            producer_id: basic.producer_id,
            event_id: basic.event_id,
            raw: raw.clone(),
            reason,
        });
        if outcome.panicked > 0 {
            self.metrics
                .handler_panics
                .fetch_add(outcome.panicked as u64, Ordering::Relaxed);
        }
    }
}

/// Session lifecycle plus the application-facing subscriptions
pub struct FeedSession {
    pipeline: Arc<Pipeline>,
    routing_keys: Vec<String>,
    receiver: Arc<dyn MessageReceiver>,
    mapper: Arc<dyn MessageMapper>,
    locales: Vec<String>,
    worker: Mutex<Option<Worker>>,
    span: Span,
}

struct Worker {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

impl FeedSession {
    pub fn builder(
        interest: MessageInterest,
        receiver: Arc<dyn MessageReceiver>,
        producers: Arc<ProducerManager>,
        config: &FeedConfig,
    ) -> FeedSessionBuilder {
        FeedSessionBuilder::new(interest, receiver, producers, config)
    }

    /// Unique within the process, derived from the interest
    pub fn name(&self) -> &str {
        &self.pipeline.name
    }

    pub fn interest(&self) -> &MessageInterest {
        &self.pipeline.interest
    }

    pub fn routing_keys(&self) -> &[String] {
        &self.routing_keys
    }

    pub fn is_opened(&self) -> bool {
        self.pipeline.opened.load(Ordering::SeqCst)
    }

    pub fn dispatcher_store(&self) -> &Arc<DispatcherStore> {
        &self.pipeline.store
    }

    /// The session's own `sport_event` dispatcher, opened and closed with the session
    pub fn dispatcher(&self) -> &Arc<SpecificEntityDispatcher> {
        &self.pipeline.generic
    }

    pub async fn open(&self) -> Result<()> {
        let pipeline = &self.pipeline;
        pipeline
            .opened
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| {
                SessionError::InvalidState(format!("session '{}' is already open", pipeline.name))
            })?;

        if let Err(e) = pipeline.generic.open() {
            pipeline.opened.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        let events = match self
            .receiver
            .open(&pipeline.interest, self.routing_keys.clone())
            .await
        {
            Ok(events) => events,
            Err(e) => {
                pipeline.opened.store(false, Ordering::SeqCst);
                if let Err(close_err) = pipeline.generic.close() {
                    debug!(parent: &self.span, error = %close_err, "Dispatcher already closed");
                }
                return Err(e);
            }
        };

        let (stop, stopped) = watch::channel(false);
        let handle = tokio::spawn(
            Arc::clone(pipeline)
                .run(events, stopped)
                .instrument(self.span.clone()),
        );
        // A worker left behind by a lost channel has already returned
        if let Some(previous) = self.worker.lock().replace(Worker { handle, stop }) {
            previous.handle.abort();
        }

        info!(
            parent: &self.span,
            routing_keys = self.routing_keys.len(),
            "Session opened"
        );
        Ok(())
    }

    /// Stop routing messages; the `closed` handlers fire once
    ///
    /// Waits for the message in hand to pass through the pipeline. Messages
    /// still queued in the channel are not processed.
    pub async fn close(&self) -> Result<()> {
        let pipeline = &self.pipeline;
        pipeline
            .opened
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| {
                SessionError::InvalidState(format!("session '{}' is not open", pipeline.name))
            })?;

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.stop.send_replace(true);
            if let Err(e) = worker.handle.await {
                warn!(parent: &self.span, error = %e, "Session worker ended abnormally");
            }
        }

        let receiver_result = self.receiver.close().await;
        if let Err(e) = &receiver_result {
            warn!(parent: &self.span, error = %e, "Message receiver failed to close");
        }

        pipeline.generic.close()?;
        info!(parent: &self.span, "Session closed");
        receiver_result
    }

    /// Register a dispatcher for a more specific resource type
    ///
    /// The application opens and closes it. While open it takes precedence
    /// over the session's `sport_event` dispatcher for every event the type
    /// mapper maps to `resource_type` or one of its descendants.
    pub fn create_sport_specific_dispatcher(
        &self,
        resource_type: ResourceType,
    ) -> Result<Arc<SpecificEntityDispatcher>> {
        let dispatcher = Arc::new(SpecificEntityDispatcher::new(
            format!("{}/{}", self.pipeline.name, resource_type),
            resource_type,
            self.locales.clone(),
            Arc::clone(&self.mapper),
            Arc::clone(&self.pipeline.metrics),
        ));
        self.pipeline
            .store
            .add(Arc::clone(&dispatcher) as Arc<dyn EntityDispatcher>)?;
        debug!(parent: &self.span, %resource_type, "Sport-specific dispatcher created");
        Ok(dispatcher)
    }

    pub fn on_odds_change<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&OddsChange) + Send + Sync + 'static,
    {
        self.pipeline.generic.on_odds_change(handler)
    }

    pub fn on_bet_stop<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&BetStop) + Send + Sync + 'static,
    {
        self.pipeline.generic.on_bet_stop(handler)
    }

    pub fn on_bet_cancel<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&BetCancel) + Send + Sync + 'static,
    {
        self.pipeline.generic.on_bet_cancel(handler)
    }

    pub fn on_bet_settlement<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&BetSettlement) + Send + Sync + 'static,
    {
        self.pipeline.generic.on_bet_settlement(handler)
    }

    pub fn on_fixture_change<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&FixtureChange) + Send + Sync + 'static,
    {
        self.pipeline.generic.on_fixture_change(handler)
    }

    pub fn on_rollback_bet_cancel<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&RollbackBetCancel) + Send + Sync + 'static,
    {
        self.pipeline.generic.on_rollback_bet_cancel(handler)
    }

    pub fn on_rollback_bet_settlement<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&RollbackBetSettlement) + Send + Sync + 'static,
    {
        self.pipeline.generic.on_rollback_bet_settlement(handler)
    }

    pub fn on_unparsable<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&UnparsableMessage) + Send + Sync + 'static,
    {
        self.pipeline.unparsable.subscribe(handler)
    }

    pub fn on_closed<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&DispatcherClosed) + Send + Sync + 'static,
    {
        self.pipeline.generic.on_closed(handler)
    }
}

impl Drop for FeedSession {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.handle.abort();
        }
    }
}

impl std::fmt::Debug for FeedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSession")
            .field("name", &self.pipeline.name)
            .field("interest", &self.pipeline.interest)
            .field("opened", &self.is_opened())
            .finish()
    }
}

/// Collaborators of a [`FeedSession`]; everything but the receiver and the
/// producer registry has a default
pub struct FeedSessionBuilder {
    interest: MessageInterest,
    receiver: Arc<dyn MessageReceiver>,
    producers: Arc<ProducerManager>,
    routing_keys: Vec<String>,
    locales: Vec<String>,
    validator: Option<Arc<dyn MessageValidator>>,
    extractor: Arc<dyn MessageDataExtractor>,
    mapper: Arc<dyn MessageMapper>,
    type_mapper: Arc<dyn TypeMapper>,
    observers: Vec<Arc<dyn MessageObserver>>,
    metrics: Arc<FeedMetrics>,
    clock: Arc<dyn Clock>,
}

impl FeedSessionBuilder {
    pub fn new(
        interest: MessageInterest,
        receiver: Arc<dyn MessageReceiver>,
        producers: Arc<ProducerManager>,
        config: &FeedConfig,
    ) -> Self {
        Self {
            routing_keys: interest.routing_keys(config.node_id),
            interest,
            receiver,
            producers,
            locales: config.locales(),
            validator: None,
            extractor: Arc::new(XmlBasicDataExtractor),
            mapper: Arc::new(HeaderMessageMapper),
            type_mapper: Arc::new(DefaultTypeMapper::new()),
            observers: Vec::new(),
            metrics: Arc::new(FeedMetrics::new()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn MessageValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn MessageDataExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn MessageMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn with_type_mapper(mut self, type_mapper: Arc<dyn TypeMapper>) -> Self {
        self.type_mapper = type_mapper;
        self
    }

    /// Observers see every validated message before dispatch, in registration order
    pub fn with_observer(mut self, observer: Arc<dyn MessageObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<FeedMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<FeedSession> {
        let name = format!(
            "{}-{}",
            self.interest.name(),
            SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        );
        let span = info_span!("feed_session", name = %name);

        let generic = Arc::new(SpecificEntityDispatcher::new(
            name.clone(),
            ResourceType::SPORT_EVENT,
            self.locales.clone(),
            Arc::clone(&self.mapper),
            Arc::clone(&self.metrics),
        ));
        let store = Arc::new(DispatcherStore::new(self.type_mapper));
        store.add(Arc::clone(&generic) as Arc<dyn EntityDispatcher>)?;

        let validator: Arc<dyn MessageValidator> = match self.validator {
            Some(validator) => validator,
            None => Arc::new(FeedMessageValidator::new(Arc::clone(&self.producers))),
        };

        debug!(
            parent: &span,
            interest = %self.interest,
            observers = self.observers.len(),
            "Session created"
        );

        Ok(FeedSession {
            pipeline: Arc::new(Pipeline {
                name,
                interest: self.interest,
                opened: AtomicBool::new(false),
                producers: self.producers,
                validator,
                extractor: self.extractor,
                observers: self.observers,
                store,
                generic,
                unparsable: Subscribers::new(),
                metrics: self.metrics,
                clock: self.clock,
            }),
            routing_keys: self.routing_keys,
            receiver: self.receiver,
            mapper: self.mapper,
            locales: self.locales,
            worker: Mutex::new(None),
            span,
        })
    }
}
