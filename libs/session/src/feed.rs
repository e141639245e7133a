//! # Feed
//!
//! Composition root of the consumer. A [`Feed`] owns:
//!
//! - the internal `SystemAliveMessages` session watching broker heartbeats
//! - one [`FeedSession`] per user interest
//! - one [`FeedRecoveryManager`] observing every session, ticked by an
//!   [`IntervalTimer`] with the configured `recovery_check_interval`
//! - the [`FeedMetrics`] and [`Clock`] handed to all of them
//!
//! The user interests must form a valid combination (see
//! [`MessageInterest::validate_combination`]).

use crate::error::{Result, SessionError};
use crate::receiver::MessageReceiver;
use crate::session::FeedSession;
use feed_config::FeedConfig;
use feed_dispatch::{DefaultTypeMapper, TypeMapper};
use feed_recovery::{
    FeedRecoveryManager, IntervalTimer, MessageObserver, ProducerManager, RecoveryRequestIssuer,
    Timer,
};
use feed_types::{Clock, FeedMetrics, MessageInterest, SystemClock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Feed {
    producers: Arc<ProducerManager>,
    recovery: Arc<FeedRecoveryManager>,
    system: FeedSession,
    sessions: Vec<FeedSession>,
    metrics: Arc<FeedMetrics>,
    opened: AtomicBool,
}

impl Feed {
    pub fn builder(
        config: FeedConfig,
        producers: Arc<ProducerManager>,
        issuer: Arc<dyn RecoveryRequestIssuer>,
        system_receiver: Arc<dyn MessageReceiver>,
    ) -> FeedBuilder {
        FeedBuilder::new(config, producers, issuer, system_receiver)
    }

    pub fn producers(&self) -> &Arc<ProducerManager> {
        &self.producers
    }

    pub fn recovery(&self) -> &Arc<FeedRecoveryManager> {
        &self.recovery
    }

    pub fn metrics(&self) -> &Arc<FeedMetrics> {
        &self.metrics
    }

    pub fn system_session(&self) -> &FeedSession {
        &self.system
    }

    /// User sessions in the order they were added
    pub fn sessions(&self) -> &[FeedSession] {
        &self.sessions
    }

    pub fn session(&self, interest: &MessageInterest) -> Option<&FeedSession> {
        self.sessions
            .iter()
            .find(|session| session.interest() == interest)
    }

    pub fn is_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    fn all_sessions(&self) -> impl Iterator<Item = &FeedSession> {
        std::iter::once(&self.system).chain(self.sessions.iter())
    }

    /// Open every session, then lock the producers and start the watchdog
    ///
    /// Sessions opened before a failure are closed again.
    pub async fn open(&self) -> Result<()> {
        self.opened
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| SessionError::InvalidState("feed is already open".to_string()))?;

        let mut opened = Vec::new();
        for session in self.all_sessions() {
            match session.open().await {
                Ok(()) => opened.push(session),
                Err(e) => {
                    warn!(session = session.name(), error = %e, "Session failed to open");
                    self.rollback(&opened).await;
                    return Err(e);
                }
            }
        }

        if let Err(e) = self.recovery.open().await {
            self.rollback(&opened).await;
            return Err(e.into());
        }

        info!(sessions = opened.len(), "Feed opened");
        Ok(())
    }

    async fn rollback(&self, opened: &[&FeedSession]) {
        for session in opened.iter().rev() {
            if let Err(e) = session.close().await {
                debug!(session = session.name(), error = %e, "Rollback close failed");
            }
        }
        self.opened.store(false, Ordering::SeqCst);
    }

    /// Stop the watchdog and close every session still open
    ///
    /// Sessions that already closed on a lost channel are skipped. The first
    /// failure is returned after every session had its chance to close.
    pub async fn close(&self) -> Result<()> {
        self.opened
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| SessionError::InvalidState("feed is not open".to_string()))?;

        if let Err(e) = self.recovery.close() {
            debug!(error = %e, "Recovery manager already closed");
        }

        let mut first_error = None;
        let sessions: Vec<&FeedSession> = self.all_sessions().collect();
        for session in sessions.into_iter().rev() {
            if !session.is_opened() {
                debug!(session = session.name(), "Session already closed");
                continue;
            }
            if let Err(e) = session.close().await {
                warn!(session = session.name(), error = %e, "Session failed to close");
                first_error.get_or_insert(e);
            }
        }

        info!("Feed closed");
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field(
                "sessions",
                &self.all_sessions().map(FeedSession::name).collect::<Vec<_>>(),
            )
            .field("opened", &self.is_opened())
            .finish()
    }
}

pub struct FeedBuilder {
    config: FeedConfig,
    producers: Arc<ProducerManager>,
    issuer: Arc<dyn RecoveryRequestIssuer>,
    system_receiver: Arc<dyn MessageReceiver>,
    sessions: Vec<(MessageInterest, Arc<dyn MessageReceiver>)>,
    type_mapper: Arc<dyn TypeMapper>,
    timer: Option<Arc<dyn Timer>>,
    metrics: Arc<FeedMetrics>,
    clock: Arc<dyn Clock>,
}

impl FeedBuilder {
    pub fn new(
        config: FeedConfig,
        producers: Arc<ProducerManager>,
        issuer: Arc<dyn RecoveryRequestIssuer>,
        system_receiver: Arc<dyn MessageReceiver>,
    ) -> Self {
        Self {
            config,
            producers,
            issuer,
            system_receiver,
            sessions: Vec::new(),
            type_mapper: Arc::new(DefaultTypeMapper::new()),
            timer: None,
            metrics: Arc::new(FeedMetrics::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Add a user session bound to `interest`
    pub fn with_session(
        mut self,
        interest: MessageInterest,
        receiver: Arc<dyn MessageReceiver>,
    ) -> Self {
        self.sessions.push((interest, receiver));
        self
    }

    pub fn with_type_mapper(mut self, type_mapper: Arc<dyn TypeMapper>) -> Self {
        self.type_mapper = type_mapper;
        self
    }

    /// Replace the interval timer built from `recovery_check_interval`
    pub fn with_timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = Some(timer);
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

    pub fn build(self) -> Result<Feed> {
        let interests: Vec<MessageInterest> = self
            .sessions
            .iter()
            .map(|(interest, _)| interest.clone())
            .collect();
        MessageInterest::validate_combination(&interests)?;
        if interests.iter().any(MessageInterest::is_system) {
            return Err(SessionError::InvalidState(
                "the system alive interest is reserved for the feed".to_string(),
            ));
        }

        let timer: Arc<dyn Timer> = match self.timer {
            Some(timer) => timer,
            None => {
                let interval = self.config.recovery_check_interval();
                Arc::new(IntervalTimer::new(interval, interval))
            }
        };

        let recovery = Arc::new(FeedRecoveryManager::new(
            Arc::clone(&self.producers),
            self.issuer,
            &interests,
            &self.config,
            Arc::clone(&self.clock),
            Arc::clone(&self.metrics),
            timer,
        ));

        let session = |interest: MessageInterest, receiver: Arc<dyn MessageReceiver>| {
            FeedSession::builder(interest, receiver, Arc::clone(&self.producers), &self.config)
                .with_type_mapper(Arc::clone(&self.type_mapper))
                .with_observer(Arc::clone(&recovery) as Arc<dyn MessageObserver>)
                .with_metrics(Arc::clone(&self.metrics))
                .with_clock(Arc::clone(&self.clock))
                .build()
        };

        let system = session(MessageInterest::SystemAliveMessages, self.system_receiver)?;
        let sessions = self
            .sessions
            .into_iter()
            .map(|(interest, receiver)| session(interest, receiver))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            interests = ?interests.iter().map(MessageInterest::name).collect::<Vec<_>>(),
            check_interval = ?self.config.recovery_check_interval(),
            "Feed built"
        );

        Ok(Feed {
            producers: self.producers,
            recovery,
            system,
            sessions,
            metrics: self.metrics,
            opened: AtomicBool::new(false),
        })
    }
}
