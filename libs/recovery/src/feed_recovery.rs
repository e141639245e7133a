//! Feed-wide recovery coordination
//!
//! Holds one [`ProducerRecoveryManager`] per enabled producer, routes every
//! validated message to the manager of its producer and drives all watchdog
//! checks from one injected [`Timer`].
//!
//! Producers may still be disabled between construction and `open()`; a
//! manager whose producer is disabled by then never issues a request and
//! never sees a message.

use crate::error::{RecoveryError, Result};
use crate::issuer::RecoveryRequestIssuer;
use crate::producer_manager::ProducerManager;
use crate::producer_recovery::{ProducerRecoveryManager, ProducerStatusChange};
use crate::timer::{TickFn, Timer};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_config::FeedConfig;
use feed_types::{
    Clock, FeedMessage, FeedMetrics, MessageInterest, MessageKind, SubscriptionId, Subscribers,
};
use futures::FutureExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace};

/// Receives every message that passed validation, before dispatch
#[async_trait]
pub trait MessageObserver: Send + Sync {
    async fn on_message(&self, interest: &MessageInterest, message: &FeedMessage);

    /// The transport lost its connection at `at`
    async fn on_connection_down(&self, _at: DateTime<Utc>) {}
}

pub struct FeedRecoveryManager {
    producer_manager: Arc<ProducerManager>,
    managers: BTreeMap<u32, Arc<ProducerRecoveryManager>>,
    status_changes: Arc<Subscribers<ProducerStatusChange>>,
    timer: Arc<dyn Timer>,
    opened: AtomicBool,
}

impl FeedRecoveryManager {
    /// One recovery manager per producer that is available and not disabled
    pub fn new(
        producer_manager: Arc<ProducerManager>,
        issuer: Arc<dyn RecoveryRequestIssuer>,
        interests: &[MessageInterest],
        config: &FeedConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<FeedMetrics>,
        timer: Arc<dyn Timer>,
    ) -> Self {
        let status_changes = Arc::new(Subscribers::new());
        let managers = producer_manager
            .producers()
            .into_iter()
            .filter(|producer| producer.is_enabled())
            .map(|producer| {
                let manager = ProducerRecoveryManager::new(
                    Arc::clone(&producer),
                    Arc::clone(&issuer),
                    interests,
                    config,
                    Arc::clone(&clock),
                    Arc::clone(&metrics),
                    Arc::clone(&status_changes),
                );
                (producer.id(), Arc::new(manager))
            })
            .collect::<BTreeMap<_, _>>();

        info!(
            producers = ?managers.keys().collect::<Vec<_>>(),
            "Feed recovery manager created"
        );

        Self {
            producer_manager,
            managers,
            status_changes,
            timer,
            opened: AtomicBool::new(false),
        }
    }

    /// Lock the producer registry and start the watchdog
    pub async fn open(self: &Arc<Self>) -> Result<()> {
        if self.opened.swap(true, Ordering::SeqCst) {
            return Err(RecoveryError::InvalidState(
                "feed recovery manager is already open".to_string(),
            ));
        }

        self.producer_manager.lock();

        let weak: Weak<Self> = Arc::downgrade(self);
        let tick: TickFn = Arc::new(move || {
            let weak = weak.clone();
            async move {
                if let Some(manager) = weak.upgrade() {
                    manager.check_all().await;
                }
            }
            .boxed()
        });
        self.timer.start(tick).await;
        info!("Feed recovery manager opened");
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        if !self.opened.swap(false, Ordering::SeqCst) {
            return Err(RecoveryError::InvalidState(
                "feed recovery manager is not open".to_string(),
            ));
        }
        self.timer.stop();
        info!("Feed recovery manager closed");
        Ok(())
    }

    pub fn is_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    /// Managers whose producer is still enabled
    fn active(&self) -> impl Iterator<Item = &Arc<ProducerRecoveryManager>> {
        self.managers
            .values()
            .filter(|manager| manager.producer().is_enabled())
    }

    /// Run the status check of every enabled producer
    pub async fn check_all(&self) {
        for manager in self.active() {
            let status = manager.check_status().await;
            trace!(producer = manager.producer().id(), ?status, "Producer checked");
        }
    }

    pub fn producer_recovery(&self, producer_id: u32) -> Option<Arc<ProducerRecoveryManager>> {
        self.managers
            .get(&producer_id)
            .filter(|manager| manager.producer().is_enabled())
            .cloned()
    }

    pub fn on_status_change<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ProducerStatusChange) + Send + Sync + 'static,
    {
        self.status_changes.subscribe(handler)
    }

    pub fn remove_status_change(&self, id: SubscriptionId) -> bool {
        self.status_changes.unsubscribe(id)
    }
}

#[async_trait]
impl MessageObserver for FeedRecoveryManager {
    async fn on_message(&self, interest: &MessageInterest, message: &FeedMessage) {
        let Some(manager) = self.producer_recovery(message.producer_id) else {
            trace!(
                producer = message.producer_id,
                "Message from producer without recovery manager"
            );
            return;
        };

        if interest.is_system() {
            if message.kind == MessageKind::Alive {
                manager.on_system_alive(message).await;
            } else {
                debug!(kind = ?message.kind, "Non-alive message on system session ignored");
            }
        } else {
            manager.on_user_message(interest, message).await;
        }
    }

    async fn on_connection_down(&self, at: DateTime<Utc>) {
        for manager in self.active() {
            manager.on_connection_down(at).await;
        }
    }
}

impl std::fmt::Debug for FeedRecoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedRecoveryManager")
            .field("producers", &self.managers.keys().collect::<Vec<_>>())
            .field("opened", &self.is_opened())
            .finish()
    }
}
