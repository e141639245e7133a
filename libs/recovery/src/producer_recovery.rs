//! Per-producer recovery coordination
//!
//! A [`ProducerRecoveryManager`] owns the producer's [`TimestampTracker`] and
//! [`RecoveryOperation`] and decides, on every watchdog tick, whether the
//! producer is healthy, behind, gone or in need of a recovery.
//!
//! ```text
//!  NotStarted ──start──▶ Started ──all interests complete──▶ Completed ◀──┐
//!      ▲                    │                                   │          │
//!      │                    └──timeout──▶ Error ──next tick──▶ start      │
//!      │                                                        ▼          │
//!      └──── alive violation / unsubscribed / connection down ─ Delayed ──┘
//! ```
//!
//! `Rejected` is terminal until [`ProducerRecoveryManager::reset`]: the
//! upstream refused the request, or the disconnect gap is larger than the
//! producer's recovery window.

use crate::error::RecoveryError;
use crate::issuer::RecoveryRequestIssuer;
use crate::operation::{RecoveryOperation, RecoveryResult, StartOutcome};
use crate::producer::Producer;
use crate::timestamp_tracker::TimestampTracker;
use chrono::{DateTime, Utc};
use feed_config::FeedConfig;
use feed_types::{Clock, FeedMessage, FeedMetrics, MessageInterest, MessageKind, Subscribers};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStatus {
    NotStarted,
    Started,
    Completed,
    /// Last recovery timed out or could not be issued; retried on the next tick
    Error,
    /// Feed is behind; no recovery needed, waits for content to catch up
    Delayed,
    /// Not retried automatically
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerStatusReason {
    FirstRecoveryCompleted,
    ReturnedFromInactivity,
    ProcessingQueueDelayStabilized,
    AliveIntervalViolation,
    ProcessingQueueDelayViolation,
    ConnectionDown,
    Unsubscribed,
}

/// Published whenever a producer goes down or comes back up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerStatusChange {
    pub producer_id: u32,
    pub is_down: bool,
    pub reason: ProducerStatusReason,
    pub timestamp: DateTime<Utc>,
    /// Set when the change was caused by a completed recovery
    pub recovery: Option<RecoveryResult>,
}

#[derive(Debug)]
struct ManagerState {
    status: RecoveryStatus,
    ever_completed: bool,
}

pub struct ProducerRecoveryManager {
    producer: Arc<Producer>,
    tracker: TimestampTracker,
    operation: RecoveryOperation,
    clock: Arc<dyn Clock>,
    metrics: Arc<FeedMetrics>,
    listeners: Arc<Subscribers<ProducerStatusChange>>,
    state: Mutex<ManagerState>,
    span: Span,
}

impl ProducerRecoveryManager {
    pub fn new(
        producer: Arc<Producer>,
        issuer: Arc<dyn RecoveryRequestIssuer>,
        interests: &[MessageInterest],
        config: &FeedConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<FeedMetrics>,
        listeners: Arc<Subscribers<ProducerStatusChange>>,
    ) -> Self {
        let tracker = TimestampTracker::new(
            Arc::clone(&producer),
            interests,
            Arc::clone(&clock),
            config.alive_violation_multiplier,
        );
        let operation = RecoveryOperation::new(
            Arc::clone(&producer),
            issuer,
            interests,
            config.node_id,
            config.adjust_after_age,
            Arc::clone(&clock),
        );
        let span = info_span!("producer_recovery", producer = producer.id());

        Self {
            producer,
            tracker,
            operation,
            clock,
            metrics,
            listeners,
            state: Mutex::new(ManagerState {
                status: RecoveryStatus::NotStarted,
                ever_completed: false,
            }),
            span,
        }
    }

    pub fn producer(&self) -> &Arc<Producer> {
        &self.producer
    }

    pub fn tracker(&self) -> &TimestampTracker {
        &self.tracker
    }

    pub fn operation(&self) -> &RecoveryOperation {
        &self.operation
    }

    pub async fn status(&self) -> RecoveryStatus {
        self.state.lock().await.status
    }

    /// Broker heartbeat from the system session
    pub async fn on_system_alive(&self, message: &FeedMessage) {
        self.tracker.process_system_alive(message.timestamp);
        if message.subscribed == Some(false) {
            self.handle_unsubscribed()
                .instrument(self.span.clone())
                .await;
        }
    }

    /// Message received on one of the user sessions
    pub async fn on_user_message(&self, interest: &MessageInterest, message: &FeedMessage) {
        self.tracker.process_user_message(interest, message);

        if message.is_alive() && message.subscribed == Some(false) {
            self.handle_unsubscribed()
                .instrument(self.span.clone())
                .await;
        } else if message.kind == MessageKind::SnapshotComplete {
            self.handle_snapshot_complete(interest, message)
                .instrument(self.span.clone())
                .await;
        }
    }

    /// Connection to the broker was lost at `at`
    pub async fn on_connection_down(&self, at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        self.operation.interrupt(at).await;
        self.mark_down(&mut state, ProducerStatusReason::ConnectionDown, at);
    }

    /// Watchdog tick
    pub async fn check_status(&self) -> RecoveryStatus {
        self.check_status_inner()
            .instrument(self.span.clone())
            .await
    }

    /// Leave `Rejected`/`Error` and let the next tick start a fresh recovery
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        self.operation.reset().await;
        if !matches!(state.status, RecoveryStatus::Completed | RecoveryStatus::Delayed) {
            state.status = RecoveryStatus::NotStarted;
        }
        info!(producer = self.producer.id(), "Producer recovery reset");
    }

    async fn check_status_inner(&self) -> RecoveryStatus {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        if state.status == RecoveryStatus::Started && self.operation.has_timed_out().await {
            match self.operation.complete_timed_out().await {
                Ok(result) => {
                    FeedMetrics::incr(&self.metrics.recoveries_timed_out);
                    warn!(
                        producer = self.producer.id(),
                        request_id = result.request_id,
                        interrupted_at = ?result.interrupted_at,
                        "Recovery timed out, restarting"
                    );
                    state.status = RecoveryStatus::Error;
                }
                Err(e) => debug!(error = %e, "Timed out recovery already settled"),
            }
        }

        if self.tracker.is_alive_violated() {
            self.mark_down(&mut state, ProducerStatusReason::AliveIntervalViolation, now);
            self.operation.interrupt(now).await;
            return state.status;
        }

        match state.status {
            RecoveryStatus::Completed => {
                if self.tracker.is_behind() {
                    self.mark_down(
                        &mut state,
                        ProducerStatusReason::ProcessingQueueDelayViolation,
                        now,
                    );
                    state.status = RecoveryStatus::Delayed;
                }
                return state.status;
            }
            RecoveryStatus::Delayed => {
                if !self.tracker.is_behind() {
                    state.status = RecoveryStatus::Completed;
                    self.mark_up(ProducerStatusReason::ProcessingQueueDelayStabilized, now, None);
                }
                return state.status;
            }
            RecoveryStatus::Started | RecoveryStatus::Rejected => return state.status,
            RecoveryStatus::NotStarted | RecoveryStatus::Error => {}
        }

        state.status = match self.operation.start().await {
            Ok(StartOutcome::Started { .. }) => {
                FeedMetrics::incr(&self.metrics.recoveries_started);
                RecoveryStatus::Started
            }
            Ok(StartOutcome::AlreadyRunning) => RecoveryStatus::Started,
            Ok(StartOutcome::Forbidden) => {
                FeedMetrics::incr(&self.metrics.recoveries_rejected);
                RecoveryStatus::Rejected
            }
            Err(e @ RecoveryError::InitiationFailed { .. }) => {
                FeedMetrics::incr(&self.metrics.recoveries_rejected);
                error!(error = %e, "Recovery cannot be initiated");
                RecoveryStatus::Rejected
            }
            Err(e) => {
                warn!(error = %e, "Recovery request failed, retrying on next tick");
                RecoveryStatus::Error
            }
        };
        state.status
    }

    async fn handle_snapshot_complete(&self, interest: &MessageInterest, message: &FeedMessage) {
        let mut state = self.state.lock().await;

        let Some(expected) = self.operation.request_id().await else {
            debug!(
                request_id = ?message.request_id,
                "Snapshot complete while no recovery is running"
            );
            return;
        };
        if message.request_id != Some(expected) {
            debug!(
                expected,
                request_id = ?message.request_id,
                "Snapshot complete for another request ignored"
            );
            return;
        }

        let Some(result) = self.operation.try_complete(interest).await else {
            return;
        };

        FeedMetrics::incr(&self.metrics.recoveries_completed);
        let reason = if state.ever_completed {
            ProducerStatusReason::ReturnedFromInactivity
        } else {
            ProducerStatusReason::FirstRecoveryCompleted
        };
        state.ever_completed = true;
        state.status = RecoveryStatus::Completed;
        self.remember_last_processed_timestamp();
        self.mark_up(reason, self.clock.now(), Some(result));
    }

    async fn handle_unsubscribed(&self) {
        let mut state = self.state.lock().await;
        warn!(producer = self.producer.id(), "Producer reports lost subscription");
        self.operation.reset().await;
        self.mark_down(&mut state, ProducerStatusReason::Unsubscribed, self.clock.now());
        if state.status != RecoveryStatus::Rejected {
            state.status = RecoveryStatus::NotStarted;
        }
    }

    fn remember_last_processed_timestamp(&self) {
        let timestamp = self
            .tracker
            .oldest_user_alive_timestamp()
            .and_then(DateTime::from_timestamp_millis);
        if timestamp.is_some() {
            self.producer.set_last_timestamp_before_disconnect(timestamp);
        }
    }

    fn mark_down(&self, state: &mut ManagerState, reason: ProducerStatusReason, at: DateTime<Utc>) {
        let lost_stream = reason != ProducerStatusReason::ProcessingQueueDelayViolation;
        if lost_stream
            && matches!(state.status, RecoveryStatus::Completed | RecoveryStatus::Delayed)
        {
            self.remember_last_processed_timestamp();
            state.status = RecoveryStatus::NotStarted;
        }

        if self.producer.is_producer_down() {
            return;
        }
        self.producer.set_producer_down(true);
        FeedMetrics::incr(&self.metrics.producers_down);
        warn!(producer = self.producer.id(), ?reason, "Producer down");
        self.publish(ProducerStatusChange {
            producer_id: self.producer.id(),
            is_down: true,
            reason,
            timestamp: at,
            recovery: None,
        });
    }

    fn mark_up(
        &self,
        reason: ProducerStatusReason,
        at: DateTime<Utc>,
        recovery: Option<RecoveryResult>,
    ) {
        if !self.producer.is_producer_down() {
            return;
        }
        self.producer.set_producer_down(false);
        FeedMetrics::incr(&self.metrics.producers_up);
        info!(producer = self.producer.id(), ?reason, "Producer up");
        self.publish(ProducerStatusChange {
            producer_id: self.producer.id(),
            is_down: false,
            reason,
            timestamp: at,
            recovery,
        });
    }

    fn publish(&self, change: ProducerStatusChange) {
        let outcome = self.listeners.notify(&change);
        if outcome.panicked > 0 {
            self.metrics
                .handler_panics
                .fetch_add(outcome.panicked as u64, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for ProducerRecoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerRecoveryManager")
            .field("producer", &self.producer.id())
            .field("tracker", &self.tracker)
            .field("operation", &self.operation)
            .finish()
    }
}
