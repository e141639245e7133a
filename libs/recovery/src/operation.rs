//! Recovery operation state machine
//!
//! ```text
//!            start()                 try_complete() for every interest
//!   Idle ─────────────▶ Running ───────────────────────────────────▶ Idle (result)
//!    ▲                   │  ▲ │
//!    │   reset()         │  │ │ interrupt(t)  (earliest t kept)
//!    └───────────────────┘  └─┘
//!    ▲                   │
//!    └───────────────────┘ complete_timed_out() once has_timed_out()
//! ```
//!
//! One operation exists per producer and interest set. Completion arrives from
//! message-processing tasks while timeouts and interruptions arrive from the
//! watchdog, so every transition runs under one async mutex. The request id is
//! part of the running state: it exists exactly while the operation runs.

use crate::error::{RecoveryError, Result};
use crate::issuer::RecoveryRequestIssuer;
use crate::producer::Producer;
use chrono::{DateTime, Utc};
use feed_types::{Clock, MessageInterest};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Which kind of recovery request was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryKind {
    Full,
    AfterTimestamp(DateTime<Utc>),
}

/// Outcome of [`RecoveryOperation::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { request_id: i64, kind: RecoveryKind },
    /// A recovery is already in flight, nothing was issued
    AlreadyRunning,
    /// The upstream refused the request; the operation stays idle
    Forbidden,
}

impl StartOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, StartOutcome::Started { .. })
    }
}

/// Result of a finished recovery run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    pub producer_id: u32,
    pub request_id: i64,
    pub kind: RecoveryKind,
    pub success: bool,
    pub timed_out: bool,
    pub started_at: DateTime<Utc>,
    /// First connection loss seen while the recovery was running
    pub interrupted_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct RunningRecovery {
    request_id: i64,
    kind: RecoveryKind,
    started_at: DateTime<Utc>,
    interrupted_at: Option<DateTime<Utc>>,
    completed: HashSet<MessageInterest>,
}

impl RunningRecovery {
    fn finish(self, producer_id: u32, timed_out: bool) -> RecoveryResult {
        RecoveryResult {
            producer_id,
            request_id: self.request_id,
            kind: self.kind,
            success: !timed_out,
            timed_out,
            started_at: self.started_at,
            interrupted_at: self.interrupted_at,
        }
    }
}

pub struct RecoveryOperation {
    producer: Arc<Producer>,
    issuer: Arc<dyn RecoveryRequestIssuer>,
    interests: Vec<MessageInterest>,
    node_id: Option<i32>,
    adjust_after_age: bool,
    clock: Arc<dyn Clock>,
    running: Mutex<Option<RunningRecovery>>,
}

impl RecoveryOperation {
    pub fn new(
        producer: Arc<Producer>,
        issuer: Arc<dyn RecoveryRequestIssuer>,
        interests: &[MessageInterest],
        node_id: Option<i32>,
        adjust_after_age: bool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut unique = Vec::with_capacity(interests.len());
        for interest in interests.iter().filter(|i| !i.is_system()) {
            if !unique.contains(interest) {
                unique.push(interest.clone());
            }
        }

        Self {
            producer,
            issuer,
            interests: unique,
            node_id,
            adjust_after_age,
            clock,
            running: Mutex::new(None),
        }
    }

    pub fn producer(&self) -> &Arc<Producer> {
        &self.producer
    }

    pub fn interests(&self) -> &[MessageInterest] {
        &self.interests
    }

    /// Issue a recovery request unless one is already running
    ///
    /// A producer that was never disconnected gets a full recovery; otherwise
    /// the request replays from its last timestamp before disconnect. A
    /// timestamp older than the producer's `max_after_age` fails with
    /// [`RecoveryError::InitiationFailed`] before anything is issued, unless
    /// `adjust_after_age` clamps it to the oldest allowed instant.
    pub async fn start(&self) -> Result<StartOutcome> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            debug!(
                producer = self.producer.id(),
                request_id = current.request_id,
                "Recovery already running"
            );
            return Ok(StartOutcome::AlreadyRunning);
        }

        let now = self.clock.now();
        let kind = self.recovery_kind(now)?;

        let issued = match kind {
            RecoveryKind::Full => {
                self.issuer
                    .request_full_odds_recovery(&self.producer, self.node_id)
                    .await
            }
            RecoveryKind::AfterTimestamp(after) => {
                self.issuer
                    .request_recovery_after_timestamp(&self.producer, after, self.node_id)
                    .await
            }
        };

        match issued {
            Ok(request_id) => {
                info!(
                    producer = self.producer.id(),
                    request_id,
                    ?kind,
                    "Recovery started"
                );
                *running = Some(RunningRecovery {
                    request_id,
                    kind,
                    started_at: now,
                    interrupted_at: None,
                    completed: HashSet::new(),
                });
                Ok(StartOutcome::Started { request_id, kind })
            }
            Err(e) if e.is_forbidden() => {
                warn!(
                    producer = self.producer.id(),
                    error = %e,
                    "Recovery request rejected as forbidden"
                );
                Ok(StartOutcome::Forbidden)
            }
            Err(e) => {
                warn!(producer = self.producer.id(), error = %e, "Recovery request failed");
                Err(e.into())
            }
        }
    }

    fn recovery_kind(&self, now: DateTime<Utc>) -> Result<RecoveryKind> {
        let Some(after) = self.producer.last_timestamp_before_disconnect() else {
            return Ok(RecoveryKind::Full);
        };

        let max_age = self.producer.max_after_age();
        let Some(oldest_allowed) = now.checked_sub_signed(max_age) else {
            return Ok(RecoveryKind::AfterTimestamp(after));
        };

        if after >= oldest_allowed {
            return Ok(RecoveryKind::AfterTimestamp(after));
        }

        if !self.adjust_after_age {
            return Err(RecoveryError::InitiationFailed {
                producer_id: self.producer.id(),
                reason: format!(
                    "last timestamp before disconnect {} is older than the allowed {} minutes",
                    after,
                    max_age.num_minutes()
                ),
            });
        }

        warn!(
            producer = self.producer.id(),
            %after,
            adjusted = %oldest_allowed,
            "Recovery timestamp too old, adjusting"
        );
        Ok(RecoveryKind::AfterTimestamp(oldest_allowed))
    }

    /// Mark `interest` complete; yields the result once every interest is
    pub async fn try_complete(&self, interest: &MessageInterest) -> Option<RecoveryResult> {
        let mut running = self.running.lock().await;
        let current = running.as_mut()?;

        if !self.interests.contains(interest) {
            warn!(
                producer = self.producer.id(),
                %interest,
                "Snapshot complete for an interest this recovery does not track"
            );
            return None;
        }

        if !current.completed.insert(interest.clone()) {
            debug!(producer = self.producer.id(), %interest, "Interest already completed");
            return None;
        }

        if current.completed.len() < self.interests.len() {
            debug!(
                producer = self.producer.id(),
                %interest,
                remaining = self.interests.len() - current.completed.len(),
                "Interest recovery completed"
            );
            return None;
        }

        let finished = running.take()?;
        info!(
            producer = self.producer.id(),
            request_id = finished.request_id,
            "Recovery completed"
        );
        Some(finished.finish(self.producer.id(), false))
    }

    /// Running for longer than the producer's `max_recovery_time`
    pub async fn has_timed_out(&self) -> bool {
        let running = self.running.lock().await;
        running
            .as_ref()
            .is_some_and(|current| self.is_timed_out(current))
    }

    /// Close a timed out run with a failed result
    pub async fn complete_timed_out(&self) -> Result<RecoveryResult> {
        let mut running = self.running.lock().await;
        let current = running
            .as_ref()
            .ok_or_else(|| RecoveryError::InvalidState("no recovery is running".to_string()))?;
        if !self.is_timed_out(current) {
            return Err(RecoveryError::InvalidState(format!(
                "recovery {} has not timed out",
                current.request_id
            )));
        }

        let finished = running
            .take()
            .ok_or_else(|| RecoveryError::InvalidState("no recovery is running".to_string()))?;
        warn!(
            producer = self.producer.id(),
            request_id = finished.request_id,
            "Recovery timed out"
        );
        Ok(finished.finish(self.producer.id(), true))
    }

    /// Remember the first connection loss of the running recovery
    pub async fn interrupt(&self, at: DateTime<Utc>) {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_mut() {
            if current.interrupted_at.is_none() {
                debug!(producer = self.producer.id(), %at, "Recovery interrupted");
                current.interrupted_at = Some(at);
            }
        }
    }

    /// Drop any running recovery without a result
    pub async fn reset(&self) {
        if let Some(dropped) = self.running.lock().await.take() {
            debug!(
                producer = self.producer.id(),
                request_id = dropped.request_id,
                "Recovery reset"
            );
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn request_id(&self) -> Option<i64> {
        self.running.lock().await.as_ref().map(|c| c.request_id)
    }

    pub async fn interrupted_at(&self) -> Option<DateTime<Utc>> {
        self.running
            .lock()
            .await
            .as_ref()
            .and_then(|c| c.interrupted_at)
    }

    fn is_timed_out(&self, current: &RunningRecovery) -> bool {
        self.clock.now().signed_duration_since(current.started_at)
            > self.producer.max_recovery_time()
    }
}

impl std::fmt::Debug for RecoveryOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryOperation")
            .field("producer", &self.producer.id())
            .field("interests", &self.interests)
            .field("node_id", &self.node_id)
            .field("adjust_after_age", &self.adjust_after_age)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommunicationError;
    use crate::issuer::test_support::{IssuedRequest, RecordingIssuer};
    use crate::producer::test_support::producer;
    use feed_types::{ManualClock, ProducerScope};
    use std::time::Duration;

    const START: i64 = 1_700_000_000_000;

    struct Fixture {
        producer: Arc<Producer>,
        issuer: Arc<RecordingIssuer>,
        clock: ManualClock,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                producer: Arc::new(producer(1, vec![ProducerScope::Live, ProducerScope::Prematch])),
                issuer: Arc::new(RecordingIssuer::default()),
                clock: ManualClock::at_millis(START),
            }
        }

        fn operation(&self, interests: &[MessageInterest], adjust_after_age: bool) -> RecoveryOperation {
            RecoveryOperation::new(
                Arc::clone(&self.producer),
                self.issuer.clone(),
                interests,
                Some(7),
                adjust_after_age,
                Arc::new(self.clock.clone()),
            )
        }
    }

    fn live_and_prematch() -> Vec<MessageInterest> {
        vec![
            MessageInterest::LiveMessagesOnly,
            MessageInterest::PrematchMessagesOnly,
        ]
    }

    #[tokio::test]
    async fn second_start_does_not_reissue() {
        let fixture = Fixture::new();
        let operation = fixture.operation(&live_and_prematch(), false);

        let first = operation.start().await.unwrap();
        assert_eq!(
            first,
            StartOutcome::Started {
                request_id: 1,
                kind: RecoveryKind::Full
            }
        );
        assert_eq!(operation.start().await.unwrap(), StartOutcome::AlreadyRunning);
        assert_eq!(fixture.issuer.issued(), vec![IssuedRequest::Full { producer_id: 1 }]);
        assert_eq!(operation.request_id().await, Some(1));
    }

    #[tokio::test]
    async fn too_old_timestamp_fails_without_request() {
        let fixture = Fixture::new();
        let after = fixture.clock.now()
            - fixture.producer.max_after_age()
            - chrono::Duration::seconds(30);
        fixture.producer.set_last_timestamp_before_disconnect(Some(after));

        let operation = fixture.operation(&live_and_prematch(), false);
        let err = operation.start().await.unwrap_err();
        assert!(matches!(err, RecoveryError::InitiationFailed { producer_id: 1, .. }));
        assert!(fixture.issuer.issued().is_empty());
        assert!(!operation.is_running().await);
    }

    #[tokio::test]
    async fn too_old_timestamp_is_clamped_when_adjusting() {
        let fixture = Fixture::new();
        let max_age = fixture.producer.max_after_age();
        let after = fixture.clock.now() - max_age - chrono::Duration::seconds(30);
        fixture.producer.set_last_timestamp_before_disconnect(Some(after));

        let operation = fixture.operation(&live_and_prematch(), true);
        assert!(operation.start().await.unwrap().is_started());
        assert_eq!(
            fixture.issuer.issued(),
            vec![IssuedRequest::After {
                producer_id: 1,
                after: fixture.clock.now() - max_age
            }]
        );
    }

    #[tokio::test]
    async fn recent_timestamp_is_used_unmodified() {
        let fixture = Fixture::new();
        let after = fixture.clock.now() - chrono::Duration::minutes(5);
        fixture.producer.set_last_timestamp_before_disconnect(Some(after));

        let operation = fixture.operation(&live_and_prematch(), false);
        let outcome = operation.start().await.unwrap();
        assert_eq!(
            outcome,
            StartOutcome::Started {
                request_id: 1,
                kind: RecoveryKind::AfterTimestamp(after)
            }
        );
    }

    #[tokio::test]
    async fn completes_once_all_interests_completed() {
        let fixture = Fixture::new();
        let operation = fixture.operation(&live_and_prematch(), false);
        operation.start().await.unwrap();

        assert!(operation
            .try_complete(&MessageInterest::PrematchMessagesOnly)
            .await
            .is_none());
        // Repeated completion of the same interest does not count twice
        assert!(operation
            .try_complete(&MessageInterest::PrematchMessagesOnly)
            .await
            .is_none());
        // Foreign interest is ignored
        assert!(operation
            .try_complete(&MessageInterest::VirtualSportMessages)
            .await
            .is_none());

        let result = operation
            .try_complete(&MessageInterest::LiveMessagesOnly)
            .await
            .unwrap();
        assert!(result.success);
        assert!(!result.timed_out);
        assert_eq!(result.request_id, 1);
        assert!(!operation.is_running().await);
        assert_eq!(operation.request_id().await, None);

        // Idle again, a late completion yields nothing
        assert!(operation
            .try_complete(&MessageInterest::LiveMessagesOnly)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn completion_order_does_not_matter() {
        let interests = vec![
            MessageInterest::LiveMessagesOnly,
            MessageInterest::PrematchMessagesOnly,
            MessageInterest::HighPriorityMessages,
        ];
        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

        for order in orders {
            let fixture = Fixture::new();
            let operation = fixture.operation(&interests, false);
            operation.start().await.unwrap();

            let (last, pending) = order.split_last().unwrap();
            for &index in pending {
                assert!(
                    operation.try_complete(&interests[index]).await.is_none(),
                    "order {:?} completed early",
                    order
                );
            }

            let result = operation.try_complete(&interests[*last]).await.unwrap();
            assert!(result.success, "order {:?}", order);
            assert_eq!(result.request_id, 1);
            assert!(!operation.is_running().await);
        }
    }

    #[tokio::test]
    async fn times_out_after_max_recovery_time() {
        let fixture = Fixture::new();
        let operation = fixture.operation(&[MessageInterest::AllMessages], false);
        operation.start().await.unwrap();

        let max = fixture.producer.max_recovery_time().num_seconds() as u64;
        fixture.clock.advance(Duration::from_secs(max - 1));
        assert!(!operation.has_timed_out().await);
        assert!(matches!(
            operation.complete_timed_out().await,
            Err(RecoveryError::InvalidState(_))
        ));

        fixture.clock.advance(Duration::from_secs(2));
        assert!(operation.has_timed_out().await);

        let result = operation.complete_timed_out().await.unwrap();
        assert!(!result.success);
        assert!(result.timed_out);
        assert!(!operation.is_running().await);
        assert!(operation.complete_timed_out().await.is_err());
    }

    #[tokio::test]
    async fn earliest_interruption_is_kept() {
        let fixture = Fixture::new();
        let operation = fixture.operation(&[MessageInterest::AllMessages], false);

        // Not running: ignored
        operation.interrupt(fixture.clock.now()).await;
        operation.start().await.unwrap();
        assert_eq!(operation.interrupted_at().await, None);

        let first = fixture.clock.now() + chrono::Duration::seconds(10);
        operation.interrupt(first).await;
        operation
            .interrupt(first + chrono::Duration::seconds(10))
            .await;
        assert_eq!(operation.interrupted_at().await, Some(first));

        fixture.clock.advance(Duration::from_secs(3601));
        let result = operation.complete_timed_out().await.unwrap();
        assert_eq!(result.interrupted_at, Some(first));
    }

    #[tokio::test]
    async fn forbidden_leaves_operation_idle() {
        let fixture = Fixture::new();
        fixture
            .issuer
            .fail_next(CommunicationError::new("not allowed", 403, "/recovery"));
        let operation = fixture.operation(&[MessageInterest::AllMessages], false);

        assert_eq!(operation.start().await.unwrap(), StartOutcome::Forbidden);
        assert!(!operation.is_running().await);

        // Retry is up to the caller
        assert!(operation.start().await.unwrap().is_started());
        assert_eq!(fixture.issuer.issued().len(), 2);
    }

    #[tokio::test]
    async fn communication_failure_propagates() {
        let fixture = Fixture::new();
        fixture
            .issuer
            .fail_next(CommunicationError::new("bad gateway", 502, "/recovery"));
        let operation = fixture.operation(&[MessageInterest::AllMessages], false);

        let err = operation.start().await.unwrap_err();
        assert!(matches!(err, RecoveryError::Communication(ref e) if e.status == 502));
        assert!(!operation.is_running().await);
    }

    #[tokio::test]
    async fn reset_is_safe_when_idle() {
        let fixture = Fixture::new();
        let operation = fixture.operation(&[MessageInterest::AllMessages], false);
        operation.reset().await;

        operation.start().await.unwrap();
        operation.reset().await;
        assert!(!operation.is_running().await);
        assert!(operation.start().await.unwrap().is_started());
    }
}
