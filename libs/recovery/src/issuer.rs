//! Recovery request issuer seam
//!
//! Implementations talk to the upstream REST API and return the request id
//! the upstream will echo in the closing `snapshot_complete` message. They
//! are expected to apply their own network timeout.

use crate::error::CommunicationError;
use crate::producer::Producer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait RecoveryRequestIssuer: Send + Sync {
    /// Replay the current state of every event of the producer
    async fn request_full_odds_recovery(
        &self,
        producer: &Producer,
        node_id: Option<i32>,
    ) -> Result<i64, CommunicationError>;

    /// Replay every message generated after `after`
    async fn request_recovery_after_timestamp(
        &self,
        producer: &Producer,
        after: DateTime<Utc>,
        node_id: Option<i32>,
    ) -> Result<i64, CommunicationError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum IssuedRequest {
        Full { producer_id: u32 },
        After { producer_id: u32, after: DateTime<Utc> },
    }

    /// Records every request and answers from a scripted queue
    #[derive(Debug, Default)]
    pub struct RecordingIssuer {
        pub requests: Mutex<Vec<IssuedRequest>>,
        failures: Mutex<VecDeque<CommunicationError>>,
        next_request_id: Mutex<i64>,
    }

    impl RecordingIssuer {
        pub fn fail_next(&self, error: CommunicationError) {
            self.failures.lock().push_back(error);
        }

        pub fn issued(&self) -> Vec<IssuedRequest> {
            self.requests.lock().clone()
        }

        fn answer(&self, request: IssuedRequest) -> Result<i64, CommunicationError> {
            self.requests.lock().push(request);
            if let Some(error) = self.failures.lock().pop_front() {
                return Err(error);
            }
            let mut next = self.next_request_id.lock();
            *next += 1;
            Ok(*next)
        }
    }

    #[async_trait]
    impl RecoveryRequestIssuer for RecordingIssuer {
        async fn request_full_odds_recovery(
            &self,
            producer: &Producer,
            _node_id: Option<i32>,
        ) -> Result<i64, CommunicationError> {
            self.answer(IssuedRequest::Full {
                producer_id: producer.id(),
            })
        }

        async fn request_recovery_after_timestamp(
            &self,
            producer: &Producer,
            after: DateTime<Utc>,
            _node_id: Option<i32>,
        ) -> Result<i64, CommunicationError> {
            self.answer(IssuedRequest::After {
                producer_id: producer.id(),
                after,
            })
        }
    }
}
