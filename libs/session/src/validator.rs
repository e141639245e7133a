//! Structured message validation
//!
//! Runs after deserialization and before any observer or dispatcher sees the
//! message. A `Failure` keeps the message away from the application entirely;
//! `ProblemsDetected` is reported but the message still flows on.

use feed_recovery::ProducerManager;
use feed_types::{FeedMessage, MessageKind, RequestIdUsage};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Success,
    /// Usable message with non-fatal defects
    ProblemsDetected(Vec<String>),
    Failure(String),
}

impl ValidationResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, ValidationResult::Failure(_))
    }
}

pub trait MessageValidator: Send + Sync {
    fn validate(&self, message: &FeedMessage) -> ValidationResult;
}

/// Checks producer, event id, request id usage and timestamp
#[derive(Debug)]
pub struct FeedMessageValidator {
    producers: Arc<ProducerManager>,
}

impl FeedMessageValidator {
    pub fn new(producers: Arc<ProducerManager>) -> Self {
        Self { producers }
    }
}

impl MessageValidator for FeedMessageValidator {
    fn validate(&self, message: &FeedMessage) -> ValidationResult {
        if message.kind == MessageKind::Unknown {
            return ValidationResult::Failure("unsupported message type".to_string());
        }

        if !self.producers.exists(message.producer_id) {
            return ValidationResult::Failure(format!(
                "unknown producer {}",
                message.producer_id
            ));
        }

        if message.kind.is_event_message() && message.event_urn().is_none() {
            return ValidationResult::Failure(format!(
                "event id {:?} is not a valid URN",
                message.event_id
            ));
        }

        let mut problems = Vec::new();
        match (message.kind.request_id_usage(), message.request_id) {
            (RequestIdUsage::Required, None) => {
                return ValidationResult::Failure(format!(
                    "{} requires a request id",
                    message.kind
                ));
            }
            (RequestIdUsage::Required, Some(id)) if id <= 0 => {
                return ValidationResult::Failure(format!("request id {} is not positive", id));
            }
            (RequestIdUsage::Forbidden, Some(id)) => {
                problems.push(format!("{} must not carry request id {}", message.kind, id));
            }
            _ => {}
        }

        if message.timestamp <= 0 {
            problems.push(format!("timestamp {} is not positive", message.timestamp));
        }

        if message.kind.is_event_message() && message.sport_id.is_none() {
            problems.push("sport id is missing".to_string());
        }

        if problems.is_empty() {
            ValidationResult::Success
        } else {
            ValidationResult::ProblemsDetected(problems)
        }
    }
}
