//! Error types for the producer registry and the recovery state machines

use thiserror::Error;

/// Errors raised by the [`ProducerManager`](crate::ProducerManager)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProducerError {
    #[error("Producer '{0}' not found")]
    NotFound(String),

    #[error("Producer manager is locked, producer {producer_id} can no longer be modified")]
    Locked { producer_id: u32 },
}

/// Failure of a call made through the recovery request issuer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Recovery request to {url} failed with status {status}: {message}")]
pub struct CommunicationError {
    pub message: String,
    /// HTTP-like status code, 0 when the request never reached the server
    pub status: u16,
    pub url: String,
}

impl CommunicationError {
    pub const FORBIDDEN: u16 = 403;

    pub fn new(message: impl Into<String>, status: u16, url: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status,
            url: url.into(),
        }
    }

    /// The upstream refused to replay the requested window
    pub fn is_forbidden(&self) -> bool {
        self.status == Self::FORBIDDEN
    }
}

/// Errors raised while starting or completing a recovery
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecoveryError {
    #[error("Recovery initiation failed for producer {producer_id}: {reason}")]
    InitiationFailed { producer_id: u32, reason: String },

    #[error("Recovery request failed: {0}")]
    Communication(#[from] CommunicationError),

    #[error("Invalid recovery state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, RecoveryError>;
