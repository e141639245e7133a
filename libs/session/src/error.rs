//! Session error types

use feed_dispatch::DispatchError;
use feed_recovery::RecoveryError;
use feed_types::InterestError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Message receiver failed: {0}")]
    Receiver(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Interest(#[from] InterestError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
