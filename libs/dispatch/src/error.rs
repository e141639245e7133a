//! Dispatch error types

use feed_types::MessageKind;
use thiserror::Error;

/// The message mapper could not build a domain event
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Failed to map {kind:?} message: {reason}")]
pub struct MappingError {
    pub kind: MessageKind,
    pub reason: String,
}

impl MappingError {
    pub fn new(kind: MessageKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Invalid dispatcher state: {0}")]
    InvalidState(String),

    #[error("{kind:?} is not a dispatchable feed message")]
    UnsupportedMessage { kind: MessageKind },

    #[error("A dispatcher for '{resource_type}' is already registered")]
    DuplicateDispatcher { resource_type: &'static str },

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
