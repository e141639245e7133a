//! Error types for identifier parsing and validation

use thiserror::Error;

/// Errors that can occur while parsing feed identifiers
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// Input did not have the `prefix:type:id` shape
    #[error("Invalid URN format: '{input}' - expected prefix:type:id")]
    InvalidFormat { input: String },

    /// Numeric part of the URN could not be parsed
    #[error("Invalid URN id in '{input}'")]
    InvalidId { input: String },

    /// Prefix or type component was empty
    #[error("URN component '{component}' cannot be empty in '{input}'")]
    EmptyComponent {
        component: &'static str,
        input: String,
    },
}

/// A set of message interests that cannot be opened side by side
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterestError {
    #[error("At least one message interest is required")]
    Empty,

    #[error("Duplicate message interest '{0}'")]
    Duplicate(String),

    #[error("'all' message interest cannot be combined with other interests")]
    AllCombined,
}
