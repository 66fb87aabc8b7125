//! Error types for name and ID parsing.

use thiserror::Error;

/// Errors that can occur when parsing or validating names and IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The input string is empty.
    #[error("name cannot be empty")]
    Empty,

    /// The name contains a character that cannot appear in it.
    #[error("invalid character {found:?} in {kind} '{value}'")]
    InvalidCharacter {
        kind: &'static str,
        value: String,
        found: char,
    },

    /// The task ID is missing its `_num_` sequence suffix.
    #[error("task ID missing sequence suffix: '{0}'")]
    MissingSequence(String),

    /// The task ID sequence is not a positive integer.
    #[error("invalid task sequence: {0}")]
    InvalidSequence(String),

    /// The queue item ID is not an unsigned integer.
    #[error("invalid item ID: {0}")]
    InvalidItem(String),
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }

    /// Returns true if this error is about a task ID's sequence suffix.
    pub fn is_sequence_error(&self) -> bool {
        matches!(
            self,
            IdError::MissingSequence(_) | IdError::InvalidSequence(_)
        )
    }
}
