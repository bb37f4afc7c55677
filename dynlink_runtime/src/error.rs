//! Call-time runtime errors.
//!
//! These describe a receiver that does not have the shape an invocation
//! needs (an index out of range, a missing member, a wrong argument count).
//! They are failures of the *target*, never of linking.

use thiserror::Error;

/// Result alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Receiver-shape violation raised while an invocation runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("index {index} out of range for sequence of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("{receiver} has no member `{name}`")]
    MissingMember { receiver: String, name: String },

    #[error("value of type {0} is not callable")]
    NotCallable(String),

    #[error("{name} expects {expected} arguments, got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid key {key} for {receiver}")]
    InvalidKey { receiver: String, key: String },

    #[error("{0}")]
    Host(String),
}

impl RuntimeError {
    /// Build a type mismatch from type names.
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        RuntimeError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Check if this error reports an out-of-range index.
    #[inline]
    pub fn is_index_out_of_range(&self) -> bool {
        matches!(self, RuntimeError::IndexOutOfRange { .. })
    }
}
