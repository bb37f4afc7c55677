//! Linking and invocation errors.
//!
//! Linking failures ([`LinkError`]) are distinct from failures of a linked
//! target ([`RuntimeError`]); [`InvokeError`] carries either out of a call
//! site.

use crate::config::ConfigError;
use dynlink_runtime::RuntimeError;
use thiserror::Error;

/// Result alias for linking operations.
pub type LinkResult<T> = std::result::Result<T, LinkError>;

/// Result alias for call-site invocation.
pub type InvokeResult<T> = std::result::Result<T, InvokeError>;

/// A failure to produce or install a dispatch target.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    /// No linker produced a guarded invocation.
    #[error("no applicable dynamic method for {operation} on {receiver}")]
    NoApplicableMethod {
        operation: String,
        receiver: String,
        #[source]
        cause: Option<Box<LinkError>>,
    },

    #[error("no viable conversion from {from} to {to}")]
    NoViableConversion { from: String, to: String },

    /// Only inaccessible members matched.
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("call site invoked before initialization")]
    Uninitialized,

    #[error("call site already initialized")]
    AlreadyInitialized,

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("linker {linker} failed: {message}")]
    LinkerFailure { linker: String, message: String },

    /// The linker configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl LinkError {
    /// Build an unresolved-operation error without a cause.
    pub fn no_applicable(operation: impl ToString, receiver: impl Into<String>) -> Self {
        LinkError::NoApplicableMethod {
            operation: operation.to_string(),
            receiver: receiver.into(),
            cause: None,
        }
    }

    /// Check if this error reports an unresolved operation.
    #[inline]
    pub fn is_no_applicable_method(&self) -> bool {
        matches!(self, LinkError::NoApplicableMethod { .. })
    }

    /// Cause attached to an unresolved-operation error.
    pub fn cause(&self) -> Option<&LinkError> {
        match self {
            LinkError::NoApplicableMethod { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }
}

/// A failure raised while invoking a call site.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvokeError {
    /// The linked target failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// The call could not be linked.
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("{label} expects {expected} arguments, got {found}")]
    Arity {
        label: String,
        expected: usize,
        found: usize,
    },
}

impl InvokeError {
    /// The runtime error, if the target failed.
    pub fn as_runtime(&self) -> Option<&RuntimeError> {
        match self {
            InvokeError::Runtime(e) => Some(e),
            _ => None,
        }
    }

    /// The link error, if linking failed.
    pub fn as_link(&self) -> Option<&LinkError> {
        match self {
            InvokeError::Link(e) => Some(e),
            _ => None,
        }
    }
}
