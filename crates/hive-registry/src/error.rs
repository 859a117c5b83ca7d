//! Registry error types.

use std::fmt;

use thiserror::Error;

use hive_core::CryptoError;
use hive_state::StateError;

/// A specification field that is out of bounds or malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Wire name of the offending field (`cpu`, `rambasic`, `repotag`, ...).
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl std::error::Error for ValidationError {}

/// Errors that can occur while handling specification messages.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid specification: {0}")]
    Validation(#[from] ValidationError),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("signature error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("image lookup failed: {0}")]
    ImageLookup(String),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RegistryError {
    /// Whether the message itself is at fault (as opposed to local failures).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RegistryError::Validation(_) | RegistryError::Conflict(_) | RegistryError::Crypto(_)
        )
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
