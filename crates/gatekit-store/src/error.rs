//! Store-level errors
//!
//! Duplicate-key is a first-class kind here because the inbound pipeline
//! needs to tell "this webhook was redelivered" apart from real failures.

use thiserror::Error;

use gatekit_core::GatewayError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated; names the constraint
    #[error("duplicate key on {constraint}")]
    Duplicate { constraint: &'static str },

    /// Entity does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Illegal status transition (e.g. sent -> pending)
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Backend failure
    #[error("store error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound(entity.into())
    }

    /// True when this is a duplicate-key violation
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { constraint } => {
                GatewayError::Conflict(format!("duplicate key on {constraint}"))
            }
            StoreError::NotFound(entity) => GatewayError::NotFound(entity),
            StoreError::InvalidTransition(msg) => GatewayError::Internal(msg),
            StoreError::Internal(msg) => GatewayError::Internal(msg),
        }
    }
}
