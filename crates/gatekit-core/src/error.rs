//! Gateway-wide error taxonomy
//!
//! Every user-visible failure carries a machine-stable code alongside the
//! human message; the HTTP layer maps kinds to status codes, the CLI maps
//! them to exit codes. Delivery-time failures (permanent vs. transient) are
//! a separate taxonomy owned by the platform SPI.

use thiserror::Error;

/// Result alias used throughout GateKit
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error kinds
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Bad input shape or bounds; carries the offending field
    #[error("validation failed for `{field}`: {message}")]
    Validation { field: String, message: String },

    /// Missing or bad credential
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Principal lacks one or more required scopes
    #[error("insufficient scope: missing {0}")]
    InsufficientScope(String),

    /// Entity missing, or access denied (indistinguishable on purpose)
    #[error("{0} not found")]
    NotFound(String),

    /// Duplicate slug, unique-constraint clash, already-exists cases
    #[error("conflict: {0}")]
    Conflict(String),

    /// Throttle triggered
    #[error("rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Encryption, hashing, or signing failure
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Adapter or registry failure outside the send taxonomy
    #[error("platform error: {0}")]
    Platform(String),

    /// Job queue failure
    #[error("queue error: {0}")]
    Queue(String),

    /// Bad or missing configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Convenience constructor for validation failures
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Machine-stable error code exposed in API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Authentication(_) => "AUTHENTICATION_FAILED",
            Self::InsufficientScope(_) => "INSUFFICIENT_SCOPE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Crypto(_) | Self::Platform(_) | Self::Queue(_) | Self::Config(_)
            | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            GatewayError::validation("targets", "must not be empty").code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            GatewayError::Authentication("bad key".into()).code(),
            "AUTHENTICATION_FAILED"
        );
        assert_eq!(
            GatewayError::InsufficientScope("messages:send".into()).code(),
            "INSUFFICIENT_SCOPE"
        );
        assert_eq!(GatewayError::NotFound("project".into()).code(), "NOT_FOUND");
        assert_eq!(GatewayError::Conflict("slug taken".into()).code(), "CONFLICT");
        assert_eq!(
            GatewayError::RateLimited { retry_after_ms: 500 }.code(),
            "RATE_LIMITED"
        );
        assert_eq!(GatewayError::Internal("boom".into()).code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_validation_message_carries_field() {
        let err = GatewayError::validation("limit", "must be positive");
        assert!(err.to_string().contains("limit"));
        assert!(err.to_string().contains("must be positive"));
    }
}
