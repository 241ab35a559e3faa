//! Platform-specific errors and the send-failure taxonomy

use thiserror::Error;

use gatekit_core::GatewayError;

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Adapter and registry errors outside the send path
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("invalid platform credentials: {0}")]
    Credentials(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("connection limit reached: {0}")]
    ConnectionLimit(String),

    #[error("no live connection for {0}")]
    NotConnected(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl From<PlatformError> for GatewayError {
    fn from(err: PlatformError) -> Self {
        GatewayError::Platform(err.to_string())
    }
}

/// Successful send result
#[derive(Debug, Clone)]
pub struct SendReceipt {
    /// Platform-assigned message id, when the platform reports one
    pub provider_message_id: Option<String>,
}

/// Delivery failure taxonomy. Adapters classify their own errors; the
/// substring marker list in the outbound worker exists only to classify
/// `Unclassified` messages for parity with prior behavior.
#[derive(Debug, Error)]
pub enum SendError {
    /// Do not retry: bad target, revoked credentials, disabled config
    #[error("{0}")]
    Permanent(String),

    /// Retry may succeed: rate limits, transient network or server errors
    #[error("{0}")]
    Transient(String),

    /// Origin could not classify; the worker applies the marker list
    #[error("{0}")]
    Unclassified(String),
}

impl SendError {
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Permanent(m) | Self::Transient(m) | Self::Unclassified(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_error_carries_message() {
        assert_eq!(SendError::permanent("chat not found").message(), "chat not found");
        assert_eq!(SendError::transient("rate limited").to_string(), "rate limited");
    }

    #[test]
    fn test_platform_error_maps_to_gateway() {
        let err: GatewayError = PlatformError::UnknownPlatform("matrix".into()).into();
        assert!(err.to_string().contains("matrix"));
    }
}
