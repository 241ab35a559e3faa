//! Gateway configuration
//!
//! All configuration comes from environment variables. The JWT block is
//! optional: when absent, the bearer-token path is disabled and only API
//! keys authenticate.

use crate::error::{GatewayError, GatewayResult};

/// Per-route rate limit defaults
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub limit: u32,
    /// Window length in milliseconds
    pub ttl_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            ttl_ms: 60_000,
        }
    }
}

/// Optional JWT validation settings
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub audience: Option<String>,
}

/// Process-wide gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address, e.g. "127.0.0.1:8080"
    pub bind: String,
    /// Public base URL used when registering platform webhooks
    pub base_url: String,
    /// Credentials-encryption master key (base64 or hex, 32 bytes decoded)
    pub master_key: String,
    /// Outbound job worker count
    pub outbound_workers: usize,
    /// Webhook delivery worker count
    pub delivery_workers: usize,
    pub rate_limit: RateLimitConfig,
    pub jwt: Option<JwtConfig>,
}

impl GatewayConfig {
    /// Load from environment variables. `GATEKIT_MASTER_KEY` and
    /// `GATEKIT_BASE_URL` are required; everything else has defaults.
    pub fn from_env() -> GatewayResult<Self> {
        let master_key = std::env::var("GATEKIT_MASTER_KEY")
            .map_err(|_| GatewayError::Config("GATEKIT_MASTER_KEY is not set".into()))?;
        let base_url = std::env::var("GATEKIT_BASE_URL")
            .map_err(|_| GatewayError::Config("GATEKIT_BASE_URL is not set".into()))?;

        let bind = std::env::var("GATEKIT_BIND").unwrap_or_else(|_| "127.0.0.1:8080".into());
        let outbound_workers = read_usize("GATEKIT_OUTBOUND_WORKERS", 4)?;
        let delivery_workers = read_usize("GATEKIT_DELIVERY_WORKERS", 4)?;

        let rate_limit = RateLimitConfig {
            limit: read_usize("GATEKIT_RATE_LIMIT", 100)? as u32,
            ttl_ms: read_usize("GATEKIT_RATE_TTL_MS", 60_000)? as u64,
        };

        let jwt = match std::env::var("GATEKIT_JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => Some(JwtConfig {
                secret,
                audience: std::env::var("GATEKIT_JWT_AUDIENCE").ok(),
            }),
            _ => None,
        };

        Ok(Self {
            bind,
            base_url: base_url.trim_end_matches('/').to_string(),
            master_key,
            outbound_workers,
            delivery_workers,
            rate_limit,
            jwt,
        })
    }

    /// Inbound webhook URL for a platform + token pair
    pub fn webhook_url(&self, platform: &str, webhook_token: &str) -> String {
        format!("{}/api/v1/webhooks/{platform}/{webhook_token}", self.base_url)
    }
}

fn read_usize(var: &str, default: usize) -> GatewayResult<usize> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| GatewayError::Config(format!("{var} must be a number, got `{raw}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            bind: "127.0.0.1:8080".into(),
            base_url: "https://gate.example.com".into(),
            master_key: "0".repeat(64),
            outbound_workers: 4,
            delivery_workers: 4,
            rate_limit: RateLimitConfig::default(),
            jwt: None,
        }
    }

    #[test]
    fn test_webhook_url_shape() {
        let config = test_config();
        assert_eq!(
            config.webhook_url("telegram", "3f6f0b2e-1111-4222-8333-444455556666"),
            "https://gate.example.com/api/v1/webhooks/telegram/3f6f0b2e-1111-4222-8333-444455556666"
        );
    }
}
