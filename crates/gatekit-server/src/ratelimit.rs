//! Per-route keyed rate limiting
//!
//! Each route with a declared limit gets its own keyed limiter; callers are
//! keyed by principal (API-key id / JWT subject) or, pre-auth, by client IP.
//! The storage is the in-memory governor state store; the `RouteLimiters`
//! surface is small enough that a Redis-backed variant can slot in behind
//! it.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

use gatekit_core::{GatewayError, GatewayResult};

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Declared per-route limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteLimit {
    pub limit: u32,
    pub ttl_ms: u64,
}

/// One keyed limiter per rate-limited route
pub struct RouteLimiters {
    limiters: HashMap<String, KeyedLimiter>,
    clock: DefaultClock,
}

impl RouteLimiters {
    /// Build limiters for the given `(route key, limit)` pairs
    pub fn new(routes: impl IntoIterator<Item = (String, RouteLimit)>) -> Self {
        let mut limiters = HashMap::new();
        for (key, limit) in routes {
            if let Some(quota) = quota_for(limit) {
                limiters.insert(key, RateLimiter::keyed(quota));
            }
        }
        Self {
            limiters,
            clock: DefaultClock::default(),
        }
    }

    /// Check one call against a route's limiter. Routes without a declared
    /// limit always pass.
    pub fn check(&self, route_key: &str, caller_key: &str) -> GatewayResult<()> {
        let Some(limiter) = self.limiters.get(route_key) else {
            return Ok(());
        };
        match limiter.check_key(&caller_key.to_string()) {
            Ok(()) => Ok(()),
            Err(denied) => {
                let wait = denied.wait_time_from(self.clock.now());
                Err(GatewayError::RateLimited {
                    retry_after_ms: wait.as_millis() as u64,
                })
            }
        }
    }
}

/// Sustained rate of `limit` per `ttl`, with bursts up to the full limit
fn quota_for(limit: RouteLimit) -> Option<Quota> {
    let count = NonZeroU32::new(limit.limit)?;
    let period = Duration::from_millis(limit.ttl_ms.max(1) / u64::from(limit.limit).max(1)).max(Duration::from_millis(1));
    Some(Quota::with_period(period)?.allow_burst(count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_routes_pass() {
        let limiters = RouteLimiters::new([]);
        for _ in 0..1000 {
            assert!(limiters.check("GET /anything", "caller").is_ok());
        }
    }

    #[test]
    fn test_burst_is_bounded() {
        let limiters = RouteLimiters::new([(
            "POST /send".to_string(),
            RouteLimit { limit: 5, ttl_ms: 60_000 },
        )]);

        for _ in 0..5 {
            assert!(limiters.check("POST /send", "key-1").is_ok());
        }
        let err = limiters.check("POST /send", "key-1").unwrap_err();
        assert!(matches!(err, GatewayError::RateLimited { .. }));
    }

    #[test]
    fn test_callers_are_isolated() {
        let limiters = RouteLimiters::new([(
            "POST /send".to_string(),
            RouteLimit { limit: 2, ttl_ms: 60_000 },
        )]);

        assert!(limiters.check("POST /send", "a").is_ok());
        assert!(limiters.check("POST /send", "a").is_ok());
        assert!(limiters.check("POST /send", "a").is_err());
        // A different caller has its own budget
        assert!(limiters.check("POST /send", "b").is_ok());
    }
}
