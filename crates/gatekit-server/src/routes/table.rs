//! Explicit route table
//!
//! Every route declares its method, path pattern, required scopes, rate
//! limit, and visibility in one place. The auth middleware consults this
//! table; the router in `lib.rs` mounts the same paths. A scope string that
//! is not in the closed vocabulary cannot appear here by construction.

use axum::http::Method;

use gatekit_core::Scope;

use crate::ratelimit::RouteLimit;

/// One route's contract
#[derive(Debug, Clone)]
pub struct RouteSpec {
    pub method: Method,
    pub path: &'static str,
    pub required_scopes: &'static [Scope],
    pub rate_limit: Option<RouteLimit>,
    pub public: bool,
}

impl RouteSpec {
    /// Limiter key for this route
    pub fn key(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

fn authed(
    method: Method,
    path: &'static str,
    required_scopes: &'static [Scope],
) -> RouteSpec {
    RouteSpec {
        method,
        path,
        required_scopes,
        rate_limit: None,
        public: false,
    }
}

fn limited(
    method: Method,
    path: &'static str,
    required_scopes: &'static [Scope],
    limit: u32,
    ttl_ms: u64,
) -> RouteSpec {
    RouteSpec {
        method,
        path,
        required_scopes,
        rate_limit: Some(RouteLimit { limit, ttl_ms }),
        public: false,
    }
}

fn public(method: Method, path: &'static str) -> RouteSpec {
    RouteSpec {
        method,
        path,
        required_scopes: &[],
        rate_limit: None,
        public: true,
    }
}

/// The complete API surface
pub fn route_table() -> Vec<RouteSpec> {
    vec![
        public(Method::GET, "/api/v1/health"),
        authed(Method::GET, "/api/v1/auth/whoami", &[]),
        // Projects
        authed(Method::GET, "/api/v1/projects", &[Scope::ProjectsRead]),
        authed(Method::POST, "/api/v1/projects", &[Scope::ProjectsWrite]),
        authed(Method::GET, "/api/v1/projects/:project", &[Scope::ProjectsRead]),
        authed(Method::PATCH, "/api/v1/projects/:project", &[Scope::ProjectsWrite]),
        authed(Method::DELETE, "/api/v1/projects/:project", &[Scope::ProjectsWrite]),
        authed(Method::GET, "/api/v1/projects/:project/members", &[Scope::MembersRead]),
        authed(Method::POST, "/api/v1/projects/:project/members", &[Scope::MembersWrite]),
        authed(
            Method::DELETE,
            "/api/v1/projects/:project/members/:userId",
            &[Scope::MembersWrite],
        ),
        // API keys
        limited(
            Method::POST,
            "/api/v1/projects/:project/keys",
            &[Scope::KeysManage],
            20,
            60_000,
        ),
        authed(Method::GET, "/api/v1/projects/:project/keys", &[Scope::KeysRead]),
        authed(
            Method::DELETE,
            "/api/v1/projects/:project/keys/:keyId",
            &[Scope::KeysManage],
        ),
        limited(
            Method::POST,
            "/api/v1/projects/:project/keys/:keyId/roll",
            &[Scope::KeysManage],
            20,
            60_000,
        ),
        // Platform configs
        authed(Method::POST, "/api/v1/projects/:project/platforms", &[Scope::PlatformsWrite]),
        authed(Method::GET, "/api/v1/projects/:project/platforms", &[Scope::PlatformsRead]),
        authed(
            Method::GET,
            "/api/v1/projects/:project/platforms/:platformId",
            &[Scope::PlatformsRead],
        ),
        authed(
            Method::PATCH,
            "/api/v1/projects/:project/platforms/:platformId",
            &[Scope::PlatformsWrite],
        ),
        authed(
            Method::DELETE,
            "/api/v1/projects/:project/platforms/:platformId",
            &[Scope::PlatformsWrite],
        ),
        // Messages
        limited(
            Method::POST,
            "/api/v1/projects/:project/messages/send",
            &[Scope::MessagesSend],
            60,
            60_000,
        ),
        authed(
            Method::GET,
            "/api/v1/projects/:project/messages/status/:jobId",
            &[Scope::MessagesRead],
        ),
        limited(
            Method::POST,
            "/api/v1/projects/:project/messages/retry/:jobId",
            &[Scope::MessagesSend],
            60,
            60_000,
        ),
        authed(Method::GET, "/api/v1/projects/:project/messages", &[Scope::MessagesRead]),
        authed(
            Method::GET,
            "/api/v1/projects/:project/messages/sent",
            &[Scope::MessagesRead],
        ),
        authed(
            Method::GET,
            "/api/v1/projects/:project/messages/stats",
            &[Scope::MessagesRead],
        ),
        authed(
            Method::DELETE,
            "/api/v1/projects/:project/messages",
            &[Scope::MessagesWrite],
        ),
        // Identities
        authed(Method::GET, "/api/v1/projects/:project/identities", &[Scope::IdentitiesRead]),
        authed(
            Method::POST,
            "/api/v1/projects/:project/identities",
            &[Scope::IdentitiesWrite],
        ),
        authed(
            Method::GET,
            "/api/v1/projects/:project/identities/:identityId",
            &[Scope::IdentitiesRead],
        ),
        authed(
            Method::PATCH,
            "/api/v1/projects/:project/identities/:identityId",
            &[Scope::IdentitiesWrite],
        ),
        authed(
            Method::DELETE,
            "/api/v1/projects/:project/identities/:identityId",
            &[Scope::IdentitiesWrite],
        ),
        authed(
            Method::POST,
            "/api/v1/projects/:project/identities/:identityId/aliases",
            &[Scope::IdentitiesWrite],
        ),
        authed(
            Method::DELETE,
            "/api/v1/projects/:project/identities/:identityId/aliases/:aliasId",
            &[Scope::IdentitiesWrite],
        ),
        // Webhook subscribers
        authed(Method::POST, "/api/v1/projects/:project/webhooks", &[Scope::WebhooksWrite]),
        authed(Method::GET, "/api/v1/projects/:project/webhooks", &[Scope::WebhooksRead]),
        authed(
            Method::GET,
            "/api/v1/projects/:project/webhooks/:webhookId",
            &[Scope::WebhooksRead],
        ),
        authed(
            Method::PATCH,
            "/api/v1/projects/:project/webhooks/:webhookId",
            &[Scope::WebhooksWrite],
        ),
        authed(
            Method::DELETE,
            "/api/v1/projects/:project/webhooks/:webhookId",
            &[Scope::WebhooksWrite],
        ),
        authed(
            Method::GET,
            "/api/v1/projects/:project/webhooks/:webhookId/deliveries",
            &[Scope::WebhooksRead],
        ),
        // Platform logs
        authed(Method::GET, "/api/v1/projects/:project/logs", &[Scope::PlatformsRead]),
        authed(Method::GET, "/api/v1/projects/:project/logs/stats", &[Scope::PlatformsRead]),
        // Inbound platform webhooks (public by token)
        public(Method::POST, "/api/v1/webhooks/:platform/:webhookToken"),
    ]
}

/// Table lookup by method and matched path pattern
pub fn route_spec(method: &Method, path: &str) -> Option<RouteSpec> {
    route_table()
        .into_iter()
        .find(|spec| spec.method == *method && spec.path == path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_route_keys_are_unique() {
        let table = route_table();
        let keys: HashSet<String> = table.iter().map(|s| s.key()).collect();
        assert_eq!(keys.len(), table.len());
    }

    #[test]
    fn test_private_routes_declare_scopes_or_whoami() {
        for spec in route_table() {
            if spec.public {
                continue;
            }
            // whoami is the only authenticated route with no scope demand
            if spec.path == "/api/v1/auth/whoami" {
                assert!(spec.required_scopes.is_empty());
                continue;
            }
            assert!(
                !spec.required_scopes.is_empty(),
                "route {} declares no scopes",
                spec.key()
            );
        }
    }

    #[test]
    fn test_send_requires_send_not_write() {
        let spec = route_spec(&Method::POST, "/api/v1/projects/:project/messages/send").unwrap();
        assert_eq!(spec.required_scopes, &[Scope::MessagesSend]);
    }

    #[test]
    fn test_ingress_is_public_with_token_segment() {
        let spec = route_spec(&Method::POST, "/api/v1/webhooks/:platform/:webhookToken").unwrap();
        assert!(spec.public);
        assert!(spec.path.contains(":webhookToken"));
    }

    #[test]
    fn test_unknown_route_is_none() {
        assert!(route_spec(&Method::GET, "/api/v2/anything").is_none());
    }
}
