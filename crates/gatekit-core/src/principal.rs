//! Resolved caller identity
//!
//! Both auth modes (API key, JWT) produce the same Principal shape so that
//! scope enforcement and the project-access guard never care which door the
//! caller came through.

use serde::Serialize;

use crate::scopes::ScopeSet;

/// Resolved identity of the caller
#[derive(Debug, Clone)]
pub enum Principal {
    /// Authenticated via `X-API-Key`; bound to exactly one project
    ApiKey {
        project_id: String,
        key_id: String,
        key_name: String,
        scopes: ScopeSet,
    },
    /// Authenticated via `Authorization: Bearer`; project access resolved
    /// through ownership/membership
    Jwt {
        user_id: String,
        email: Option<String>,
        scopes: ScopeSet,
    },
}

impl Principal {
    pub fn scopes(&self) -> &ScopeSet {
        match self {
            Self::ApiKey { scopes, .. } | Self::Jwt { scopes, .. } => scopes,
        }
    }

    /// Auth mode label used by `/auth/whoami`
    pub fn auth_type(&self) -> &'static str {
        match self {
            Self::ApiKey { .. } => "api-key",
            Self::Jwt { .. } => "jwt",
        }
    }

    /// Project the principal is intrinsically bound to (API keys only)
    pub fn bound_project_id(&self) -> Option<&str> {
        match self {
            Self::ApiKey { project_id, .. } => Some(project_id),
            Self::Jwt { .. } => None,
        }
    }
}

/// Whoami response shape
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmI {
    pub auth_type: String,
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<WhoAmIProject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<WhoAmIUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<WhoAmIKey>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WhoAmIProject {
    pub id: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WhoAmIUser {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmIKey {
    pub id: String,
    pub name: String,
    pub masked_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scopes::ScopeSet;

    #[test]
    fn test_auth_type_labels() {
        let key = Principal::ApiKey {
            project_id: "p".into(),
            key_id: "k".into(),
            key_name: "bot".into(),
            scopes: ScopeSet::new(),
        };
        let jwt = Principal::Jwt {
            user_id: "u".into(),
            email: None,
            scopes: ScopeSet::new(),
        };
        assert_eq!(key.auth_type(), "api-key");
        assert_eq!(jwt.auth_type(), "jwt");
        assert_eq!(key.bound_project_id(), Some("p"));
        assert_eq!(jwt.bound_project_id(), None);
    }
}
