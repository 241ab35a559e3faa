//! Authorization scope vocabulary
//!
//! The scope set is closed: any scope string outside this vocabulary in a
//! required-scope list is a programming error, and unknown strings on a
//! stored key are rejected at parse time. Scopes are independent tokens;
//! `messages:send` does not imply `messages:write`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// One authorization scope token
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
    IdentitiesRead,
    IdentitiesWrite,
    ProjectsRead,
    ProjectsWrite,
    PlatformsRead,
    PlatformsWrite,
    MessagesRead,
    MessagesWrite,
    MessagesSend,
    WebhooksRead,
    WebhooksWrite,
    KeysRead,
    KeysManage,
    MembersRead,
    MembersWrite,
}

impl Scope {
    /// The full vocabulary, in canonical order
    pub const ALL: [Scope; 15] = [
        Scope::IdentitiesRead,
        Scope::IdentitiesWrite,
        Scope::ProjectsRead,
        Scope::ProjectsWrite,
        Scope::PlatformsRead,
        Scope::PlatformsWrite,
        Scope::MessagesRead,
        Scope::MessagesWrite,
        Scope::MessagesSend,
        Scope::WebhooksRead,
        Scope::WebhooksWrite,
        Scope::KeysRead,
        Scope::KeysManage,
        Scope::MembersRead,
        Scope::MembersWrite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdentitiesRead => "identities:read",
            Self::IdentitiesWrite => "identities:write",
            Self::ProjectsRead => "projects:read",
            Self::ProjectsWrite => "projects:write",
            Self::PlatformsRead => "platforms:read",
            Self::PlatformsWrite => "platforms:write",
            Self::MessagesRead => "messages:read",
            Self::MessagesWrite => "messages:write",
            Self::MessagesSend => "messages:send",
            Self::WebhooksRead => "webhooks:read",
            Self::WebhooksWrite => "webhooks:write",
            Self::KeysRead => "keys:read",
            Self::KeysManage => "keys:manage",
            Self::MembersRead => "members:read",
            Self::MembersWrite => "members:write",
        }
    }
}

impl FromStr for Scope {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identities:read" => Ok(Self::IdentitiesRead),
            "identities:write" => Ok(Self::IdentitiesWrite),
            "projects:read" => Ok(Self::ProjectsRead),
            "projects:write" => Ok(Self::ProjectsWrite),
            "platforms:read" => Ok(Self::PlatformsRead),
            "platforms:write" => Ok(Self::PlatformsWrite),
            "messages:read" => Ok(Self::MessagesRead),
            "messages:write" => Ok(Self::MessagesWrite),
            "messages:send" => Ok(Self::MessagesSend),
            "webhooks:read" => Ok(Self::WebhooksRead),
            "webhooks:write" => Ok(Self::WebhooksWrite),
            "keys:read" => Ok(Self::KeysRead),
            "keys:manage" => Ok(Self::KeysManage),
            "members:read" => Ok(Self::MembersRead),
            "members:write" => Ok(Self::MembersWrite),
            other => Err(GatewayError::validation(
                "scopes",
                format!("unknown scope `{other}`"),
            )),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Scope {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.as_str().to_string()
    }
}

/// A set of scopes held by a principal or required by a route
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet(BTreeSet<Scope>);

impl ScopeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of scope strings, rejecting any token outside the
    /// vocabulary.
    pub fn parse_all<'a, I>(raw: I) -> Result<Self, GatewayError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut set = BTreeSet::new();
        for token in raw {
            set.insert(token.parse::<Scope>()?);
        }
        Ok(Self(set))
    }

    pub fn insert(&mut self, scope: Scope) {
        self.0.insert(scope);
    }

    pub fn contains(&self, scope: Scope) -> bool {
        self.0.contains(&scope)
    }

    /// Authorization rule: granted iff every required scope is held
    pub fn contains_all(&self, required: &[Scope]) -> bool {
        required.iter().all(|scope| self.0.contains(scope))
    }

    /// Required scopes missing from this set, for error reporting
    pub fn missing_from(&self, required: &[Scope]) -> Vec<Scope> {
        required
            .iter()
            .copied()
            .filter(|scope| !self.0.contains(scope))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Scope> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical string list, for API responses
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(|s| s.as_str().to_string()).collect()
    }
}

impl FromIterator<Scope> for ScopeSet {
    fn from_iter<T: IntoIterator<Item = Scope>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_scope_round_trips() {
        for scope in Scope::ALL {
            let parsed: Scope = scope.as_str().parse().unwrap();
            assert_eq!(parsed, scope);
        }
    }

    #[test]
    fn test_unknown_scope_rejected() {
        assert!("messages:admin".parse::<Scope>().is_err());
        assert!("".parse::<Scope>().is_err());
    }

    #[test]
    fn test_subset_rule() {
        let held = ScopeSet::parse_all(["messages:send", "messages:read"]).unwrap();
        assert!(held.contains_all(&[Scope::MessagesSend]));
        assert!(held.contains_all(&[Scope::MessagesSend, Scope::MessagesRead]));
        assert!(!held.contains_all(&[Scope::MessagesWrite]));
    }

    #[test]
    fn test_send_does_not_imply_write() {
        let held = ScopeSet::parse_all(["messages:send"]).unwrap();
        assert!(!held.contains_all(&[Scope::MessagesWrite]));
        assert_eq!(held.missing_from(&[Scope::MessagesWrite]), vec![Scope::MessagesWrite]);
    }

    #[test]
    fn test_empty_required_always_granted() {
        let held = ScopeSet::new();
        assert!(held.contains_all(&[]));
    }
}
