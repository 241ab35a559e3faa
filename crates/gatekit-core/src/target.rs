//! Outbound target model
//!
//! Targets name one addressable destination inside a project:
//! `"{platformConfigId}:{type}:{id}"` in the compact form, or the structured
//! `{platformId, type, id}` object. The id segment is opaque to GateKit;
//! only the platform adapter interprets it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Addressable destination type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    User,
    Channel,
    Group,
}

impl FromStr for TargetKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "channel" => Ok(Self::Channel),
            "group" => Ok(Self::Group),
            other => Err(GatewayError::validation(
                "target",
                format!("unknown target type `{other}`"),
            )),
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::Channel => "channel",
            Self::Group => "group",
        };
        f.write_str(s)
    }
}

/// One parsed outbound target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTarget {
    /// PlatformConfig id the target belongs to
    pub platform_id: String,
    pub kind: TargetKind,
    /// Platform-specific chat/user/channel id, left opaque
    pub id: String,
}

impl MessageTarget {
    /// Parse the compact `"{platformConfigId}:{type}:{id}"` form.
    ///
    /// Exactly three `:`-separated parts; the type must be a known
    /// [`TargetKind`]; platform id and id must be non-empty.
    pub fn parse(raw: &str) -> GatewayResult<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() != 3 {
            return Err(GatewayError::validation(
                "target",
                format!("expected `platformId:type:id`, got `{raw}`"),
            ));
        }
        let (platform_id, kind, id) = (parts[0], parts[1], parts[2]);
        if platform_id.is_empty() {
            return Err(GatewayError::validation("target", "platform id must not be empty"));
        }
        if id.is_empty() {
            return Err(GatewayError::validation("target", "target id must not be empty"));
        }
        Ok(Self {
            platform_id: platform_id.to_string(),
            kind: kind.parse()?,
            id: id.to_string(),
        })
    }
}

impl fmt::Display for MessageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.platform_id, self.kind, self.id)
    }
}

/// Target as accepted on the wire: compact string or structured object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetInput {
    Compact(String),
    Structured {
        #[serde(rename = "platformId")]
        platform_id: String,
        #[serde(rename = "type")]
        kind: TargetKind,
        id: String,
    },
}

impl TargetInput {
    /// Resolve either wire form into a [`MessageTarget`]
    pub fn resolve(&self) -> GatewayResult<MessageTarget> {
        match self {
            Self::Compact(raw) => MessageTarget::parse(raw),
            Self::Structured { platform_id, kind, id } => {
                if platform_id.is_empty() {
                    return Err(GatewayError::validation(
                        "target",
                        "platform id must not be empty",
                    ));
                }
                if id.is_empty() {
                    return Err(GatewayError::validation("target", "target id must not be empty"));
                }
                Ok(MessageTarget {
                    platform_id: platform_id.clone(),
                    kind: *kind,
                    id: id.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_valid_target() {
        let target = MessageTarget::parse("a:user:b").unwrap();
        assert_eq!(target.platform_id, "a");
        assert_eq!(target.kind, TargetKind::User);
        assert_eq!(target.id, "b");
    }

    #[test]
    fn test_parse_rejects_two_parts() {
        assert!(MessageTarget::parse("a:b").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_id() {
        assert!(MessageTarget::parse("a:user:").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        assert!(MessageTarget::parse("a:foo:bar").is_err());
    }

    #[test]
    fn test_parse_rejects_four_parts() {
        // The id segment is opaque but may not itself contain `:`
        assert!(MessageTarget::parse("a:user:b:c").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let target = MessageTarget::parse("cfg-9:group:-100123").unwrap();
        assert_eq!(target.to_string(), "cfg-9:group:-100123");
    }

    #[test]
    fn test_structured_input_resolves() {
        let input: TargetInput = serde_json::from_value(serde_json::json!({
            "platformId": "cfg-1",
            "type": "channel",
            "id": "general"
        }))
        .unwrap();
        let target = input.resolve().unwrap();
        assert_eq!(target.kind, TargetKind::Channel);
        assert_eq!(target.id, "general");
    }

    #[test]
    fn test_compact_input_resolves() {
        let input: TargetInput = serde_json::from_value(serde_json::json!("cfg-1:user:42")).unwrap();
        assert_eq!(input.resolve().unwrap().platform_id, "cfg-1");
    }
}
