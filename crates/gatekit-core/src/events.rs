//! Lifecycle event catalog
//!
//! Two event families live here: the gateway events fanned out to webhook
//! subscribers (`message.received`, `message.sent`, ...) and the
//! platform-config lifecycle transitions dispatched to adapters so they can
//! pre-register webhooks, tear down connections, and so on.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::model::PlatformConfig;

/// Subscriber-facing event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EventKind {
    MessageReceived,
    MessageSent,
    MessageFailed,
    ButtonClicked,
    ReactionAdded,
    ReactionRemoved,
}

/// The full subscriber event catalog
pub const EVENT_CATALOG: [EventKind; 6] = [
    EventKind::MessageReceived,
    EventKind::MessageSent,
    EventKind::MessageFailed,
    EventKind::ButtonClicked,
    EventKind::ReactionAdded,
    EventKind::ReactionRemoved,
];

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageReceived => "message.received",
            Self::MessageSent => "message.sent",
            Self::MessageFailed => "message.failed",
            Self::ButtonClicked => "button.clicked",
            Self::ReactionAdded => "reaction.added",
            Self::ReactionRemoved => "reaction.removed",
        }
    }
}

impl FromStr for EventKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message.received" => Ok(Self::MessageReceived),
            "message.sent" => Ok(Self::MessageSent),
            "message.failed" => Ok(Self::MessageFailed),
            "button.clicked" => Ok(Self::ButtonClicked),
            "reaction.added" => Ok(Self::ReactionAdded),
            "reaction.removed" => Ok(Self::ReactionRemoved),
            other => Err(GatewayError::validation(
                "events",
                format!("unknown event `{other}`"),
            )),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for EventKind {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

/// One emitted gateway event, as delivered to webhook subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event: EventKind,
    pub timestamp: DateTime<Utc>,
    pub project_id: String,
    /// Event-shaped payload (message row, delivery result, ...)
    pub data: serde_json::Value,
}

impl EventRecord {
    pub fn new(event: EventKind, project_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
            project_id: project_id.into(),
            data,
        }
    }
}

/// PlatformConfig lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformLifecycleKind {
    Created,
    Activated,
    Updated,
    Deactivated,
    Deleted,
}

/// Lifecycle event dispatched to adapters through the registry.
/// Credentials arrive decrypted; they exist only in process memory.
#[derive(Debug, Clone)]
pub struct PlatformLifecycleEvent {
    pub kind: PlatformLifecycleKind,
    pub config: PlatformConfig,
    pub credentials: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_round_trips() {
        for kind in EVENT_CATALOG {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_event_rejected() {
        assert!("message.deleted".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_event_record_serializes_with_dotted_name() {
        let record = EventRecord::new(
            EventKind::MessageReceived,
            "proj-1",
            serde_json::json!({"text": "hi"}),
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["event"], "message.received");
        assert_eq!(value["project_id"], "proj-1");
    }
}
