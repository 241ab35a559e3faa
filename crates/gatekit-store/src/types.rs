//! Query filters and aggregate shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatekit_core::{LogCategory, LogLevel, PlatformLog, WebhookDeliveryStatus};

/// Filter for received-message queries
#[derive(Debug, Clone, Default)]
pub struct ReceivedMessageFilter {
    pub platform_config_id: Option<String>,
    pub provider_chat_id: Option<String>,
    pub provider_user_id: Option<String>,
}

/// Filter for webhook delivery queries
#[derive(Debug, Clone, Default)]
pub struct DeliveryFilter {
    pub event: Option<String>,
    pub status: Option<WebhookDeliveryStatus>,
}

/// Filter for platform-log queries
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub platform: Option<String>,
    pub platform_config_id: Option<String>,
    pub level: Option<LogLevel>,
    pub category: Option<LogCategory>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// One user currently showing a reaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionUser {
    pub provider_user_id: String,
    pub user_display: Option<String>,
}

/// Visible reaction state for one emoji on one message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub users: Vec<ReactionUser>,
}

/// Message volume aggregate for a project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageStats {
    pub received_count: u64,
    pub sent_count: u64,
    pub pending_count: u64,
    pub failed_count: u64,
    pub reaction_count: u64,
}

/// Count of log entries per (level, category)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogVolume {
    pub level: LogLevel,
    pub category: LogCategory,
    pub count: u64,
}

/// Aggregate view of the platform log stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStats {
    pub volumes: Vec<LogVolume>,
    pub recent_errors: Vec<PlatformLog>,
}
