//! Platform log helper
//!
//! Adapters and pipelines log through [`PlatformLogger`] so the category on
//! every entry is authoritative rather than free-form. Entries go to the
//! configured sink (the store, in practice) and are mirrored onto `tracing`
//! for operator visibility.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::model::{LogCategory, LogLevel, PlatformLog};

/// Destination for platform log entries. Append-only; failures are the
/// sink's problem and must not propagate into the hot path.
#[async_trait]
pub trait PlatformLogSink: Send + Sync {
    async fn append(&self, entry: PlatformLog);
}

/// Category-aware logger bound to one (project, platform-config) pair
#[derive(Clone)]
pub struct PlatformLogger {
    sink: Arc<dyn PlatformLogSink>,
    project_id: String,
    platform_config_id: Option<String>,
    platform: String,
}

impl PlatformLogger {
    pub fn new(
        sink: Arc<dyn PlatformLogSink>,
        project_id: impl Into<String>,
        platform_config_id: Option<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            project_id: project_id.into(),
            platform_config_id,
            platform: platform.into(),
        }
    }

    async fn append(
        &self,
        level: LogLevel,
        category: LogCategory,
        message: String,
        metadata: Option<serde_json::Value>,
        err: Option<String>,
    ) {
        match level {
            LogLevel::Debug => debug!(platform = %self.platform, category = %category, "{message}"),
            LogLevel::Info => info!(platform = %self.platform, category = %category, "{message}"),
            LogLevel::Warn => warn!(platform = %self.platform, category = %category, "{message}"),
            LogLevel::Error => error!(platform = %self.platform, category = %category, "{message}"),
        }

        self.sink
            .append(PlatformLog {
                id: uuid::Uuid::new_v4().to_string(),
                project_id: self.project_id.clone(),
                platform_config_id: self.platform_config_id.clone(),
                platform: self.platform.clone(),
                level,
                category,
                message,
                metadata,
                error: err,
                timestamp: Utc::now(),
            })
            .await;
    }

    pub async fn log_connection(&self, message: impl Into<String>) {
        self.append(LogLevel::Info, LogCategory::Connection, message.into(), None, None)
            .await;
    }

    pub async fn log_webhook(&self, message: impl Into<String>, metadata: Option<serde_json::Value>) {
        self.append(LogLevel::Info, LogCategory::Webhook, message.into(), metadata, None)
            .await;
    }

    pub async fn log_message(&self, message: impl Into<String>) {
        self.append(LogLevel::Info, LogCategory::Message, message.into(), None, None)
            .await;
    }

    pub async fn log_auth(&self, message: impl Into<String>) {
        self.append(LogLevel::Info, LogCategory::Auth, message.into(), None, None)
            .await;
    }

    pub async fn debug_message(&self, message: impl Into<String>) {
        self.append(LogLevel::Debug, LogCategory::Message, message.into(), None, None)
            .await;
    }

    pub async fn warn_connection(&self, message: impl Into<String>) {
        self.append(LogLevel::Warn, LogCategory::Connection, message.into(), None, None)
            .await;
    }

    pub async fn error_connection(&self, message: impl Into<String>, err: impl Into<String>) {
        self.append(
            LogLevel::Error,
            LogCategory::Connection,
            message.into(),
            None,
            Some(err.into()),
        )
        .await;
    }

    pub async fn error_webhook(&self, message: impl Into<String>, err: impl Into<String>) {
        self.append(
            LogLevel::Error,
            LogCategory::Webhook,
            message.into(),
            None,
            Some(err.into()),
        )
        .await;
    }

    pub async fn error_message(&self, message: impl Into<String>, err: impl Into<String>) {
        self.append(
            LogLevel::Error,
            LogCategory::Message,
            message.into(),
            None,
            Some(err.into()),
        )
        .await;
    }
}
