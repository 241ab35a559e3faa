//! Outbound delivery pipeline
//!
//! Accept -> enqueue -> worker -> per-target fan-out -> adapter send ->
//! per-target status. One accepted request becomes one job carrying every
//! target; targets are iterated sequentially inside one worker while
//! different jobs run in parallel. Failures split into permanent (abort the
//! job, no retry) and transient (mark the target, let the queue back off
//! and retry the job).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use gatekit_core::{
    Envelope, EventKind, EventRecord, GatewayError, GatewayResult, MessageTarget, Project,
    ReplyPayload, SendContent, SendMetadata, SendOptions, SentMessage, SentStatus, TargetInput,
    TargetKind,
};
use gatekit_platforms::{PlatformRegistry, SendError};
use gatekit_store::{MessageStore, PlatformConfigStore, Store, StoreError};

use crate::subscribers::EventDispatcher;

/// Error-message markers treated as permanent. Provisional: kept for parity
/// with the substring classifier this pipeline replaces; adapters should
/// classify their own errors instead.
pub const PERMANENT_MARKERS: [&str; 7] = [
    "Platform configuration",
    "not found",
    "timed out",
    "disabled",
    "invalid",
    "EFATAL",
    "not provided",
];

/// True when a message matches the permanent-marker list
pub fn is_permanent_marker(message: &str) -> bool {
    PERMANENT_MARKERS.iter().any(|marker| message.contains(marker))
}

/// Resolve an adapter send error into the job-level taxonomy
pub fn classify_send_error(error: SendError) -> JobError {
    match error {
        SendError::Permanent(message) => JobError::Permanent(message),
        SendError::Transient(message) => JobError::Transient(message),
        SendError::Unclassified(message) => {
            if is_permanent_marker(&message) {
                JobError::Permanent(message)
            } else {
                JobError::Transient(message)
            }
        }
    }
}

/// Job-level failure
#[derive(Debug, Clone)]
pub enum JobError {
    /// Abort the job; the queue must not retry
    Permanent(String),
    /// The queue applies its backoff policy
    Transient(String),
}

impl JobError {
    pub fn message(&self) -> &str {
        match self {
            Self::Permanent(m) | Self::Transient(m) => m,
        }
    }
}

/// Send request as accepted on the API
#[derive(Debug, Clone, Deserialize)]
pub struct SendRequest {
    pub targets: Vec<TargetInput>,
    pub content: SendContent,
    #[serde(default)]
    pub options: SendOptions,
    #[serde(default)]
    pub metadata: SendMetadata,
}

/// Synchronous acceptance response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub job_id: String,
    pub status: &'static str,
    pub targets: usize,
    pub timestamp: DateTime<Utc>,
}

/// Queue-side job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Active,
    Delayed,
    Completed,
    Failed,
}

/// Job payload carried through the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMessage {
    pub targets: Vec<MessageTarget>,
    /// SentMessage row ids, parallel to `targets`
    pub sent_ids: Vec<String>,
    pub content: SendContent,
    pub options: SendOptions,
    pub metadata: SendMetadata,
}

/// Job result data exposed on the status API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobData {
    pub project_slug: String,
    pub project_id: String,
    pub message: JobMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Snapshot of one job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub id: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    pub attempts_made: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_on: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_on: Option<DateTime<Utc>>,
    pub data: JobData,
}

/// Queue tuning
#[derive(Debug, Clone)]
pub struct OutboundConfig {
    pub workers: usize,
    pub attempts: u32,
    pub backoff_base: Duration,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            attempts: 3,
            backoff_base: Duration::from_millis(2000),
        }
    }
}

struct WorkItem {
    job_id: String,
    attempt: u32,
}

/// The outbound pipeline: accept, queue, and worker pool
pub struct OutboundPipeline {
    store: Arc<dyn Store>,
    registry: Arc<PlatformRegistry>,
    events: Arc<dyn EventDispatcher>,
    jobs: DashMap<String, JobStatus>,
    tx: mpsc::Sender<WorkItem>,
    config: OutboundConfig,
}

impl OutboundPipeline {
    /// Build the pipeline and start its worker pool
    pub fn start(
        store: Arc<dyn Store>,
        registry: Arc<PlatformRegistry>,
        events: Arc<dyn EventDispatcher>,
        config: OutboundConfig,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<WorkItem>(1024);
        let pipeline = Arc::new(Self {
            store,
            registry,
            events,
            jobs: DashMap::new(),
            tx,
            config,
        });

        let rx = Arc::new(Mutex::new(rx));
        for worker_id in 0..pipeline.config.workers.max(1) {
            let pipeline = pipeline.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                debug!(worker_id, "outbound worker started");
                loop {
                    let item = { rx.lock().await.recv().await };
                    let Some(item) = item else { break };
                    pipeline.run_job(item).await;
                }
                debug!(worker_id, "outbound worker stopped");
            });
        }
        pipeline
    }

    /// Accept a send request: validate, write one pending row per target,
    /// enqueue a single job, and return the job id synchronously.
    pub async fn submit(
        &self,
        project: &Project,
        request: SendRequest,
    ) -> GatewayResult<SendResponse> {
        if request.targets.is_empty() {
            return Err(GatewayError::validation("targets", "must not be empty"));
        }
        let targets: Vec<MessageTarget> = request
            .targets
            .iter()
            .map(|t| t.resolve())
            .collect::<GatewayResult<_>>()?;
        request.content.validate()?;

        self.create_job(
            &project.slug,
            &project.id,
            targets,
            request.content,
            request.options,
            request.metadata,
        )
        .await
    }

    async fn create_job(
        &self,
        project_slug: &str,
        project_id: &str,
        targets: Vec<MessageTarget>,
        content: SendContent,
        options: SendOptions,
        metadata: SendMetadata,
    ) -> GatewayResult<SendResponse> {
        let job_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut sent_ids = Vec::with_capacity(targets.len());
        for target in &targets {
            let platform = self
                .store
                .platform_by_id(&target.platform_id)
                .await?
                .map(|c| c.platform)
                .unwrap_or_default();
            let row = self
                .store
                .insert_sent(SentMessage {
                    id: Uuid::new_v4().to_string(),
                    project_id: project_id.to_string(),
                    platform_config_id: target.platform_id.clone(),
                    platform,
                    job_id: job_id.clone(),
                    provider_message_id: None,
                    target_kind: target.kind,
                    target_chat_id: target.id.clone(),
                    target_user_id: (target.kind == TargetKind::User).then(|| target.id.clone()),
                    message_text: content.text.clone(),
                    message_content: serde_json::to_value(&content)
                        .unwrap_or(serde_json::Value::Null),
                    status: SentStatus::Pending,
                    error_message: None,
                    sent_at: None,
                    created_at: now,
                })
                .await?;
            sent_ids.push(row.id);
        }

        let status = JobStatus {
            id: job_id.clone(),
            state: JobState::Queued,
            progress: None,
            attempts_made: 0,
            processed_on: None,
            finished_on: None,
            data: JobData {
                project_slug: project_slug.to_string(),
                project_id: project_id.to_string(),
                message: JobMessage {
                    targets: targets.clone(),
                    sent_ids,
                    content,
                    options,
                    metadata,
                },
                error: None,
            },
        };
        self.jobs.insert(job_id.clone(), status);

        self.tx
            .send(WorkItem {
                job_id: job_id.clone(),
                attempt: 1,
            })
            .await
            .map_err(|_| GatewayError::Queue("outbound queue is closed".into()))?;

        info!(%job_id, targets = targets.len(), "send job queued");
        Ok(SendResponse {
            job_id,
            status: "queued",
            targets: targets.len(),
            timestamp: now,
        })
    }

    /// Job snapshot for the status API
    pub fn job_status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.get(job_id).map(|j| j.clone())
    }

    /// Re-enqueue a finished job's payload as a fresh job with fresh rows.
    /// The original job and its rows are left untouched.
    pub async fn retry(&self, job_id: &str) -> GatewayResult<SendResponse> {
        let original = self
            .jobs
            .get(job_id)
            .map(|j| j.data.clone())
            .ok_or_else(|| GatewayError::NotFound("job".into()))?;

        self.create_job(
            &original.project_slug,
            &original.project_id,
            original.message.targets,
            original.message.content,
            original.message.options,
            original.message.metadata,
        )
        .await
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    async fn run_job(&self, item: WorkItem) {
        let job_id = item.job_id.clone();
        if let Some(mut job) = self.jobs.get_mut(&job_id) {
            job.state = JobState::Active;
            job.attempts_made = item.attempt;
            if job.processed_on.is_none() {
                job.processed_on = Some(Utc::now());
            }
        } else {
            warn!(%job_id, "work item for unknown job");
            return;
        }

        let result = self.process(&job_id, item.attempt).await;
        match result {
            Ok(()) => {
                if let Some(mut job) = self.jobs.get_mut(&job_id) {
                    job.state = JobState::Completed;
                    job.finished_on = Some(Utc::now());
                    job.progress = Some(100);
                }
            }
            Err(JobError::Permanent(message)) => {
                info!(%job_id, error = %message, "job failed permanently");
                if let Some(mut job) = self.jobs.get_mut(&job_id) {
                    job.state = JobState::Failed;
                    job.finished_on = Some(Utc::now());
                    job.data.error = Some(message);
                }
            }
            Err(JobError::Transient(message)) => {
                if item.attempt >= self.config.attempts {
                    info!(%job_id, error = %message, "job failed after final attempt");
                    if let Some(mut job) = self.jobs.get_mut(&job_id) {
                        job.state = JobState::Failed;
                        job.finished_on = Some(Utc::now());
                        job.data.error = Some(message);
                    }
                    self.emit_final_failures(&job_id).await;
                } else {
                    let delay = self.backoff(item.attempt);
                    debug!(%job_id, attempt = item.attempt, ?delay, "job delayed for retry");
                    if let Some(mut job) = self.jobs.get_mut(&job_id) {
                        job.state = JobState::Delayed;
                        job.data.error = Some(message);
                    }
                    let tx = self.tx.clone();
                    let next = WorkItem {
                        job_id,
                        attempt: item.attempt + 1,
                    };
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(next).await;
                    });
                }
            }
        }
    }

    async fn process(&self, job_id: &str, attempt: u32) -> Result<(), JobError> {
        let data = self
            .jobs
            .get(job_id)
            .map(|j| j.data.clone())
            .ok_or_else(|| JobError::Permanent("job data missing".into()))?;
        let message = &data.message;
        let is_final_attempt = attempt >= self.config.attempts;

        let mut transient: Option<String> = None;

        for (target, sent_id) in message.targets.iter().zip(message.sent_ids.iter()) {
            // Rows already delivered on an earlier attempt are skipped
            if let Ok(Some(row)) = self.store.sent_by_id(sent_id).await {
                if row.status == SentStatus::Sent {
                    continue;
                }
            }

            // 1. Platform config must exist and be active
            let config = match self.store.platform_by_id(&target.platform_id).await {
                Ok(Some(config)) if config.is_active => config,
                Ok(Some(_)) => {
                    let message =
                        format!("Platform configuration {} is disabled", target.platform_id);
                    self.finish_target(sent_id, &data.project_id, &message, true).await;
                    self.abort_remaining(message.clone(), &data, sent_id).await;
                    return Err(JobError::Permanent(message));
                }
                _ => {
                    let message =
                        format!("Platform configuration {} not found", target.platform_id);
                    self.finish_target(sent_id, &data.project_id, &message, true).await;
                    self.abort_remaining(message.clone(), &data, sent_id).await;
                    return Err(JobError::Permanent(message));
                }
            };

            // 2. Adapter connection, created on demand for cold configs
            let connection = match self.registry.ensure_connection(&config).await {
                Ok(connection) => connection,
                Err(e) => {
                    let message = e.to_string();
                    if is_permanent_marker(&message) {
                        self.finish_target(sent_id, &data.project_id, &message, true).await;
                        self.abort_remaining(message.clone(), &data, sent_id).await;
                        return Err(JobError::Permanent(message));
                    }
                    self.finish_target(sent_id, &data.project_id, &message, is_final_attempt)
                        .await;
                    transient = Some(message);
                    continue;
                }
            };

            // 3. Outbound envelope: a synthetic system-user message
            let envelope = Envelope::builder(&config.platform, &data.project_id)
                .platform_config_id(&config.id)
                .thread_id(&target.id)
                .user("system", Some("System".to_string()))
                .provider(
                    job_id.to_string(),
                    serde_json::json!({
                        "platformId": target.platform_id,
                        "trackingId": message.metadata.tracking_id,
                        "tags": message.metadata.tags,
                    }),
                )
                .build()
                .map_err(|e| JobError::Permanent(format!("envelope build failed: {e}")))?;

            // 4. Flatten the accepted content into the adapter reply
            let reply = ReplyPayload::from_request(&message.content, &message.options, &target.id);

            // 5/6. Send, classify, record
            match connection.send_message(&envelope, &reply).await {
                Ok(receipt) => {
                    match self
                        .store
                        .update_sent_status(
                            sent_id,
                            SentStatus::Sent,
                            receipt.provider_message_id,
                            None,
                            Some(Utc::now()),
                        )
                        .await
                    {
                        Ok(row) => {
                            self.events
                                .dispatch(EventRecord::new(
                                    EventKind::MessageSent,
                                    &data.project_id,
                                    serde_json::to_value(&row)
                                        .unwrap_or(serde_json::Value::Null),
                                ))
                                .await;
                        }
                        Err(StoreError::InvalidTransition(msg)) => {
                            debug!(%sent_id, "late success on terminal row: {msg}");
                        }
                        Err(e) => warn!(%sent_id, "failed to record send: {e}"),
                    }
                }
                Err(send_error) => match classify_send_error(send_error) {
                    JobError::Permanent(message) => {
                        self.finish_target(sent_id, &data.project_id, &message, true).await;
                        self.abort_remaining(message.clone(), &data, sent_id).await;
                        return Err(JobError::Permanent(message));
                    }
                    JobError::Transient(message) => {
                        self.finish_target(sent_id, &data.project_id, &message, is_final_attempt)
                            .await;
                        transient = Some(message);
                    }
                },
            }
        }

        match transient {
            Some(message) => Err(JobError::Transient(message)),
            None => Ok(()),
        }
    }

    /// Mark one target failed; emit `message.failed` when the failure is
    /// final (permanent, or the last transient attempt).
    async fn finish_target(&self, sent_id: &str, project_id: &str, message: &str, emit: bool) {
        let updated = self
            .store
            .update_sent_status(
                sent_id,
                SentStatus::Failed,
                None,
                Some(message.to_string()),
                None,
            )
            .await;
        let row = match updated {
            Ok(row) => Some(row),
            Err(StoreError::InvalidTransition(_)) => {
                // Already terminal from an earlier attempt
                self.store.sent_by_id(sent_id).await.ok().flatten()
            }
            Err(e) => {
                warn!(%sent_id, "failed to record target failure: {e}");
                None
            }
        };

        if emit {
            if let Some(row) = row {
                self.events
                    .dispatch(EventRecord::new(
                        EventKind::MessageFailed,
                        project_id,
                        serde_json::to_value(&row).unwrap_or(serde_json::Value::Null),
                    ))
                    .await;
            }
        }
    }

    /// A permanent failure aborts the whole job; rows that were never
    /// attempted still have to reach a terminal state.
    async fn abort_remaining(&self, reason: String, data: &JobData, failed_sent_id: &str) {
        let mut seen_failure = false;
        for sent_id in &data.message.sent_ids {
            if sent_id == failed_sent_id {
                seen_failure = true;
                continue;
            }
            if !seen_failure {
                continue;
            }
            let message = format!("aborted by permanent failure: {reason}");
            self.finish_target(sent_id, &data.project_id, &message, true).await;
        }
    }

    /// After the final transient attempt, targets that never made it out
    /// get their failure events.
    async fn emit_final_failures(&self, job_id: &str) {
        let Some(data) = self.jobs.get(job_id).map(|j| j.data.clone()) else {
            return;
        };
        for sent_id in &data.message.sent_ids {
            if let Ok(Some(row)) = self.store.sent_by_id(sent_id).await {
                if row.status == SentStatus::Pending {
                    self.finish_target(
                        sent_id,
                        &data.project_id,
                        "delivery exhausted retry attempts",
                        true,
                    )
                    .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_list_matches_spec_behaviors() {
        assert!(is_permanent_marker("Platform configuration cfg-9 not found"));
        assert!(is_permanent_marker("request timed out: deadline exceeded"));
        assert!(is_permanent_marker("config disabled by operator"));
        assert!(is_permanent_marker("invalid token"));
        assert!(is_permanent_marker("EFATAL: socket hang up"));
        assert!(is_permanent_marker("chat id not provided"));
        assert!(!is_permanent_marker("connection reset by peer"));
        assert!(!is_permanent_marker("rate limited"));
    }

    #[test]
    fn test_classifier_respects_typed_errors_first() {
        // A typed transient stays transient even if the text matches a marker
        let result = classify_send_error(SendError::transient("temporarily not found"));
        assert!(matches!(result, JobError::Transient(_)));

        let result = classify_send_error(SendError::permanent("no such chat"));
        assert!(matches!(result, JobError::Permanent(_)));

        // Unclassified falls back to the marker list
        let result = classify_send_error(SendError::Unclassified("chat not found".into()));
        assert!(matches!(result, JobError::Permanent(_)));
        let result = classify_send_error(SendError::Unclassified("connection reset".into()));
        assert!(matches!(result, JobError::Transient(_)));
    }

    #[test]
    fn test_backoff_is_exponential_base_2000() {
        let pipeline_config = OutboundConfig::default();
        let base = pipeline_config.backoff_base;
        assert_eq!(base, Duration::from_millis(2000));
        // 2000 * 2^(attempt-1)
        assert_eq!(base * 2u32.pow(0), Duration::from_millis(2000));
        assert_eq!(base * 2u32.pow(1), Duration::from_millis(4000));
        assert_eq!(base * 2u32.pow(2), Duration::from_millis(8000));
    }

    #[test]
    fn test_send_request_accepts_compact_and_structured_targets() {
        let raw = serde_json::json!({
            "targets": [
                "cfg-1:user:42",
                {"platformId": "cfg-2", "type": "channel", "id": "general"}
            ],
            "content": {"text": "hi"}
        });
        let request: SendRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.targets.len(), 2);
        assert_eq!(request.targets[0].resolve().unwrap().platform_id, "cfg-1");
        assert_eq!(request.targets[1].resolve().unwrap().kind, TargetKind::Channel);
    }
}
