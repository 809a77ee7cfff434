//! Task queue collaborator.
//!
//! The API process enqueues; delivery is an authenticated HTTP POST to the
//! worker. At-least-once: failed deliveries are retried until the dispatch
//! deadline runs out. Worker endpoints are idempotent, so redelivery of an
//! already-finished job is harmless.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::QueueConfig;
use crate::error::QueueError;

const RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Ingest,
    IncrementalPr,
    IncrementalPush,
}

impl TaskKind {
    pub fn endpoint(&self) -> &'static str {
        match self {
            TaskKind::Ingest => "/tasks/ingest",
            TaskKind::IncrementalPr => "/tasks/incremental-pr",
            TaskKind::IncrementalPush => "/tasks/incremental-push",
        }
    }
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Queue a task for delivery. Returns a handle immediately; delivery
    /// happens in the background.
    async fn enqueue(&self, kind: TaskKind, payload: serde_json::Value)
    -> Result<String, QueueError>;
}

pub struct HttpTaskQueue {
    http: reqwest::Client,
    worker_url: String,
    identity_token: Option<String>,
    dispatch_deadline: Duration,
}

impl HttpTaskQueue {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            worker_url: config.worker_url.trim_end_matches('/').to_string(),
            identity_token: config.identity_token.clone(),
            dispatch_deadline: Duration::from_secs(config.dispatch_deadline_secs),
        }
    }
}

#[async_trait]
impl TaskQueue for HttpTaskQueue {
    async fn enqueue(
        &self,
        kind: TaskKind,
        payload: serde_json::Value,
    ) -> Result<String, QueueError> {
        let url = format!("{}{}", self.worker_url, kind.endpoint());
        let handle = payload
            .get("job_id")
            .and_then(|v| v.as_str())
            .unwrap_or("task")
            .to_string();

        let http = self.http.clone();
        let token = self.identity_token.clone();
        let deadline = self.dispatch_deadline;
        let task_handle = handle.clone();

        tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                let mut request = http.post(&url).json(&payload);
                if let Some(token) = &token {
                    request = request.bearer_auth(token);
                }
                // The worker holds the connection until the job finishes,
                // so the per-request timeout is the remaining deadline.
                let remaining = deadline.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    tracing::error!("[queue] {task_handle}: dispatch deadline exceeded");
                    return;
                }
                match request.timeout(remaining).send().await {
                    Ok(response) if response.status().is_success() => {
                        crate::debug_event!("queue", "delivered", "{task_handle} (attempt {attempt})");
                        return;
                    }
                    Ok(response) => {
                        tracing::warn!(
                            "[queue] {task_handle}: worker returned {} (attempt {attempt})",
                            response.status()
                        );
                    }
                    Err(e) => {
                        tracing::warn!("[queue] {task_handle}: delivery failed: {e} (attempt {attempt})");
                    }
                }
                tokio::time::sleep(RETRY_DELAY).await;
            }
        });

        crate::log_event!("queue", "enqueued", "{handle} -> {}", kind.endpoint());
        Ok(handle)
    }
}
