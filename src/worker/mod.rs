//! Worker process: executes queued jobs delivered over HTTP.
//!
//! Task endpoints always answer 200 so the queue never retries permanent
//! failures; the job record carries the real outcome. Redelivery of a
//! terminal job short-circuits, which makes the endpoints idempotent under
//! at-least-once delivery.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::config::Settings;
use crate::graph::GraphStore;
use crate::github::RepositoryHost;
use crate::ingest::{IncrementalUpdater, IngestionPipeline};
use crate::jobs::{
    IncrementalPRPayload, IncrementalPushPayload, IngestionTaskPayload, JobStatus, JobTracker,
    StatusUpdate,
};
use crate::types::{ChangeRecord, RepoId};

#[derive(Clone)]
pub struct WorkerContext {
    pub settings: Arc<Settings>,
    pub store: Arc<GraphStore>,
    pub tracker: Arc<dyn JobTracker>,
    pub host: Arc<dyn RepositoryHost>,
}

impl WorkerContext {
    fn pipeline(&self) -> IngestionPipeline {
        IngestionPipeline::new(self.store.clone(), self.settings.clone())
    }

    fn updater(&self) -> IncrementalUpdater {
        IncrementalUpdater::new(self.store.clone(), self.settings.clone())
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.settings.queue.identity_token else {
            return true;
        };
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == format!("Bearer {expected}"))
            .unwrap_or(false)
    }
}

pub fn router(ctx: WorkerContext) -> Router {
    Router::new()
        .route("/tasks/ingest", post(handle_ingest))
        .route("/tasks/incremental-pr", post(handle_incremental_pr))
        .route("/tasks/incremental-push", post(handle_incremental_push))
        .route("/health", get(health))
        .with_state(ctx)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

fn processed(job_id: &str) -> Json<Value> {
    Json(json!({ "status": "processed", "job_id": job_id }))
}

/// True when the job already reached a terminal state: the queue
/// redelivered a finished task and there is nothing to do.
fn short_circuit(ctx: &WorkerContext, job_id: &str) -> bool {
    matches!(
        ctx.tracker.get(job_id),
        Ok(Some(job)) if job.status.is_terminal()
    )
}

fn mark_failed(ctx: &WorkerContext, job_id: &str, error: &str) {
    if let Err(e) = ctx.tracker.update_status(
        job_id,
        JobStatus::Failed,
        StatusUpdate {
            stats: None,
            error_message: Some(error.to_string()),
        },
    ) {
        tracing::error!("[worker] failed to record failure for {job_id}: {e}");
    }
}

async fn handle_ingest(
    State(ctx): State<WorkerContext>,
    headers: HeaderMap,
    Json(payload): Json<IngestionTaskPayload>,
) -> Result<Json<Value>, axum::http::StatusCode> {
    if !ctx.authorized(&headers) {
        return Err(axum::http::StatusCode::UNAUTHORIZED);
    }
    let job_id = payload.job_id.clone();
    crate::log_event!("worker", "ingest", "{job_id} {}/{}", payload.owner, payload.repo_name);

    if short_circuit(&ctx, &job_id) {
        return Ok(processed(&job_id));
    }
    // The record may not exist when the task was posted directly.
    if matches!(ctx.tracker.get(&job_id), Ok(None)) {
        if let Err(e) = ctx.tracker.create(&payload) {
            tracing::error!("[worker] cannot create job record {job_id}: {e}");
        }
    }
    let _ = ctx
        .tracker
        .update_status(&job_id, JobStatus::Running, StatusUpdate::default());

    let repo = RepoId::new(&payload.owner, &payload.repo_name);
    match ctx
        .pipeline()
        .ingest_github(ctx.host.as_ref(), &repo, payload.branch.clone(), payload.clear_existing)
        .await
    {
        Ok(stats) => {
            let update = StatusUpdate {
                stats: serde_json::to_value(&stats).ok(),
                error_message: None,
            };
            let _ = ctx.tracker.update_status(&job_id, JobStatus::Completed, update);
        }
        Err(e) => mark_failed(&ctx, &job_id, &e.to_string()),
    }

    Ok(processed(&job_id))
}

async fn handle_incremental_pr(
    State(ctx): State<WorkerContext>,
    headers: HeaderMap,
    Json(payload): Json<IncrementalPRPayload>,
) -> Result<Json<Value>, axum::http::StatusCode> {
    if !ctx.authorized(&headers) {
        return Err(axum::http::StatusCode::UNAUTHORIZED);
    }
    let job_id = payload.job_id.clone();
    crate::log_event!(
        "worker",
        "incremental-pr",
        "{job_id} {}/{}#{}",
        payload.owner,
        payload.repo_name,
        payload.pr_number
    );

    if short_circuit(&ctx, &job_id) {
        return Ok(processed(&job_id));
    }
    ensure_job_record(&ctx, &job_id, &payload.owner, &payload.repo_name);

    let repo = RepoId::new(&payload.owner, &payload.repo_name);
    let changes = match ctx.host.list_pr_files(&repo, payload.pr_number).await {
        Ok(changes) => changes,
        Err(e) => {
            mark_failed(&ctx, &job_id, &e.to_string());
            return Ok(processed(&job_id));
        }
    };

    run_incremental(&ctx, &job_id, repo, changes).await;
    Ok(processed(&job_id))
}

async fn handle_incremental_push(
    State(ctx): State<WorkerContext>,
    headers: HeaderMap,
    Json(payload): Json<IncrementalPushPayload>,
) -> Result<Json<Value>, axum::http::StatusCode> {
    if !ctx.authorized(&headers) {
        return Err(axum::http::StatusCode::UNAUTHORIZED);
    }
    let job_id = payload.job_id.clone();
    crate::log_event!(
        "worker",
        "incremental-push",
        "{job_id} {}/{} {}..{}",
        payload.owner,
        payload.repo_name,
        &payload.before_sha[..payload.before_sha.len().min(7)],
        &payload.after_sha[..payload.after_sha.len().min(7)]
    );

    if short_circuit(&ctx, &job_id) {
        return Ok(processed(&job_id));
    }
    ensure_job_record(&ctx, &job_id, &payload.owner, &payload.repo_name);

    let repo = RepoId::new(&payload.owner, &payload.repo_name);
    let changes = match ctx
        .host
        .compare(&repo, &payload.before_sha, &payload.after_sha)
        .await
    {
        Ok(changes) => changes,
        Err(e) => {
            mark_failed(&ctx, &job_id, &e.to_string());
            return Ok(processed(&job_id));
        }
    };

    run_incremental(&ctx, &job_id, repo, changes).await;
    Ok(processed(&job_id))
}

fn ensure_job_record(ctx: &WorkerContext, job_id: &str, owner: &str, repo_name: &str) {
    if matches!(ctx.tracker.get(job_id), Ok(None)) {
        let payload = IngestionTaskPayload {
            job_id: job_id.to_string(),
            owner: owner.to_string(),
            repo_name: repo_name.to_string(),
            branch: None,
            clear_existing: false,
        };
        if let Err(e) = ctx.tracker.create(&payload) {
            tracing::error!("[worker] cannot create job record {job_id}: {e}");
        }
    }
    let _ = ctx
        .tracker
        .update_status(job_id, JobStatus::Running, StatusUpdate::default());
}

async fn run_incremental(
    ctx: &WorkerContext,
    job_id: &str,
    repo: RepoId,
    changes: Vec<ChangeRecord>,
) {
    let updater = ctx.updater();

    let working_tree = match updater.sync_repository(ctx.host.as_ref(), &repo).await {
        Ok(path) => path,
        Err(e) => {
            mark_failed(ctx, job_id, &e.to_string());
            return;
        }
    };

    let apply_updater = updater.clone();
    let apply_repo = repo.clone();
    let result = tokio::task::spawn_blocking(move || {
        apply_updater.apply(&apply_repo, &working_tree, &changes)
    })
    .await;

    match result {
        Ok(Ok(stats)) => {
            let update = StatusUpdate {
                stats: serde_json::to_value(&stats).ok(),
                error_message: None,
            };
            let _ = ctx.tracker.update_status(job_id, JobStatus::Completed, update);
        }
        Ok(Err(e)) => mark_failed(ctx, job_id, &e.to_string()),
        Err(e) => mark_failed(ctx, job_id, &format!("update task panicked: {e}")),
    }
}
