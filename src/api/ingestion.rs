//! Ingestion dispatch and job status endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Json, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;

use crate::api::ApiState;
use crate::jobs::{IngestionTaskPayload, JobStatus, JobTracker, StatusUpdate, new_job_id};
use crate::queue::TaskKind;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub owner: String,
    pub repo_name: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub clear_existing: bool,
}

/// `POST /api/v1/ingest/github`: validate, apply the duplicate-job guard,
/// persist the record, enqueue the task.
pub async fn ingest_github(
    State(state): State<ApiState>,
    Json(request): Json<IngestRequest>,
) -> impl IntoResponse {
    if request.owner.trim().is_empty() || request.repo_name.trim().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "owner and repo_name are required" })),
        );
    }

    let payload = IngestionTaskPayload {
        job_id: new_job_id("ing"),
        owner: request.owner.clone(),
        repo_name: request.repo_name.clone(),
        branch: request.branch.clone(),
        clear_existing: request.clear_existing,
    };

    let (job, created) = match state.tracker.create_unique(&payload) {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("[ingest] job creation failed: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "job store unavailable" })),
            );
        }
    };

    if !created {
        return (
            StatusCode::OK,
            Json(json!({
                "status": "already_running",
                "job_id": job.job_id,
                "repo": format!("{}/{}", job.owner, job.repo_name),
            })),
        );
    }

    let task_payload = match serde_json::to_value(&payload) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!("[ingest] payload serialization failed: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal serialization failure" })),
            );
        }
    };
    match state.queue.enqueue(TaskKind::Ingest, task_payload).await {
        Ok(_) => {
            let _ = state.tracker.update_status(
                &job.job_id,
                JobStatus::Dispatched,
                StatusUpdate::default(),
            );
            (
                StatusCode::ACCEPTED,
                Json(json!({
                    "status": "dispatched",
                    "job_id": job.job_id,
                    "repo": format!("{}/{}", request.owner, request.repo_name),
                })),
            )
        }
        Err(e) => {
            let _ = state.tracker.update_status(
                &job.job_id,
                JobStatus::Failed,
                StatusUpdate {
                    stats: None,
                    error_message: Some(e.to_string()),
                },
            );
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": format!("task dispatch failed: {e}") })),
            )
        }
    }
}

/// `GET /api/v1/ingest/jobs/{job_id}`: poll a job's state; on failure the
/// record carries the message.
pub async fn job_status(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match state.tracker.get(&job_id) {
        Ok(Some(job)) => (StatusCode::OK, Json(json!(job))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("job '{job_id}' not found") })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// `GET /api/v1/ingest/jobs?limit=`: most recent jobs.
pub async fn list_jobs(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    match state.tracker.list_recent(query.limit.min(200)) {
        Ok(jobs) => (StatusCode::OK, Json(json!({ "jobs": jobs }))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}
