//! API process: webhooks, job dispatch, and synchronous graph queries.

pub mod ingestion;
pub mod query;
pub mod webhooks;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;

use crate::config::Settings;
use crate::graph::GraphStore;
use crate::github::RepositoryHost;
use crate::jobs::JobTracker;
use crate::queue::TaskQueue;

#[derive(Clone)]
pub struct ApiState {
    pub settings: Arc<Settings>,
    pub store: Arc<GraphStore>,
    pub tracker: Arc<dyn JobTracker>,
    pub queue: Arc<dyn TaskQueue>,
    /// Present when GitHub App credentials are configured; the PR-review
    /// webhook path needs it, plain queries do not.
    pub host: Option<Arc<dyn RepositoryHost>>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/webhook/push", post(webhooks::on_push))
        .route("/api/v1/webhook/events", post(webhooks::on_event))
        .route("/api/v1/ingest/github", post(ingestion::ingest_github))
        .route("/api/v1/ingest/jobs", get(ingestion::list_jobs))
        .route("/api/v1/ingest/jobs/{job_id}", get(ingestion::job_status))
        .route("/api/v1/query/diff-context", post(query::diff_context))
        .route("/api/v1/query/callers", get(query::callers))
        .route("/api/v1/query/search", get(query::search))
        .route("/api/v1/query/file", get(query::file_source))
        .route("/api/v1/query/impact", get(query::impact))
        .route("/api/v1/repos", get(query::list_repos))
        .route("/api/v1/repos/{owner}/{name}/stats", get(query::repo_stats))
        .route("/api/v1/repos/{owner}/{name}", delete(query::delete_repo))
        .route("/api/v1/debug/graph-stats", get(query::graph_stats))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
