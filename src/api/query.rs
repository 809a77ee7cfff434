//! Synchronous read endpoints against the graph.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Json, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;

use crate::api::ApiState;
use crate::graph::{ContextBuilder, GraphWriter};
use crate::types::{Hunk, RepoId};

fn bad_repo() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "repo must be 'owner/name'" })),
    )
}

#[derive(Debug, Deserialize)]
pub struct DiffContextRequest {
    pub repo: String,
    #[serde(default)]
    pub changes: Vec<Hunk>,
}

/// `POST /api/v1/query/diff-context`: the C3 entry point.
pub async fn diff_context(
    State(state): State<ApiState>,
    Json(request): Json<DiffContextRequest>,
) -> impl IntoResponse {
    let Some(repo) = RepoId::parse(&request.repo) else {
        return bad_repo();
    };
    let context = ContextBuilder::new(&state.store).build_diff_context(&repo, &request.changes);
    (StatusCode::OK, Json(json!(context)))
}

#[derive(Debug, Deserialize)]
pub struct CallersQuery {
    pub repo: String,
    pub name: String,
}

/// `GET /api/v1/query/callers`: graph-edge callers with the file-content
/// fallback behind them.
pub async fn callers(
    State(state): State<ApiState>,
    Query(query): Query<CallersQuery>,
) -> impl IntoResponse {
    let Some(repo) = RepoId::parse(&query.repo) else {
        return bad_repo();
    };
    let callers = ContextBuilder::new(&state.store).find_callers(&repo, &query.name);
    (
        StatusCode::OK,
        Json(json!({ "symbol": query.name, "callers": callers })),
    )
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default)]
    pub repo: Option<String>,
    /// `symbols` (default) searches the code index; `files` searches
    /// stored file content.
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

fn default_search_limit() -> usize {
    20
}

/// `GET /api/v1/query/search`: fulltext search over the `code_search`
/// index, or over `file_content_search` with `scope=files`.
pub async fn search(
    State(state): State<ApiState>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    let repo_key = query.repo.as_deref();
    let limit = query.limit.min(100);
    let result = if query.scope.as_deref() == Some("files") {
        state
            .store
            .fulltext()
            .file_content_search(&query.q, repo_key, limit)
            .map(|hits| json!({ "results": hits }))
    } else {
        state
            .store
            .fulltext()
            .code_search(&query.q, repo_key, limit)
            .map(|hits| json!({ "results": hits }))
    };
    match result {
        Ok(body) => (StatusCode::OK, Json(body)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub repo: String,
    pub path: String,
}

/// `GET /api/v1/query/file`: size-gated full-file retrieval. Files above
/// the storage cap have no stored text and come back 404.
pub async fn file_source(
    State(state): State<ApiState>,
    Query(query): Query<FileQuery>,
) -> impl IntoResponse {
    let Some(repo) = RepoId::parse(&query.repo) else {
        return bad_repo();
    };
    match ContextBuilder::new(&state.store).file_source(&repo, &query.path) {
        Some((source_code, lines_count)) => (
            StatusCode::OK,
            Json(json!({
                "path": query.path,
                "lines_count": lines_count,
                "source_code": source_code,
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "file not found or source not stored" })),
        ),
    }
}

#[derive(Debug, Deserialize)]
pub struct ImpactQuery {
    pub repo: String,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
}

/// `GET /api/v1/query/impact`: transitive callers, bounded depth.
pub async fn impact(
    State(state): State<ApiState>,
    Query(query): Query<ImpactQuery>,
) -> impl IntoResponse {
    let Some(repo) = RepoId::parse(&query.repo) else {
        return bad_repo();
    };
    let impacted =
        ContextBuilder::new(&state.store).impact_of(&repo, &query.name, query.path.as_deref());
    (
        StatusCode::OK,
        Json(json!({ "symbol": query.name, "impacted": impacted })),
    )
}

/// `GET /api/v1/repos`: every ingested repository.
pub async fn list_repos(State(state): State<ApiState>) -> impl IntoResponse {
    let repos = ContextBuilder::new(&state.store).list_repositories();
    Json(json!({ "repositories": repos }))
}

/// `GET /api/v1/repos/{owner}/{name}/stats`.
pub async fn repo_stats(
    State(state): State<ApiState>,
    Path((owner, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let repo = RepoId::new(owner, name);
    match ContextBuilder::new(&state.store).repository_stats(&repo) {
        Some(stats) => (StatusCode::OK, Json(json!(stats))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("repository '{repo}' not found") })),
        ),
    }
}

/// `DELETE /api/v1/repos/{owner}/{name}`: cascade delete.
pub async fn delete_repo(
    State(state): State<ApiState>,
    Path((owner, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let repo = RepoId::new(owner, name);
    let writer = GraphWriter::new(&state.store);
    match writer.delete_repository(&repo).and_then(|deleted| {
        if deleted {
            writer.commit()?;
        }
        Ok(deleted)
    }) {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({ "status": "deleted", "repo": repo.as_key() })),
        ),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("repository '{repo}' not found") })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

/// `GET /api/v1/debug/graph-stats`: node/edge counts across the store.
pub async fn graph_stats(State(state): State<ApiState>) -> impl IntoResponse {
    Json(json!(state.store.graph().stats()))
}
