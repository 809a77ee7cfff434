//! GitHub webhook acceptance.
//!
//! Contract: pushes are accepted only when both SHAs are real (no branch
//! create/delete); `pull_request` only when closed and merged;
//! `issue_comment` only when created on a pull request with the trigger
//! mention. Everything else answers `ignored` with the reason.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Json, response::IntoResponse};
use serde_json::{Value, json};

use crate::api::ApiState;
use crate::github::diff::parse_unified_diff;
use crate::graph::ContextBuilder;
use crate::jobs::{IncrementalPRPayload, IncrementalPushPayload, new_job_id};
use crate::queue::TaskKind;
use crate::types::RepoId;

const ZERO_SHA: &str = "0000000000000000000000000000000000000000";
/// Mention that triggers review-context assembly on a PR comment.
const REVIEW_TRIGGER: &str = "@repograph";

fn ignored(reason: &str) -> Json<Value> {
    Json(json!({ "status": "ignored", "reason": reason }))
}

fn event_type(headers: &HeaderMap) -> String {
    headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Push webhook → incremental-push task.
pub async fn on_push(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    let event = event_type(&headers);
    if event != "push" {
        return ignored(&format!("event is '{event}', not 'push'"));
    }

    let repo_info = &payload["repository"];
    let owner = repo_info["owner"]["login"]
        .as_str()
        .or_else(|| repo_info["owner"]["name"].as_str())
        .unwrap_or_default()
        .to_string();
    let repo_name = repo_info["name"].as_str().unwrap_or_default().to_string();
    let git_ref = payload["ref"].as_str().unwrap_or_default().to_string();
    let before_sha = payload["before"].as_str().unwrap_or_default().to_string();
    let after_sha = payload["after"].as_str().unwrap_or_default().to_string();

    if owner.is_empty() || repo_name.is_empty() {
        return ignored("payload carries no repository identity");
    }
    if after_sha == ZERO_SHA {
        return ignored("branch deletion");
    }
    if before_sha == ZERO_SHA {
        return ignored("new branch creation - use full ingestion");
    }

    let job_id = new_job_id("inc-push");
    let task = IncrementalPushPayload {
        job_id: job_id.clone(),
        owner: owner.clone(),
        repo_name: repo_name.clone(),
        before_sha: before_sha.clone(),
        after_sha: after_sha.clone(),
    };
    if let Ok(payload) = serde_json::to_value(&task) {
        if let Err(e) = state.queue.enqueue(TaskKind::IncrementalPush, payload).await {
            tracing::error!("[webhook] push dispatch failed: {e}");
        }
    }

    Json(json!({
        "status": "processing",
        "job_id": job_id,
        "repo": format!("{owner}/{repo_name}"),
        "ref": git_ref,
        "commits": format!(
            "{}..{}",
            before_sha.get(..7).unwrap_or(&before_sha),
            after_sha.get(..7).unwrap_or(&after_sha)
        ),
    }))
}

/// PR-merge and PR-comment webhook.
pub async fn on_event(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    match event_type(&headers).as_str() {
        "push" => ignored("use /api/v1/webhook/push for push events"),
        "pull_request" => on_pull_request(state, payload).await,
        "issue_comment" => on_issue_comment(state, payload).await,
        other => ignored(&format!(
            "event is '{other}', not 'pull_request' or 'issue_comment'"
        )),
    }
}

async fn on_pull_request(state: ApiState, payload: Value) -> Json<Value> {
    let action = payload["action"].as_str().unwrap_or_default();
    if action != "closed" {
        return ignored(&format!("action is '{action}', not 'closed'"));
    }
    let pr = &payload["pull_request"];
    if !pr["merged"].as_bool().unwrap_or(false) {
        return ignored("PR was closed but not merged");
    }

    let owner = payload["repository"]["owner"]["login"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let repo_name = payload["repository"]["name"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let Some(pr_number) = pr["number"].as_u64() else {
        return ignored("pull request has no number");
    };
    if owner.is_empty() || repo_name.is_empty() {
        return ignored("payload carries no repository identity");
    }

    let job_id = new_job_id("inc-pr");
    let task = IncrementalPRPayload {
        job_id: job_id.clone(),
        owner: owner.clone(),
        repo_name: repo_name.clone(),
        pr_number,
    };
    if let Ok(payload) = serde_json::to_value(&task) {
        if let Err(e) = state.queue.enqueue(TaskKind::IncrementalPr, payload).await {
            tracing::error!("[webhook] pr-merge dispatch failed: {e}");
        }
    }

    Json(json!({
        "status": "processing",
        "job_id": job_id,
        "pr": format!("{owner}/{repo_name}#{pr_number}"),
        "action": "graph_update",
    }))
}

async fn on_issue_comment(state: ApiState, payload: Value) -> Json<Value> {
    if payload["action"].as_str() != Some("created") {
        return ignored("comment action is not 'created'");
    }
    let issue = &payload["issue"];
    if issue.get("pull_request").is_none() {
        return ignored("comment is not on a pull request");
    }
    let body = payload["comment"]["body"].as_str().unwrap_or_default();
    if !body.to_lowercase().contains(REVIEW_TRIGGER) {
        return ignored("no review trigger mention");
    }

    let owner = payload["repository"]["owner"]["login"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let repo_name = payload["repository"]["name"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let Some(pr_number) = issue["number"].as_u64() else {
        return ignored("comment target has no number");
    };
    let repo = RepoId::new(owner, repo_name);

    let Some(host) = state.host.clone() else {
        return ignored("repository host not configured");
    };
    let store = state.store.clone();
    let repo_for_task = repo.clone();
    tokio::spawn(async move {
        match host.get_pr_diff(&repo_for_task, pr_number).await {
            Ok(diff) => {
                let hunks = parse_unified_diff(&diff);
                let context =
                    ContextBuilder::new(&store).build_diff_context(&repo_for_task, &hunks);
                // Hand-off point for the review pipeline: the context is
                // assembled; rendering and commenting live downstream.
                crate::log_event!(
                    "review",
                    "context assembled",
                    "{repo_for_task}#{pr_number}: {} symbols, {} caller sets, {} imports",
                    context.total_affected,
                    context.callers.len(),
                    context.imports.len()
                );
            }
            Err(e) => {
                tracing::error!("[review] {repo_for_task}#{pr_number}: diff fetch failed: {e}");
            }
        }
    });

    Json(json!({
        "status": "processing",
        "pr": format!("{repo}#{pr_number}"),
        "action": "review",
    }))
}
