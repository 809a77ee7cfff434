//! API surface: webhook acceptance contract, duplicate-job guard, and the
//! synchronous query endpoints, driven through the router with stub
//! collaborators.

use std::fs;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use repograph::api::{self, ApiState};
use repograph::config::{LimitsConfig, Settings};
use repograph::error::QueueError;
use repograph::graph::GraphStore;
use repograph::ingest::IngestionPipeline;
use repograph::jobs::{FileJobTracker, JobTracker};
use repograph::queue::{TaskKind, TaskQueue};
use repograph::types::RepoId;
use tempfile::TempDir;
use tower::ServiceExt;

/// Records enqueued tasks instead of delivering them.
#[derive(Default)]
struct RecordingQueue {
    tasks: Mutex<Vec<(TaskKind, serde_json::Value)>>,
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    async fn enqueue(
        &self,
        kind: TaskKind,
        payload: serde_json::Value,
    ) -> Result<String, QueueError> {
        let handle = payload
            .get("job_id")
            .and_then(|v| v.as_str())
            .unwrap_or("task")
            .to_string();
        self.tasks.lock().unwrap().push((kind, payload));
        Ok(handle)
    }
}

struct Harness {
    router: Router,
    queue: Arc<RecordingQueue>,
    _jobs_dir: TempDir,
}

fn harness() -> Harness {
    let fixture = TempDir::new().unwrap();
    fs::write(fixture.path().join("a.py"), "def foo():\n    return 1\n").unwrap();
    fs::write(
        fixture.path().join("b.py"),
        "from a import foo\n\ndef bar():\n    foo()\n",
    )
    .unwrap();

    let store = Arc::new(GraphStore::in_memory(LimitsConfig::default()).unwrap());
    let settings = Arc::new(Settings::default());
    IngestionPipeline::new(store.clone(), settings.clone())
        .ingest_local(&RepoId::new("acme", "widgets"), fixture.path(), false)
        .unwrap();

    let jobs_dir = TempDir::new().unwrap();
    let tracker: Arc<dyn JobTracker> =
        Arc::new(FileJobTracker::new(jobs_dir.path().to_path_buf()).unwrap());
    let queue = Arc::new(RecordingQueue::default());

    let router = api::router(ApiState {
        settings,
        store,
        tracker,
        queue: queue.clone(),
        host: None,
    });
    Harness {
        router,
        queue,
        _jobs_dir: jobs_dir,
    }
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

fn post_json(path: &str, event: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(event) = event {
        builder = builder.header("X-GitHub-Event", event);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn push_webhook_dispatches_incremental_task() {
    let h = harness();
    let payload = serde_json::json!({
        "repository": { "name": "widgets", "owner": { "login": "acme" } },
        "ref": "refs/heads/main",
        "before": "a1b2c3d4e5f60718293a4b5c6d7e8f9012345678",
        "after":  "b2c3d4e5f60718293a4b5c6d7e8f901234567890",
    });
    let (status, body) = send(
        h.router.clone(),
        post_json("/api/v1/webhook/push", Some("push"), payload),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "processing");
    assert!(body["job_id"].as_str().unwrap().starts_with("inc-push-"));

    let tasks = h.queue.tasks.lock().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].0, TaskKind::IncrementalPush);
    assert_eq!(tasks[0].1["owner"], "acme");
}

#[tokio::test]
async fn push_webhook_rejects_branch_lifecycle_events() {
    let h = harness();
    let zero = "0".repeat(40);

    for (before, after, expected) in [
        (zero.clone(), "b".repeat(40), "new branch creation"),
        ("a".repeat(40), zero.clone(), "branch deletion"),
    ] {
        let payload = serde_json::json!({
            "repository": { "name": "widgets", "owner": { "login": "acme" } },
            "ref": "refs/heads/f",
            "before": before,
            "after": after,
        });
        let (status, body) = send(
            h.router.clone(),
            post_json("/api/v1/webhook/push", Some("push"), payload),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ignored");
        assert!(body["reason"].as_str().unwrap().contains(expected));
    }
    assert!(h.queue.tasks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn merged_pr_dispatches_and_unmerged_is_ignored() {
    let h = harness();
    let base = serde_json::json!({
        "action": "closed",
        "repository": { "name": "widgets", "owner": { "login": "acme" } },
    });

    let mut merged = base.clone();
    merged["pull_request"] = serde_json::json!({ "number": 7, "merged": true });
    let (_, body) = send(
        h.router.clone(),
        post_json("/api/v1/webhook/events", Some("pull_request"), merged),
    )
    .await;
    assert_eq!(body["status"], "processing");
    assert_eq!(body["action"], "graph_update");

    let mut unmerged = base;
    unmerged["pull_request"] = serde_json::json!({ "number": 8, "merged": false });
    let (_, body) = send(
        h.router.clone(),
        post_json("/api/v1/webhook/events", Some("pull_request"), unmerged),
    )
    .await;
    assert_eq!(body["status"], "ignored");

    assert_eq!(h.queue.tasks.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_ingest_returns_existing_job() {
    let h = harness();
    let body = serde_json::json!({ "owner": "acme", "repo_name": "widgets" });

    let (status, first) = send(
        h.router.clone(),
        post_json("/api/v1/ingest/github", None, body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let first_id = first["job_id"].as_str().unwrap().to_string();

    let (status, second) = send(
        h.router.clone(),
        post_json("/api/v1/ingest/github", None, body),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["status"], "already_running");
    assert_eq!(second["job_id"], first_id.as_str());
}

#[tokio::test]
async fn ingest_rejects_empty_identity() {
    let h = harness();
    let (status, _) = send(
        h.router.clone(),
        post_json(
            "/api/v1/ingest/github",
            None,
            serde_json::json!({ "owner": "", "repo_name": "widgets" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn diff_context_endpoint_returns_symbols() {
    let h = harness();
    let (status, body) = send(
        h.router.clone(),
        post_json(
            "/api/v1/query/diff-context",
            None,
            serde_json::json!({
                "repo": "acme/widgets",
                "changes": [{ "file_path": "b.py", "start_line": 3, "end_line": 4 }],
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_affected"], 1);
    assert_eq!(body["affected_symbols"][0]["name"], "bar");
}

#[tokio::test]
async fn callers_endpoint_reports_call_site() {
    let h = harness();
    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/query/callers?repo=acme/widgets&name=foo")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(h.router.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["callers"][0]["name"], "bar");
    assert_eq!(body["callers"][0]["call_line"], 4);
}

#[tokio::test]
async fn repo_listing_and_delete() {
    let h = harness();

    let request = Request::builder()
        .uri("/api/v1/repos")
        .body(Body::empty())
        .unwrap();
    let (_, body) = send(h.router.clone(), request).await;
    assert_eq!(body["repositories"][0]["repo"], "acme/widgets");
    assert_eq!(body["repositories"][0]["file_count"], 2);

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/v1/repos/acme/widgets")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(h.router.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "deleted");

    let request = Request::builder()
        .uri("/api/v1/repos/acme/widgets/stats")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(h.router.clone(), request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_endpoint_covers_symbols_and_files() {
    let h = harness();

    let request = Request::builder()
        .uri("/api/v1/query/search?q=foo&repo=acme/widgets")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(h.router.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        body["results"]
            .as_array()
            .unwrap()
            .iter()
            .any(|hit| hit["name"] == "foo")
    );

    let request = Request::builder()
        .uri("/api/v1/query/search?q=foo&scope=files")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(h.router.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    // Both files mention `foo` in their text.
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn health_endpoint() {
    let h = harness();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(h.router.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}
