//! Incremental maintenance equals a clean rebuild.
//!
//! The canonical-form helper flattens the graph into sorted node and edge
//! descriptors so two stores can be compared structurally, independent of
//! internal id assignment.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use repograph::config::{LimitsConfig, Settings};
use repograph::graph::{GraphStore, Node};
use repograph::ingest::{IncrementalUpdater, IngestionPipeline};
use repograph::types::{ChangeRecord, ChangeStatus, RepoId};
use tempfile::TempDir;

fn setup() -> (Arc<GraphStore>, IngestionPipeline, IncrementalUpdater) {
    let store = Arc::new(GraphStore::in_memory(LimitsConfig::default()).unwrap());
    let settings = Arc::new(Settings::default());
    (
        store.clone(),
        IngestionPipeline::new(store.clone(), settings.clone()),
        IncrementalUpdater::new(store, settings),
    )
}

/// Flatten a store into comparable descriptors. Node ids are internal, so
/// nodes are described by their identity tuples and edges by endpoint
/// tuples.
fn canonical_form(store: &GraphStore, repo: &str) -> BTreeSet<String> {
    let graph = store.graph();
    let describe = |id| match graph.node(id) {
        Some(Node::Repository(r)) => format!("repo:{}", r.repo),
        Some(Node::Directory(d)) => format!("dir:{}:{}", d.repo, d.path),
        Some(Node::File(f)) => format!(
            "file:{}:{}:{}:{}",
            f.repo,
            f.path,
            f.lines_count,
            f.source_code.as_deref().map(str::len).unwrap_or(0)
        ),
        Some(Node::Symbol(s)) => format!(
            "sym:{}:{}:{}:{}:{}",
            s.kind.as_str(),
            s.repo,
            s.path,
            s.name,
            s.line_number
        ),
        Some(Node::Module(m)) => format!("module:{}", m.name),
        Some(Node::Parameter(p)) => {
            format!("param:{}:{}:{}:{}", p.repo, p.path, p.name, p.function_line)
        }
        Some(Node::Unresolved(u)) => format!("unresolved:{}:{}", u.repo, u.name),
        None => "missing".to_string(),
    };

    let mut entries = BTreeSet::new();
    let mut ids = Vec::new();
    ids.extend(graph.files_in_repo(repo));
    ids.extend(graph.symbols_in_repo(repo));
    if let Some(repo_id) = graph.repository(repo) {
        ids.push(repo_id);
        ids.extend(graph.contains_descendants(repo_id));
    }

    for id in ids {
        entries.insert(describe(id));
        for edge in graph.out_edges(id) {
            entries.insert(format!(
                "edge:{:?}:{}->{}@{:?}",
                edge.kind,
                describe(id),
                describe(edge.to),
                edge.props.line_number
            ));
        }
    }
    entries
}

fn seed_tree(root: &Path) {
    fs::write(root.join("a.py"), "def foo():\n    return 1\n").unwrap();
    fs::write(
        root.join("b.py"),
        "from a import foo\n\ndef bar():\n    foo()\n",
    )
    .unwrap();
}

/// Adding a file incrementally produces the same graph as a clean ingest
/// of the final tree.
#[test]
fn incremental_add_equals_clean_rebuild() {
    let dir = TempDir::new().unwrap();
    seed_tree(dir.path());

    let (incremental_store, pipeline, updater) = setup();
    let repo = RepoId::new("acme", "widgets");
    pipeline.ingest_local(&repo, dir.path(), false).unwrap();

    fs::write(
        dir.path().join("c.py"),
        "from b import bar\n\ndef baz():\n    bar()\n",
    )
    .unwrap();
    updater
        .apply(
            &repo,
            dir.path(),
            &[ChangeRecord::new("c.py", ChangeStatus::Added)],
        )
        .unwrap();

    let (clean_store, clean_pipeline, _) = setup();
    clean_pipeline.ingest_local(&repo, dir.path(), false).unwrap();

    assert_eq!(
        canonical_form(&incremental_store, "acme/widgets"),
        canonical_form(&clean_store, "acme/widgets")
    );
}

/// Removing a file incrementally matches the clean rebuild.
#[test]
fn incremental_delete_equals_clean_rebuild() {
    let dir = TempDir::new().unwrap();
    seed_tree(dir.path());
    fs::write(
        dir.path().join("c.py"),
        "from b import bar\n\ndef baz():\n    bar()\n",
    )
    .unwrap();

    let (incremental_store, pipeline, updater) = setup();
    let repo = RepoId::new("acme", "widgets");
    pipeline.ingest_local(&repo, dir.path(), false).unwrap();

    fs::remove_file(dir.path().join("b.py")).unwrap();
    updater
        .apply(
            &repo,
            dir.path(),
            &[ChangeRecord::new("b.py", ChangeStatus::Removed)],
        )
        .unwrap();

    let (clean_store, clean_pipeline, _) = setup();
    clean_pipeline.ingest_local(&repo, dir.path(), false).unwrap();

    assert_eq!(
        canonical_form(&incremental_store, "acme/widgets"),
        canonical_form(&clean_store, "acme/widgets")
    );
}

/// Modifying a file (moving and changing symbols) matches the clean
/// rebuild.
#[test]
fn incremental_modify_equals_clean_rebuild() {
    let dir = TempDir::new().unwrap();
    seed_tree(dir.path());

    let (incremental_store, pipeline, updater) = setup();
    let repo = RepoId::new("acme", "widgets");
    pipeline.ingest_local(&repo, dir.path(), false).unwrap();

    fs::write(
        dir.path().join("a.py"),
        "def helper():\n    return 0\n\n\ndef foo():\n    return helper()\n",
    )
    .unwrap();
    updater
        .apply(
            &repo,
            dir.path(),
            &[ChangeRecord::new("a.py", ChangeStatus::Modified)],
        )
        .unwrap();

    let (clean_store, clean_pipeline, _) = setup();
    clean_pipeline.ingest_local(&repo, dir.path(), false).unwrap();

    assert_eq!(
        canonical_form(&incremental_store, "acme/widgets"),
        canonical_form(&clean_store, "acme/widgets")
    );
}

/// Directories emptied by an incremental delete are pruned.
#[test]
fn emptied_directories_are_pruned_incrementally() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("pkg/inner")).unwrap();
    fs::write(dir.path().join("root.py"), "def keep():\n    pass\n").unwrap();
    fs::write(
        dir.path().join("pkg/inner/only.py"),
        "def gone():\n    pass\n",
    )
    .unwrap();

    let (store, pipeline, updater) = setup();
    let repo = RepoId::new("acme", "widgets");
    pipeline.ingest_local(&repo, dir.path(), false).unwrap();
    assert!(store.graph().directory("acme/widgets", "pkg/inner").is_some());

    fs::remove_file(dir.path().join("pkg/inner/only.py")).unwrap();
    updater
        .apply(
            &repo,
            dir.path(),
            &[ChangeRecord::new("pkg/inner/only.py", ChangeStatus::Removed)],
        )
        .unwrap();

    let graph = store.graph();
    assert!(graph.directory("acme/widgets", "pkg/inner").is_none());
    assert!(graph.directory("acme/widgets", "pkg").is_none());
    assert!(graph.file("acme/widgets", "root.py").is_some());
}
