//! End-to-end ingestion: fresh ingest, idempotent rerun, source-size
//! boundary, inheritance cycles.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use repograph::config::{LimitsConfig, Settings};
use repograph::graph::{EdgeKind, GraphStore, Node};
use repograph::ingest::IngestionPipeline;
use repograph::types::RepoId;
use tempfile::TempDir;

fn pipeline_with_limits(limits: LimitsConfig) -> (Arc<GraphStore>, IngestionPipeline) {
    let store = Arc::new(GraphStore::in_memory(limits.clone()).unwrap());
    let settings = Settings {
        limits,
        ..Settings::default()
    };
    let pipeline = IngestionPipeline::new(store.clone(), Arc::new(settings));
    (store, pipeline)
}

fn pipeline() -> (Arc<GraphStore>, IngestionPipeline) {
    pipeline_with_limits(LimitsConfig::default())
}

fn seed_small_repo(root: &Path) {
    fs::write(root.join("a.py"), "def foo():\n    return 1\n").unwrap();
    fs::write(
        root.join("b.py"),
        "from a import foo\n\ndef bar():\n    foo()\n",
    )
    .unwrap();
}

#[test]
fn fresh_ingest_of_small_repo() {
    let dir = TempDir::new().unwrap();
    seed_small_repo(dir.path());
    let (store, pipeline) = pipeline();
    let repo = RepoId::new("acme", "widgets");

    let stats = pipeline.ingest_local(&repo, dir.path(), false).unwrap();
    assert_eq!(stats.files_processed, 2);
    assert!(stats.errors.is_empty());

    let graph = store.graph();

    // File(a.py) CONTAINS Function(foo, line=1)
    let a = graph.file("acme/widgets", "a.py").unwrap();
    let foo = graph.symbols_named("acme/widgets", "foo")[0];
    assert!(graph
        .out_edges(a)
        .iter()
        .any(|e| e.kind == EdgeKind::Contains && e.to == foo));
    let foo_node = graph.node(foo).unwrap().as_symbol().unwrap();
    assert_eq!(foo_node.line_number, 1);

    // File(b.py) CONTAINS Function(bar, line=3)
    let bar = graph.symbols_named("acme/widgets", "bar")[0];
    let bar_node = graph.node(bar).unwrap().as_symbol().unwrap();
    assert_eq!(bar_node.line_number, 3);

    // File(b.py) IMPORTS File(a.py) with imported_name="foo"
    let b = graph.file("acme/widgets", "b.py").unwrap();
    let import = graph
        .out_edges(b)
        .into_iter()
        .find(|e| e.kind == EdgeKind::Imports)
        .expect("import edge");
    assert_eq!(import.to, a);
    assert_eq!(import.props.imported_name.as_deref(), Some("foo"));

    // Function(bar) CALLS Function(foo) at line 4, resolved
    let call = graph
        .out_edges(bar)
        .into_iter()
        .find(|e| e.kind == EdgeKind::Calls)
        .expect("call edge");
    assert_eq!(call.to, foo);
    assert_eq!(call.props.line_number, Some(4));
    assert_eq!(call.props.is_resolved, Some(true));
}

/// Running the same ingest twice yields identical node and edge counts.
#[test]
fn reingest_is_idempotent() {
    let dir = TempDir::new().unwrap();
    seed_small_repo(dir.path());
    let (store, pipeline) = pipeline();
    let repo = RepoId::new("acme", "widgets");

    pipeline.ingest_local(&repo, dir.path(), false).unwrap();
    let first = store.graph().stats();
    pipeline.ingest_local(&repo, dir.path(), false).unwrap();
    let second = store.graph().stats();

    assert_eq!(first.files, second.files);
    assert_eq!(first.symbols, second.symbols);
    assert_eq!(first.directories, second.directories);
    assert_eq!(first.edges, second.edges);
    assert_eq!(first.unresolved, second.unresolved);
}

/// At the cap the text is stored; one byte over, structure only.
#[test]
fn source_size_boundary() {
    let mut limits = LimitsConfig::default();
    limits.max_file_source_bytes = 120;

    // Pad to exactly 120 bytes with a trailing comment line.
    let base = "def foo():\n    return 1\n# ";
    let mut at_cap = base.to_string();
    at_cap.push_str(&"x".repeat(120 - base.len() - 1));
    at_cap.push('\n');
    assert_eq!(at_cap.len(), 120);
    let over_cap = format!("{at_cap}#");

    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("exact.py"), &at_cap).unwrap();
    fs::write(dir.path().join("over.py"), &over_cap).unwrap();

    let (store, pipeline) = pipeline_with_limits(limits);
    let repo = RepoId::new("acme", "widgets");
    pipeline.ingest_local(&repo, dir.path(), false).unwrap();

    let graph = store.graph();
    let exact = graph.file("acme/widgets", "exact.py").unwrap();
    let exact_node = graph.node(exact).unwrap().as_file().unwrap();
    assert_eq!(exact_node.source_code.as_deref(), Some(at_cap.as_str()));

    let over = graph.file("acme/widgets", "over.py").unwrap();
    let over_node = graph.node(over).unwrap().as_file().unwrap();
    assert!(over_node.source_code.is_none());
    // Structural nodes still exist for the oversized file.
    assert!(!graph.symbols_in_file("acme/widgets", "over.py").is_empty());
}

/// Stored text always has lines_count - 1 newlines.
#[test]
fn line_count_matches_stored_source() {
    let dir = TempDir::new().unwrap();
    seed_small_repo(dir.path());
    let (store, pipeline) = pipeline();
    let repo = RepoId::new("acme", "widgets");
    pipeline.ingest_local(&repo, dir.path(), false).unwrap();

    let graph = store.graph();
    for file_id in graph.files_in_repo("acme/widgets") {
        let file = graph.node(file_id).unwrap().as_file().unwrap();
        if let Some(source) = &file.source_code {
            assert_eq!(
                source.matches('\n').count(),
                file.lines_count as usize - 1,
                "line count mismatch in {}",
                file.path
            );
        }
    }
}

/// An inheritance cycle is stored as written and never hangs traversal.
#[test]
fn inheritance_cycle_is_stored_and_bounded() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("m.py"),
        "class A(B):\n    pass\n\nclass B(A):\n    pass\n",
    )
    .unwrap();
    let (store, pipeline) = pipeline();
    let repo = RepoId::new("acme", "widgets");
    pipeline.ingest_local(&repo, dir.path(), false).unwrap();

    let graph = store.graph();
    let a = graph.symbols_named("acme/widgets", "A")[0];
    let b = graph.symbols_named("acme/widgets", "B")[0];
    assert!(graph
        .out_edges(a)
        .iter()
        .any(|e| e.kind == EdgeKind::Inherits && e.to == b));
    assert!(graph
        .out_edges(b)
        .iter()
        .any(|e| e.kind == EdgeKind::Inherits && e.to == a));
    drop(graph);

    // Hierarchy traversal over the cycle terminates.
    let context = repograph::graph::ContextBuilder::new(&store).build_diff_context(
        &repo,
        &[repograph::types::Hunk {
            file_path: "m.py".to_string(),
            start_line: 1,
            end_line: 2,
        }],
    );
    assert_eq!(context.class_hierarchy.len(), 1);
    assert!(context.class_hierarchy[0].parents.len() <= 2);
}

/// Deleting a repository leaves nothing behind, across every label.
#[test]
fn delete_repository_removes_everything() {
    let dir = TempDir::new().unwrap();
    seed_small_repo(dir.path());
    fs::create_dir_all(dir.path().join("pkg")).unwrap();
    fs::write(dir.path().join("pkg/deep.py"), "import requests\n\nLIMIT = 2\n").unwrap();

    let (store, pipeline) = pipeline();
    let repo = RepoId::new("acme", "widgets");
    pipeline.ingest_local(&repo, dir.path(), false).unwrap();
    assert!(store.graph().nodes_in_repo("acme/widgets") > 0);

    let writer = repograph::graph::GraphWriter::new(&store);
    assert!(writer.delete_repository(&repo).unwrap());
    assert_eq!(store.graph().nodes_in_repo("acme/widgets"), 0);

    // Re-ingesting after deletion starts clean.
    pipeline.ingest_local(&repo, dir.path(), false).unwrap();
    assert!(store.graph().file("acme/widgets", "a.py").is_some());
}

/// Methods land under their class and stay reachable from their file
/// over CONTAINS.
#[test]
fn every_symbol_is_reachable_from_its_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("m.py"),
        "class Greeter:\n    def hello(self):\n        return 'hi'\n\ndef free():\n    pass\n",
    )
    .unwrap();
    let (store, pipeline) = pipeline();
    let repo = RepoId::new("acme", "widgets");
    pipeline.ingest_local(&repo, dir.path(), false).unwrap();

    let graph = store.graph();
    let file_id = graph.file("acme/widgets", "m.py").unwrap();
    let reachable: std::collections::HashSet<_> =
        graph.contains_descendants(file_id).into_iter().collect();
    for symbol_id in graph.symbols_in_file("acme/widgets", "m.py") {
        assert!(
            reachable.contains(&symbol_id),
            "symbol not reachable from file: {:?}",
            graph.node(symbol_id).and_then(Node::as_symbol).map(|s| &s.name)
        );
    }
}
