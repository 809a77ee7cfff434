//! PR-review context assembly over a realistic fixture.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use repograph::config::{LimitsConfig, Settings};
use repograph::graph::{ContextBuilder, GraphStore};
use repograph::ingest::IngestionPipeline;
use repograph::types::{Hunk, RepoId};
use tempfile::TempDir;

fn ingest_fixture(limits: LimitsConfig, write: impl Fn(&Path)) -> Arc<GraphStore> {
    let dir = TempDir::new().unwrap();
    write(dir.path());
    let store = Arc::new(GraphStore::in_memory(limits.clone()).unwrap());
    let settings = Settings {
        limits,
        ..Settings::default()
    };
    let pipeline = IngestionPipeline::new(store.clone(), Arc::new(settings));
    pipeline
        .ingest_local(&RepoId::new("acme", "widgets"), dir.path(), false)
        .unwrap();
    store
}

fn class_fixture(root: &Path) {
    fs::write(
        root.join("util.py"),
        "def normalize(value):\n    return value.strip()\n",
    )
    .unwrap();
    fs::write(
        root.join("m.py"),
        concat!(
            "from util import normalize\n",
            "\n",
            "class Base:\n",
            "    pass\n",
            "\n",
            "class Foo(Base):\n",
            "    \"\"\"Holds state.\"\"\"\n",
            "    def __init__(self, raw):\n",
            "        self.value = normalize(raw)\n",
            "\n",
            "    def render(self):\n",
            "        return self.value\n",
        ),
    )
    .unwrap();
    fs::write(
        root.join("caller.py"),
        concat!(
            "from m import Foo\n",
            "\n",
            "def build():\n",
            "    return Foo('x')\n",
            "\n",
            "def show():\n",
            "    f = Foo('x')\n",
            "    return f.render()\n",
        ),
    )
    .unwrap();
}

/// Scenario: a hunk over `class Foo` pulls in methods, callers of the
/// class and its methods, the constructor's callees, imports with source,
/// and the hierarchy.
#[test]
fn class_change_assembles_full_context() {
    let store = ingest_fixture(LimitsConfig::default(), class_fixture);
    let repo = RepoId::new("acme", "widgets");

    let context = ContextBuilder::new(&store).build_diff_context(
        &repo,
        &[Hunk {
            file_path: "m.py".to_string(),
            start_line: 6,
            end_line: 12,
        }],
    );

    // Foo is affected, with every method body attached.
    let foo = context
        .affected_symbols
        .iter()
        .find(|s| s.name == "Foo")
        .expect("Foo affected");
    assert_eq!(foo.kind, "class");
    assert_eq!(foo.docstring.as_deref(), Some("Holds state."));
    let method_names: Vec<_> = foo.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(method_names, vec!["__init__", "render"]);
    assert!(foo.methods[1].source.contains("return self.value"));

    // Callers: build() constructs Foo, show() calls render.
    let foo_callers = context
        .callers
        .iter()
        .find(|c| c.symbol == "Foo")
        .expect("callers of Foo");
    let caller_names: Vec<_> = foo_callers.callers.iter().map(|c| c.name.as_str()).collect();
    assert!(caller_names.contains(&"build"));
    assert!(caller_names.contains(&"show"));

    // Dependencies: __init__ calls normalize.
    let foo_deps = context
        .dependencies
        .iter()
        .find(|d| d.symbol == "Foo")
        .expect("dependencies of Foo");
    assert!(foo_deps.dependencies.iter().any(|d| d.name == "normalize"));

    // Imports of the changed file carry the imported symbol's source.
    let normalize = context
        .imports
        .iter()
        .find(|i| i.name == "normalize")
        .expect("imported normalize");
    assert!(normalize.source.contains("def normalize"));
    assert_eq!(normalize.path, "util.py");

    // Hierarchy: Base is a depth-1 parent.
    let hierarchy = context
        .class_hierarchy
        .iter()
        .find(|h| h.class == "Foo")
        .expect("hierarchy of Foo");
    assert_eq!(hierarchy.parents.len(), 1);
    assert_eq!(hierarchy.parents[0].name, "Base");
    assert_eq!(hierarchy.parents[0].depth, 1);
}

/// An empty diff returns empty sections, never an error.
#[test]
fn empty_diff_returns_empty_context() {
    let store = ingest_fixture(LimitsConfig::default(), class_fixture);
    let context =
        ContextBuilder::new(&store).build_diff_context(&RepoId::new("acme", "widgets"), &[]);
    assert!(context.affected_symbols.is_empty());
    assert!(context.callers.is_empty());
    assert!(context.dependencies.is_empty());
    assert!(context.imports.is_empty());
    assert!(context.class_hierarchy.is_empty());
    assert_eq!(context.total_affected, 0);
    assert_eq!(context.total_files, 0);
}

/// Hunks in an unknown repository behave like an empty graph.
#[test]
fn unknown_repo_yields_empty_context() {
    let store = ingest_fixture(LimitsConfig::default(), class_fixture);
    let context = ContextBuilder::new(&store).build_diff_context(
        &RepoId::new("ghost", "repo"),
        &[Hunk {
            file_path: "m.py".to_string(),
            start_line: 1,
            end_line: 10,
        }],
    );
    assert_eq!(context.total_affected, 0);
}

/// Per-symbol source is capped with an explicit marker.
#[test]
fn primary_source_is_truncated_at_cap() {
    let mut limits = LimitsConfig::default();
    limits.primary_source_cap = 80;

    let store = ingest_fixture(limits, |root| {
        let body: String = (0..40)
            .map(|i| format!("    value_{i} = {i}\n"))
            .collect();
        fs::write(root.join("big.py"), format!("def huge():\n{body}")).unwrap();
    });

    let context = ContextBuilder::new(&store).build_diff_context(
        &RepoId::new("acme", "widgets"),
        &[Hunk {
            file_path: "big.py".to_string(),
            start_line: 1,
            end_line: 5,
        }],
    );
    let huge = &context.affected_symbols[0];
    assert!(huge.truncated);
    assert!(huge.source.ends_with("… (truncated)"));
    assert!(huge.source.len() < 120);
}

/// Symbols outside every hunk stay out of the context.
#[test]
fn only_overlapping_symbols_are_affected() {
    let store = ingest_fixture(LimitsConfig::default(), |root| {
        fs::write(
            root.join("two.py"),
            "def first():\n    pass\n\n\ndef second():\n    pass\n",
        )
        .unwrap();
    });

    let context = ContextBuilder::new(&store).build_diff_context(
        &RepoId::new("acme", "widgets"),
        &[Hunk {
            file_path: "two.py".to_string(),
            start_line: 5,
            end_line: 6,
        }],
    );
    let names: Vec<_> = context
        .affected_symbols
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(names, vec!["second"]);
}

/// Impact analysis walks transitive callers, bounded by depth.
#[test]
fn impact_walks_transitive_callers() {
    let store = ingest_fixture(LimitsConfig::default(), |root| {
        fs::write(
            root.join("chain.py"),
            concat!(
                "def level0():\n    pass\n\n",
                "def level1():\n    level0()\n\n",
                "def level2():\n    level1()\n\n",
                "def level3():\n    level2()\n\n",
                "def level4():\n    level3()\n",
            ),
        )
        .unwrap();
    });

    let impacted = ContextBuilder::new(&store).impact_of(
        &RepoId::new("acme", "widgets"),
        "level0",
        None,
    );
    let names: Vec<_> = impacted.iter().map(|i| i.name.as_str()).collect();
    // Depth 3 reaches level1..level3 but not level4.
    assert!(names.contains(&"level1"));
    assert!(names.contains(&"level3"));
    assert!(!names.contains(&"level4"));
    assert_eq!(
        impacted.iter().find(|i| i.name == "level3").unwrap().distance,
        3
    );
}
