//! Incremental graph maintenance (C2).
//!
//! Diff-driven partial rebuild in eight phases: classify, find dependents,
//! delete stale, rebuild the name map from the surviving graph, pre-scan
//! the new files, write them, relink their edges, then reconcile dependent
//! files so edges into the changed symbols are recreated. After phase 8
//! the outgoing CALLS/INHERITS of every changed-or-dependent file reflect
//! the post-change source; nothing else is touched.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::{IngestError, IngestResult};
use crate::graph::model::{EdgeKind, Node, SymbolKind};
use crate::graph::{GraphStore, GraphWriter};
use crate::github::RepositoryHost;
use crate::ingest::prescan::merge_records;
use crate::ingest::resolver::{resolve_calls, resolve_inheritance};
use crate::ingest::walker::relative_path;
use crate::parsing::{ExtractorSet, FileRecord, Language};
use crate::types::{ChangeRecord, ChangeStatus, ImportsMap, RepoId};

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(120);
pub const RESET_TIMEOUT: Duration = Duration::from_secs(60);
const REV_PARSE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IncrementalStats {
    pub files_added: usize,
    pub files_modified: usize,
    pub files_deleted: usize,
    pub files_renamed: usize,
    pub relationships_rebuilt: usize,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct IncrementalUpdater {
    store: Arc<GraphStore>,
    settings: Arc<Settings>,
}

impl IncrementalUpdater {
    pub fn new(store: Arc<GraphStore>, settings: Arc<Settings>) -> Self {
        Self { store, settings }
    }

    /// Bring the cached checkout to the remote head: `git fetch` plus
    /// `reset --hard origin/<default>`, falling back to a fresh shallow
    /// clone when the cached tree is missing or any git step fails.
    pub async fn sync_repository(
        &self,
        host: &dyn RepositoryHost,
        repo: &RepoId,
    ) -> IngestResult<PathBuf> {
        let path = self
            .settings
            .worker
            .scratch_root()
            .join(&repo.owner)
            .join(&repo.name);

        if path.join(".git").exists() {
            if self.git_sync(&path).await {
                crate::log_event!("sync", "updated", "{}", path.display());
                return Ok(path);
            }
            tracing::warn!("[sync] cached checkout unusable, recloning {repo}");
        }

        if path.exists() {
            std::fs::remove_dir_all(&path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        host.clone_repo(repo, None, &path)
            .await
            .map_err(|e| IngestError::SyncFailed {
                repo: repo.as_key(),
                reason: e.to_string(),
            })?;
        crate::log_event!("sync", "cloned", "{}", path.display());
        Ok(path)
    }

    async fn git_sync(&self, path: &Path) -> bool {
        if !run_git(path, &["fetch", "origin"], FETCH_TIMEOUT).await {
            return false;
        }
        let branch = git_stdout(
            path,
            &["rev-parse", "--abbrev-ref", "origin/HEAD"],
            REV_PARSE_TIMEOUT,
        )
        .await
        .map(|s| s.trim().trim_start_matches("origin/").to_string())
        .unwrap_or_else(|| "main".to_string());

        run_git(
            path,
            &["reset", "--hard", &format!("origin/{branch}")],
            RESET_TIMEOUT,
        )
        .await
    }

    /// Run the eight phases against a working tree already at the target
    /// state. CPU-bound; callers run it on a blocking task.
    pub fn apply(
        &self,
        repo: &RepoId,
        working_tree: &Path,
        changes: &[ChangeRecord],
    ) -> IngestResult<IncrementalStats> {
        let repo_key = repo.as_key();
        let writer = GraphWriter::new(&self.store);
        let mut stats = IncrementalStats::default();

        if self.store.graph().repository(&repo_key).is_none() {
            return Err(crate::error::GraphError::RepositoryNotFound { repo: repo_key }.into());
        }

        // Phase 1: classify. Renames expand into delete + add.
        let mut to_delete: Vec<String> = Vec::new();
        let mut to_upsert: Vec<String> = Vec::new();
        let mut affected: HashSet<String> = HashSet::new();

        for change in changes {
            if Language::from_path(Path::new(&change.filename)).is_none() {
                continue;
            }
            affected.insert(change.filename.clone());
            match change.status {
                ChangeStatus::Removed => {
                    to_delete.push(change.filename.clone());
                    stats.files_deleted += 1;
                }
                ChangeStatus::Added => {
                    to_upsert.push(change.filename.clone());
                    stats.files_added += 1;
                }
                ChangeStatus::Modified => {
                    to_delete.push(change.filename.clone());
                    to_upsert.push(change.filename.clone());
                    stats.files_modified += 1;
                }
                ChangeStatus::Renamed => {
                    if let Some(previous) = &change.previous_filename {
                        to_delete.push(previous.clone());
                        affected.insert(previous.clone());
                    }
                    to_upsert.push(change.filename.clone());
                    stats.files_renamed += 1;
                }
            }
        }
        crate::log_event!(
            "incremental",
            "classified",
            "{repo}: delete={} upsert={}",
            to_delete.len(),
            to_upsert.len()
        );

        // Phase 2: files depending on anything affected, found before the
        // deletes sever their edges.
        let dependents: HashSet<String> = {
            let graph = self.store.graph();
            affected
                .iter()
                .flat_map(|path| dependent_files(&graph, &repo_key, path))
                .collect()
        };
        crate::debug_event!("incremental", "dependents", "{}", dependents.len());

        // Phase 3: delete stale subgraphs (incoming edges die with them).
        for path in &to_delete {
            match writer.delete_file(repo, path) {
                Ok(_) => {}
                Err(e) => stats.errors.push(format!("delete {path}: {e}")),
            }
        }

        // Phase 4: name map from what survived in the graph.
        let mut imports_map = self.imports_map_from_graph(&repo_key);

        // Phase 5: parse new/modified files and merge their exports.
        let mut extractors = ExtractorSet::new(&self.settings.limits)
            .map_err(|e| crate::error::GraphError::Fatal(e.to_string()))?;
        let mut new_records: Vec<FileRecord> = Vec::new();
        for rel in &to_upsert {
            let abs = working_tree.join(rel);
            if !abs.exists() {
                stats.errors.push(format!("{rel}: not present in working tree"));
                continue;
            }
            let rel_normalized = relative_path(working_tree, &abs);
            match extractors.parse_file(&rel_normalized, &abs) {
                Ok(record) => new_records.push(record),
                Err(e) => stats.errors.push(format!("{rel}: {e}")),
            }
        }
        merge_records(&mut imports_map, new_records.iter());

        // Phase 6: write the new records.
        for record in &new_records {
            if let Err(e) = writer.upsert_file(repo, record, &imports_map) {
                stats.errors.push(format!("{}: {e}", record.path));
            }
        }

        // Phase 7: relink edges for the new records only.
        let inherit_edges: Vec<_> = new_records
            .iter()
            .flat_map(|r| resolve_inheritance(r, &imports_map))
            .collect();
        stats.relationships_rebuilt += writer.batch_upsert_inheritance(repo, &inherit_edges)?;

        let call_edges: Vec<_> = new_records
            .iter()
            .flat_map(|r| resolve_calls(r, &imports_map))
            .collect();
        stats.relationships_rebuilt += writer.batch_upsert_calls(repo, &call_edges)?;

        // Phase 8: reconcile dependents that were not themselves changed,
        // so their edges into the replaced symbols come back.
        let mut dependent_call_edges = Vec::new();
        for rel in dependents.iter().filter(|p| !affected.contains(*p)) {
            let abs = working_tree.join(rel);
            if !abs.exists() {
                continue;
            }
            match extractors.parse_file(rel, &abs) {
                Ok(record) => {
                    writer.refresh_imports(repo, &record, &imports_map)?;
                    dependent_call_edges.extend(resolve_calls(&record, &imports_map));
                }
                Err(e) => stats.errors.push(format!("{rel}: {e}")),
            }
        }
        stats.relationships_rebuilt += writer.batch_upsert_calls(repo, &dependent_call_edges)?;

        writer.commit()?;
        crate::log_event!(
            "incremental",
            "complete",
            "{repo}: +{} ~{} -{} renamed={} errors={}",
            stats.files_added,
            stats.files_modified,
            stats.files_deleted,
            stats.files_renamed,
            stats.errors.len()
        );
        Ok(stats)
    }

    /// `name → [paths]` over every exportable symbol still in the graph.
    fn imports_map_from_graph(&self, repo_key: &str) -> ImportsMap {
        let graph = self.store.graph();
        let mut map = ImportsMap::new();
        for id in graph.symbols_in_repo(repo_key) {
            let Some(symbol) = graph.node(id).and_then(Node::as_symbol) else {
                continue;
            };
            if !symbol.kind.is_exportable() {
                continue;
            }
            let paths = map.entry(symbol.name.clone()).or_default();
            if !paths.iter().any(|p| p == &symbol.path) {
                paths.push(symbol.path.clone());
            }
        }
        map
    }
}

/// Files with a CALLS or INHERITS edge into any symbol of `path`, plus
/// files that import it; their edges die with the deleted nodes and must
/// be recreated in phase 8.
fn dependent_files(
    graph: &crate::graph::store::CodeGraph,
    repo: &str,
    path: &str,
) -> HashSet<String> {
    let mut dependents = HashSet::new();
    let mut note = |from: crate::graph::model::NodeId| {
        let from_path = match graph.node(from) {
            Some(Node::Symbol(s)) => Some(s.path.clone()),
            Some(Node::File(f)) => Some(f.path.clone()),
            _ => None,
        };
        if let Some(p) = from_path {
            if p != path {
                dependents.insert(p);
            }
        }
    };

    for symbol_id in graph.symbols_in_file(repo, path) {
        for (from, edge) in graph.in_edges(symbol_id) {
            if matches!(edge.kind, EdgeKind::Calls | EdgeKind::Inherits) {
                note(from);
            }
        }
    }
    if let Some(file_id) = graph.file(repo, path) {
        for (from, edge) in graph.in_edges(file_id) {
            if edge.kind == EdgeKind::Imports {
                note(from);
            }
        }
    }
    dependents
}

async fn run_git(cwd: &Path, args: &[&str], timeout: Duration) -> bool {
    let result = tokio::time::timeout(
        timeout,
        tokio::process::Command::new("git")
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output(),
    )
    .await;
    match result {
        Ok(Ok(output)) => {
            if !output.status.success() {
                tracing::warn!(
                    "[sync] git {} failed: {}",
                    args.join(" "),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            output.status.success()
        }
        Ok(Err(e)) => {
            tracing::warn!("[sync] git {} failed to spawn: {e}", args.join(" "));
            false
        }
        Err(_) => {
            tracing::warn!("[sync] git {} timed out after {timeout:?}", args.join(" "));
            false
        }
    }
}

async fn git_stdout(cwd: &Path, args: &[&str], timeout: Duration) -> Option<String> {
    let output = tokio::time::timeout(
        timeout,
        tokio::process::Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output(),
    )
    .await
    .ok()?
    .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use crate::ingest::pipeline::IngestionPipeline;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (Arc<GraphStore>, Arc<Settings>, IngestionPipeline, IncrementalUpdater) {
        let store = Arc::new(GraphStore::in_memory(LimitsConfig::default()).unwrap());
        let settings = Arc::new(Settings::default());
        let pipeline = IngestionPipeline::new(store.clone(), settings.clone());
        let updater = IncrementalUpdater::new(store.clone(), settings.clone());
        (store, settings, pipeline, updater)
    }

    fn seed_tree(root: &Path) {
        fs::write(root.join("a.py"), "def foo():\n    return 1\n").unwrap();
        fs::write(
            root.join("b.py"),
            "from a import foo\n\ndef bar():\n    foo()\n",
        )
        .unwrap();
    }

    #[test]
    fn incremental_add_links_new_caller() {
        let dir = TempDir::new().unwrap();
        seed_tree(dir.path());
        let (store, _, pipeline, updater) = setup();
        let repo = RepoId::new("o", "r");
        pipeline.ingest_local(&repo, dir.path(), false).unwrap();

        fs::write(
            dir.path().join("c.py"),
            "from b import bar\n\ndef baz():\n    bar()\n",
        )
        .unwrap();

        let stats = updater
            .apply(
                &repo,
                dir.path(),
                &[ChangeRecord::new("c.py", ChangeStatus::Added)],
            )
            .unwrap();
        assert_eq!(stats.files_added, 1);
        assert!(stats.errors.is_empty());

        let graph = store.graph();
        let baz = graph.symbols_named("o/r", "baz")[0];
        let bar = graph.symbols_named("o/r", "bar")[0];
        assert!(graph
            .out_edges(baz)
            .iter()
            .any(|e| e.kind == EdgeKind::Calls && e.to == bar));
        // foo's incoming edge from bar is untouched.
        let foo = graph.symbols_named("o/r", "foo")[0];
        assert_eq!(
            graph
                .in_edges(foo)
                .iter()
                .filter(|(_, e)| e.kind == EdgeKind::Calls)
                .count(),
            1
        );
    }

    #[test]
    fn incremental_delete_removes_edges_and_symbols() {
        let dir = TempDir::new().unwrap();
        seed_tree(dir.path());
        fs::write(
            dir.path().join("c.py"),
            "from b import bar\n\ndef baz():\n    bar()\n",
        )
        .unwrap();
        let (store, _, pipeline, updater) = setup();
        let repo = RepoId::new("o", "r");
        pipeline.ingest_local(&repo, dir.path(), false).unwrap();

        fs::remove_file(dir.path().join("b.py")).unwrap();
        let stats = updater
            .apply(
                &repo,
                dir.path(),
                &[ChangeRecord::new("b.py", ChangeStatus::Removed)],
            )
            .unwrap();
        assert_eq!(stats.files_deleted, 1);

        let graph = store.graph();
        assert!(graph.file("o/r", "b.py").is_none());
        assert!(graph.symbols_named("o/r", "bar").is_empty());
        // c.py's dangling call is gone; a.py/foo survive untouched.
        let baz = graph.symbols_named("o/r", "baz")[0];
        assert!(graph
            .out_edges(baz)
            .iter()
            .filter(|e| e.kind == EdgeKind::Calls)
            .all(|e| {
                graph
                    .node(e.to)
                    .and_then(Node::as_symbol)
                    .map(|s| s.name != "bar")
                    .unwrap_or(true)
            }));
        assert!(!graph.symbols_named("o/r", "foo").is_empty());
    }

    #[test]
    fn incremental_modify_relinks_dependents() {
        let dir = TempDir::new().unwrap();
        seed_tree(dir.path());
        let (store, _, pipeline, updater) = setup();
        let repo = RepoId::new("o", "r");
        pipeline.ingest_local(&repo, dir.path(), false).unwrap();

        // Move foo down a line: the old symbol node dies with the delete,
        // and b.py (a dependent) must be relinked to the new node.
        fs::write(dir.path().join("a.py"), "\n\ndef foo():\n    return 2\n").unwrap();
        let stats = updater
            .apply(
                &repo,
                dir.path(),
                &[ChangeRecord::new("a.py", ChangeStatus::Modified)],
            )
            .unwrap();
        assert_eq!(stats.files_modified, 1);
        assert!(stats.errors.is_empty());

        let graph = store.graph();
        let foo = graph.symbols_named("o/r", "foo")[0];
        let foo_node = graph.node(foo).unwrap().as_symbol().unwrap();
        assert_eq!(foo_node.line_number, 3);
        let callers: Vec<_> = graph
            .in_edges(foo)
            .into_iter()
            .filter(|(_, e)| e.kind == EdgeKind::Calls)
            .collect();
        assert_eq!(callers.len(), 1);
    }

    #[test]
    fn rename_expands_to_delete_and_add() {
        let dir = TempDir::new().unwrap();
        seed_tree(dir.path());
        let (store, _, pipeline, updater) = setup();
        let repo = RepoId::new("o", "r");
        pipeline.ingest_local(&repo, dir.path(), false).unwrap();

        fs::rename(dir.path().join("a.py"), dir.path().join("core.py")).unwrap();
        let stats = updater
            .apply(&repo, dir.path(), &[ChangeRecord::renamed("a.py", "core.py")])
            .unwrap();
        assert_eq!(stats.files_renamed, 1);

        let graph = store.graph();
        assert!(graph.file("o/r", "a.py").is_none());
        assert!(graph.file("o/r", "core.py").is_some());
    }

    #[test]
    fn unsupported_extensions_are_skipped() {
        let dir = TempDir::new().unwrap();
        seed_tree(dir.path());
        let (_, _, pipeline, updater) = setup();
        let repo = RepoId::new("o", "r");
        pipeline.ingest_local(&repo, dir.path(), false).unwrap();

        let stats = updater
            .apply(
                &repo,
                dir.path(),
                &[ChangeRecord::new("README.md", ChangeStatus::Added)],
            )
            .unwrap();
        assert_eq!(stats.files_added, 0);
        assert!(stats.errors.is_empty());
    }

    #[test]
    fn unknown_repository_fails_the_job() {
        let dir = TempDir::new().unwrap();
        let (_, _, _, updater) = setup();
        let repo = RepoId::new("ghost", "repo");
        let result = updater.apply(&repo, dir.path(), &[]);
        assert!(result.is_err());
    }
}
