//! Full-repository ingestion (C1).
//!
//! Pass order inside one job is fixed: enumerate, pre-scan, per-file
//! parse-and-write, then the two deferred edge passes. Per-file parse
//! failures are collected and never abort the job; store failures after
//! retries do.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::{HostError, IngestResult};
use crate::graph::{GraphStore, GraphWriter};
use crate::ingest::prescan::build_imports_map;
use crate::ingest::resolver::{resolve_calls, resolve_inheritance};
use crate::ingest::walker::{enumerate_source_files, relative_path};
use crate::parsing::{ExtractorSet, FileRecord};
use crate::github::RepositoryHost;
use crate::types::RepoId;

/// Files per parser instance in the parallel parse pass.
const PARSE_CHUNK: usize = 64;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IngestionStats {
    pub files_processed: usize,
    pub files_skipped: usize,
    pub classes_found: usize,
    pub functions_found: usize,
    pub imports_found: usize,
    pub total_lines: u64,
    pub errors: Vec<String>,
}

/// Scratch checkout owned by one job; removed on every exit path.
struct ScratchGuard {
    path: PathBuf,
}

impl ScratchGuard {
    fn claim(path: PathBuf) -> std::io::Result<Self> {
        if path.exists() {
            std::fs::remove_dir_all(&path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                tracing::warn!("[pipeline] failed to remove scratch {}: {e}", self.path.display());
            }
        }
    }
}

#[derive(Clone)]
pub struct IngestionPipeline {
    store: Arc<GraphStore>,
    settings: Arc<Settings>,
}

impl IngestionPipeline {
    pub fn new(store: Arc<GraphStore>, settings: Arc<Settings>) -> Self {
        Self { store, settings }
    }

    /// Clone from the host and ingest. The scratch checkout is exclusive to
    /// this job and released however the job ends.
    pub async fn ingest_github(
        &self,
        host: &dyn RepositoryHost,
        repo: &RepoId,
        branch: Option<String>,
        clear_existing: bool,
    ) -> IngestResult<IngestionStats> {
        if !host.check_access(repo).await? {
            return Err(HostError::AccessDenied {
                repo: repo.as_key(),
                reason: "app installation missing or lacking contents permission".to_string(),
            }
            .into());
        }

        let scratch = self
            .settings
            .worker
            .scratch_root()
            .join(&repo.owner)
            .join(&repo.name);
        let guard = ScratchGuard::claim(scratch)?;
        crate::log_event!("pipeline", "cloning", "{repo}");
        host.clone_repo(repo, branch.as_deref(), &guard.path).await?;

        let this = self.clone();
        let repo = repo.clone();
        let root = guard.path.clone();
        let stats = tokio::task::spawn_blocking(move || {
            this.ingest_local(&repo, &root, clear_existing)
        })
        .await
        .map_err(|e| crate::error::GraphError::Fatal(format!("ingest task panicked: {e}")))??;

        drop(guard);
        Ok(stats)
    }

    /// Ingest a working tree already on disk.
    pub fn ingest_local(
        &self,
        repo: &RepoId,
        root: &Path,
        clear_existing: bool,
    ) -> IngestResult<IngestionStats> {
        let writer = GraphWriter::new(&self.store);

        if clear_existing {
            crate::log_event!("pipeline", "clearing", "{repo}");
            writer.delete_repository(repo)?;
        }
        writer.ensure_repository(repo, false)?;

        let files = enumerate_source_files(root, &self.settings.worker.ignore_dirs);
        crate::log_event!("pipeline", "enumerated", "{} files in {repo}", files.len());

        let (records, mut errors) = self.parse_all(root, &files);

        // Pass A: the pre-scan map must exist before any resolver runs.
        let imports_map = build_imports_map(records.iter());
        crate::debug_event!("pipeline", "pre-scan", "{} exported names", imports_map.len());

        // Pass B: one write transaction per file.
        let mut stats = IngestionStats {
            files_skipped: errors.len(),
            imports_found: imports_map.len(),
            ..Default::default()
        };
        for record in &records {
            match writer.upsert_file(repo, record, &imports_map) {
                Ok(()) => {
                    stats.files_processed += 1;
                    stats.classes_found += record.classes.len()
                        + record.interfaces.len()
                        + record.structs.len()
                        + record.traits.len();
                    stats.functions_found += record.functions.len();
                    stats.total_lines += u64::from(record.lines_count);
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Pass C: inheritance, then pass D: calls.
        let inherit_edges: Vec<_> = records
            .iter()
            .flat_map(|r| resolve_inheritance(r, &imports_map))
            .collect();
        writer.batch_upsert_inheritance(repo, &inherit_edges)?;

        let call_edges: Vec<_> = records
            .iter()
            .flat_map(|r| resolve_calls(r, &imports_map))
            .collect();
        writer.batch_upsert_calls(repo, &call_edges)?;

        writer.commit()?;

        stats.errors.append(&mut errors);
        crate::log_event!(
            "pipeline",
            "complete",
            "{repo}: {} files, {} functions, {} classes, {} errors",
            stats.files_processed,
            stats.functions_found,
            stats.classes_found,
            stats.errors.len()
        );
        Ok(stats)
    }

    /// Parse every file on a bounded worker pool. Returns successfully
    /// parsed records plus the collected per-file error strings.
    fn parse_all(&self, root: &Path, files: &[PathBuf]) -> (Vec<FileRecord>, Vec<String>) {
        let threads = self.settings.worker.effective_parse_threads();
        let limits = self.settings.limits.clone();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build();
        let outcomes: Vec<Result<FileRecord, String>> = match pool {
            Ok(pool) => pool.install(|| {
                files
                    .par_chunks(PARSE_CHUNK)
                    .flat_map_iter(|chunk| parse_chunk(&limits, root, chunk))
                    .collect()
            }),
            // Pool construction failing is unusual; parse inline instead.
            Err(e) => {
                tracing::warn!("[pipeline] parse pool unavailable ({e}); parsing sequentially");
                parse_chunk(&limits, root, files)
            }
        };

        let mut records = Vec::new();
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(record) => records.push(record),
                Err(message) => errors.push(message),
            }
        }
        (records, errors)
    }
}

fn parse_chunk(
    limits: &crate::config::LimitsConfig,
    root: &Path,
    chunk: &[PathBuf],
) -> Vec<Result<FileRecord, String>> {
    let mut set = match ExtractorSet::new(limits) {
        Ok(set) => set,
        Err(e) => {
            return chunk
                .iter()
                .map(|p| Err(format!("{}: {e}", p.display())))
                .collect();
        }
    };
    chunk
        .iter()
        .map(|abs| {
            let rel = relative_path(root, abs);
            set.parse_file(&rel, abs).map_err(|e| format!("{rel}: {e}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use crate::graph::model::EdgeKind;
    use std::fs;
    use tempfile::TempDir;

    fn pipeline() -> IngestionPipeline {
        let store = Arc::new(GraphStore::in_memory(LimitsConfig::default()).unwrap());
        IngestionPipeline::new(store, Arc::new(Settings::default()))
    }

    fn write_fixture(root: &Path) {
        fs::write(root.join("a.py"), "def foo():\n    return 1\n").unwrap();
        fs::write(
            root.join("b.py"),
            "from a import foo\n\ndef bar():\n    foo()\n",
        )
        .unwrap();
    }

    #[test]
    fn fresh_ingest_builds_expected_graph() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());
        let pipeline = pipeline();
        let repo = RepoId::new("o", "r");

        let stats = pipeline.ingest_local(&repo, dir.path(), false).unwrap();
        assert_eq!(stats.files_processed, 2);
        assert_eq!(stats.functions_found, 2);
        assert!(stats.errors.is_empty());

        let graph = pipeline.store.graph();
        let bar = graph.symbols_named("o/r", "bar")[0];
        let foo = graph.symbols_named("o/r", "foo")[0];
        let call = graph
            .out_edges(bar)
            .into_iter()
            .find(|e| e.kind == EdgeKind::Calls)
            .expect("bar CALLS foo");
        assert_eq!(call.to, foo);
        assert_eq!(call.props.line_number, Some(4));
        assert_eq!(call.props.is_resolved, Some(true));

        // b.py IMPORTS a.py with the imported name recorded.
        let b = graph.file("o/r", "b.py").unwrap();
        let a = graph.file("o/r", "a.py").unwrap();
        let import = graph
            .out_edges(b)
            .into_iter()
            .find(|e| e.kind == EdgeKind::Imports)
            .expect("b.py IMPORTS a.py");
        assert_eq!(import.to, a);
        assert_eq!(import.props.imported_name.as_deref(), Some("foo"));
    }

    #[test]
    fn reingest_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());
        let pipeline = pipeline();
        let repo = RepoId::new("o", "r");

        pipeline.ingest_local(&repo, dir.path(), false).unwrap();
        let first = pipeline.store.graph().stats();
        pipeline.ingest_local(&repo, dir.path(), false).unwrap();
        let second = pipeline.store.graph().stats();

        assert_eq!(first.symbols, second.symbols);
        assert_eq!(first.files, second.files);
        assert_eq!(first.edges, second.edges);
    }

    #[test]
    fn parse_errors_do_not_abort_the_job() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ok.py"), "def fine():\n    pass\n").unwrap();
        // Invalid UTF-8 makes the read fail, which lands in errors[].
        fs::write(dir.path().join("broken.py"), [0xff, 0xfe, 0x00]).unwrap();

        let pipeline = pipeline();
        let repo = RepoId::new("o", "r");
        let stats = pipeline.ingest_local(&repo, dir.path(), false).unwrap();

        assert_eq!(stats.files_processed, 1);
        assert_eq!(stats.files_skipped, 1);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].contains("broken.py"));
    }

    #[test]
    fn clear_existing_drops_previous_contents() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());
        let pipeline = pipeline();
        let repo = RepoId::new("o", "r");
        pipeline.ingest_local(&repo, dir.path(), false).unwrap();

        // Second tree without b.py; with clear_existing the old file must go.
        let dir2 = TempDir::new().unwrap();
        fs::write(dir2.path().join("a.py"), "def foo():\n    return 2\n").unwrap();
        pipeline.ingest_local(&repo, dir2.path(), true).unwrap();

        let graph = pipeline.store.graph();
        assert!(graph.file("o/r", "b.py").is_none());
        assert!(graph.file("o/r", "a.py").is_some());
    }
}
