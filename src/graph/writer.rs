//! Batched, idempotent graph writes (the L3 surface).
//!
//! `upsert_file` is one write transaction per file and never creates CALLS
//! or INHERITS; those arrive later through the batch methods, after the
//! deferred resolvers have run. Transient store errors are retried with
//! exponential backoff before they propagate.

use std::time::Duration;

use crate::error::{GraphError, GraphResult};
use crate::graph::model::{
    EdgeKind, EdgeProps, FileNode, ParameterNode, SymbolKind, SymbolNode,
};
use crate::graph::{GraphStore, model::NodeId};
use crate::parsing::{ClassRecord, FileRecord, FunctionRecord};
use crate::types::{ImportsMap, RepoId};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
/// Deferred-edge batches are split into transactions of at most this many.
pub const EDGE_BATCH_SIZE: usize = 1000;

/// Constructor method names a class-targeted call is routed into.
const CONSTRUCTOR_NAMES: &[&str] = &["__init__", "constructor"];

/// A CALLS edge ready to be written: endpoints by name/path/line, not ids.
#[derive(Debug, Clone)]
pub struct CallEdgeSpec {
    pub caller_path: String,
    /// `(name, line_number)` of the calling symbol; None means the call was
    /// made at file scope and the File node becomes the caller.
    pub caller_symbol: Option<(String, u32)>,
    pub callee_name: String,
    /// Defining file of the callee; None lands on an UnresolvedSymbol.
    pub callee_path: Option<String>,
    pub line_number: u32,
    pub args: Vec<String>,
    pub full_call_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InheritKind {
    Inherits,
    Implements,
}

/// An INHERITS / IMPLEMENTS edge ready to be written.
#[derive(Debug, Clone)]
pub struct InheritEdgeSpec {
    pub child_name: String,
    pub child_path: String,
    pub child_line: u32,
    pub parent_name: String,
    pub parent_path: String,
    pub kind: InheritKind,
}

pub struct GraphWriter<'a> {
    store: &'a GraphStore,
}

impl<'a> GraphWriter<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    fn with_retry<T>(&self, operation: &str, mut f: impl FnMut() -> GraphResult<T>) -> GraphResult<T> {
        let mut attempt = 0;
        loop {
            match f() {
                Err(e) if e.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                    attempt += 1;
                    let delay = BACKOFF_BASE * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        "[writer] transient failure in {operation} (attempt {attempt}): {e}; retrying in {delay:?}"
                    );
                    std::thread::sleep(delay);
                }
                other => return other,
            }
        }
    }

    pub fn ensure_repository(&self, repo: &RepoId, is_dependency: bool) -> GraphResult<()> {
        self.with_retry("ensure_repository", || {
            let mut graph = self.store.graph_mut();
            graph.merge_repository(&repo.as_key(), &repo.owner, &repo.name, is_dependency);
            Ok(())
        })
    }

    /// Create/replace the File node, its directory chain, its symbols, their
    /// parameters and the IMPORTS edges. One write transaction.
    pub fn upsert_file(
        &self,
        repo: &RepoId,
        record: &FileRecord,
        imports_map: &ImportsMap,
    ) -> GraphResult<()> {
        self.with_retry("upsert_file", || self.upsert_file_once(repo, record, imports_map))
    }

    fn upsert_file_once(
        &self,
        repo: &RepoId,
        record: &FileRecord,
        imports_map: &ImportsMap,
    ) -> GraphResult<()> {
        let repo_key = repo.as_key();
        let mut graph = self.store.graph_mut();

        let repo_id = graph.merge_repository(&repo_key, &repo.owner, &repo.name, false);

        let file_name = record
            .path
            .rsplit('/')
            .next()
            .unwrap_or(&record.path)
            .to_string();
        let file_id = graph.merge_file(FileNode {
            repo: repo_key.clone(),
            path: record.path.clone(),
            name: file_name,
            language: record.language.name().to_string(),
            lines_count: record.lines_count,
            source_code: record.source_code.clone(),
            is_dependency: false,
        });

        // Directory chain from the repository down to the file's parent.
        let mut parent = repo_id;
        let components: Vec<&str> = record.path.split('/').collect();
        for i in 0..components.len().saturating_sub(1) {
            let dir_path = components[..=i].join("/");
            let dir_id = graph.merge_directory(&repo_key, &dir_path, components[i]);
            graph.merge_edge(parent, dir_id, EdgeKind::Contains, EdgeProps::default());
            parent = dir_id;
        }
        graph.merge_edge(parent, file_id, EdgeKind::Contains, EdgeProps::default());

        let mut symbol_ids: Vec<NodeId> = Vec::new();

        // Class-like types first so methods can hang off them.
        let type_groups: [(&[ClassRecord], SymbolKind); 7] = [
            (record.classes.as_slice(), SymbolKind::Class),
            (record.interfaces.as_slice(), SymbolKind::Interface),
            (record.structs.as_slice(), SymbolKind::Struct),
            (record.enums.as_slice(), SymbolKind::Enum),
            (record.unions.as_slice(), SymbolKind::Union),
            (record.traits.as_slice(), SymbolKind::Trait),
            (record.macros.as_slice(), SymbolKind::Macro),
        ];

        for (group, kind) in type_groups {
            for class in group {
                let id = graph.merge_symbol(class_symbol(&repo_key, &record.path, class, kind));
                graph.merge_edge(file_id, id, EdgeKind::Contains, EdgeProps::default());
                symbol_ids.push(id);
            }
        }

        for function in &record.functions {
            let kind = if function.class_context.is_some() {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            };
            let id = graph.merge_symbol(function_symbol(&repo_key, &record.path, function, kind));
            graph.merge_edge(file_id, id, EdgeKind::Contains, EdgeProps::default());
            symbol_ids.push(id);

            for (position, arg) in function.args.iter().enumerate() {
                let param_id = graph.merge_parameter(ParameterNode {
                    name: arg.clone(),
                    repo: repo_key.clone(),
                    path: record.path.clone(),
                    function_line: function.line_number,
                });
                graph.merge_edge(
                    id,
                    param_id,
                    EdgeKind::HasParameter,
                    EdgeProps {
                        position: Some(position as u32),
                        ..Default::default()
                    },
                );
            }
        }

        // Class CONTAINS its methods; outer function CONTAINS nested ones.
        for function in &record.functions {
            let child = find_symbol_at(&graph, &repo_key, &record.path, &function.name, function.line_number);
            let Some(child_id) = child else { continue };
            if let Some(class_name) = &function.class_context {
                if let Some(class_id) =
                    first_symbol_named(&graph, &repo_key, &record.path, class_name)
                {
                    graph.merge_edge(class_id, child_id, EdgeKind::Contains, EdgeProps::default());
                }
            }
            if let Some(outer_name) = &function.function_context {
                if let Some(outer_id) =
                    first_symbol_named(&graph, &repo_key, &record.path, outer_name)
                {
                    if outer_id != child_id {
                        graph.merge_edge(
                            outer_id,
                            child_id,
                            EdgeKind::Contains,
                            EdgeProps::default(),
                        );
                    }
                }
            }
        }

        for variable in &record.variables {
            let id = graph.merge_symbol(SymbolNode {
                kind: SymbolKind::Variable,
                name: variable.name.clone(),
                repo: repo_key.clone(),
                path: record.path.clone(),
                line_number: variable.line_number,
                end_line: variable.end_line,
                source: variable.source.clone(),
                docstring: None,
                args: vec![],
                bases: vec![],
                decorators: vec![],
                visibility: None,
                cyclomatic_complexity: None,
                is_dependency: false,
            });
            graph.merge_edge(file_id, id, EdgeKind::Contains, EdgeProps::default());
            symbol_ids.push(id);
        }

        merge_imports(&mut graph, &repo_key, file_id, record, imports_map);

        for name in &record.modules {
            graph.merge_module(name);
        }
        for inclusion in &record.module_inclusions {
            if let Some(class_id) =
                first_symbol_named(&graph, &repo_key, &record.path, &inclusion.class)
            {
                let module_id = graph.merge_module(&inclusion.module);
                graph.merge_edge(class_id, module_id, EdgeKind::Includes, EdgeProps::default());
            }
        }

        // Snapshot what the fulltext mirror needs before releasing the
        // lock; the index itself serializes through its own writer.
        let file_node = graph
            .node(file_id)
            .and_then(|n| n.as_file())
            .cloned()
            .expect("file node just merged");
        let symbols: Vec<SymbolNode> = symbol_ids
            .iter()
            .filter_map(|&id| graph.node(id).and_then(|n| n.as_symbol()).cloned())
            .collect();
        drop(graph);

        let symbol_refs: Vec<&SymbolNode> = symbols.iter().collect();
        self.store.fulltext().reindex_file(&file_node, &symbol_refs)?;
        Ok(())
    }

    /// Re-merge the IMPORTS edges of an already-written file. Used when a
    /// dependent file's import target was deleted and recreated, which
    /// severed the old edge.
    pub fn refresh_imports(
        &self,
        repo: &RepoId,
        record: &FileRecord,
        imports_map: &ImportsMap,
    ) -> GraphResult<()> {
        self.with_retry("refresh_imports", || {
            let repo_key = repo.as_key();
            let mut graph = self.store.graph_mut();
            let Some(file_id) = graph.file(&repo_key, &record.path) else {
                return Ok(());
            };
            merge_imports(&mut graph, &repo_key, file_id, record, imports_map);
            Ok(())
        })
    }

    /// Write CALLS edges in transactions of at most [`EDGE_BATCH_SIZE`].
    pub fn batch_upsert_calls(&self, repo: &RepoId, edges: &[CallEdgeSpec]) -> GraphResult<usize> {
        let repo_key = repo.as_key();
        let mut written = 0;
        for chunk in edges.chunks(EDGE_BATCH_SIZE) {
            self.with_retry("batch_upsert_calls", || {
                let mut graph = self.store.graph_mut();
                for spec in chunk {
                    let caller_id = match &spec.caller_symbol {
                        Some((name, line)) => {
                            find_symbol_at(&graph, &repo_key, &spec.caller_path, name, *line)
                        }
                        None => graph.file(&repo_key, &spec.caller_path),
                    };
                    let Some(caller_id) = caller_id else {
                        continue;
                    };

                    let (target_id, resolved) = match &spec.callee_path {
                        Some(path) => {
                            match callable_target(&graph, &repo_key, path, &spec.callee_name) {
                                Some(id) => (id, true),
                                None => (graph.merge_unresolved(&repo_key, &spec.callee_name), false),
                            }
                        }
                        None => (graph.merge_unresolved(&repo_key, &spec.callee_name), false),
                    };

                    graph.merge_edge(
                        caller_id,
                        target_id,
                        EdgeKind::Calls,
                        EdgeProps {
                            line_number: Some(spec.line_number),
                            args: spec.args.clone(),
                            full_call_name: Some(spec.full_call_name.clone()),
                            is_resolved: Some(resolved),
                            ..Default::default()
                        },
                    );
                }
                Ok(())
            })?;
            written += chunk.len();
        }
        Ok(written)
    }

    /// Write INHERITS / IMPLEMENTS edges in bounded transactions.
    pub fn batch_upsert_inheritance(
        &self,
        repo: &RepoId,
        edges: &[InheritEdgeSpec],
    ) -> GraphResult<usize> {
        let repo_key = repo.as_key();
        let mut written = 0;
        for chunk in edges.chunks(EDGE_BATCH_SIZE) {
            self.with_retry("batch_upsert_inheritance", || {
                let mut graph = self.store.graph_mut();
                for spec in chunk {
                    let child = find_symbol_at(
                        &graph,
                        &repo_key,
                        &spec.child_path,
                        &spec.child_name,
                        spec.child_line,
                    )
                    .or_else(|| {
                        first_symbol_named(&graph, &repo_key, &spec.child_path, &spec.child_name)
                    });
                    let parent =
                        first_symbol_named(&graph, &repo_key, &spec.parent_path, &spec.parent_name);
                    let (Some(child_id), Some(parent_id)) = (child, parent) else {
                        continue;
                    };
                    if child_id == parent_id {
                        continue;
                    }
                    let kind = match spec.kind {
                        InheritKind::Inherits => EdgeKind::Inherits,
                        InheritKind::Implements => EdgeKind::Implements,
                    };
                    graph.merge_edge(child_id, parent_id, kind, EdgeProps::default());
                }
                Ok(())
            })?;
            written += chunk.len();
        }
        Ok(written)
    }

    /// Remove the file, its symbols and every edge touching them, including
    /// incoming CALLS/INHERITS from other files. Prunes emptied directories.
    pub fn delete_file(&self, repo: &RepoId, path: &str) -> GraphResult<bool> {
        let repo_key = repo.as_key();
        let deleted = self.with_retry("delete_file", || {
            let mut graph = self.store.graph_mut();
            Ok(graph.delete_file(&repo_key, path))
        })?;
        if deleted {
            self.store.fulltext().remove_file(&repo_key, path);
        }
        Ok(deleted)
    }

    /// Cascade-delete the repository.
    pub fn delete_repository(&self, repo: &RepoId) -> GraphResult<bool> {
        let repo_key = repo.as_key();
        let deleted = self.with_retry("delete_repository", || {
            let mut graph = self.store.graph_mut();
            Ok(graph.delete_repository(&repo_key))
        })?;
        if deleted {
            self.store.fulltext().remove_repository(&repo_key);
        }
        Ok(deleted)
    }

    /// Flush fulltext writes; called at the end of a job.
    pub fn commit(&self) -> GraphResult<()> {
        self.store.fulltext().commit()?;
        self.store.save()
    }
}

/// IMPORTS edges for one file: in-repo File target when the pre-scan knows
/// the defining file, otherwise an external Module node.
fn merge_imports(
    graph: &mut crate::graph::store::CodeGraph,
    repo_key: &str,
    file_id: NodeId,
    record: &FileRecord,
    imports_map: &ImportsMap,
) {
    for import in &record.imports {
        let props = EdgeProps {
            line_number: Some(import.line_number),
            alias: import.alias.clone(),
            imported_name: import.imported_name.clone(),
            ..Default::default()
        };
        match resolve_import_target(imports_map, import, &record.path) {
            Some(target_path) => {
                let target_id = match graph.file(repo_key, &target_path) {
                    Some(id) => id,
                    None => {
                        // Placeholder until the write pass reaches that
                        // file; merge semantics fill in the real
                        // properties later.
                        let target_name = target_path
                            .rsplit('/')
                            .next()
                            .unwrap_or(&target_path)
                            .to_string();
                        let language = crate::parsing::Language::from_path(
                            std::path::Path::new(&target_path),
                        )
                        .map(|l| l.name().to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                        graph.merge_file(FileNode {
                            repo: repo_key.to_string(),
                            path: target_path.clone(),
                            name: target_name,
                            language,
                            lines_count: 0,
                            source_code: None,
                            is_dependency: false,
                        })
                    }
                };
                graph.merge_edge(file_id, target_id, EdgeKind::Imports, props);
            }
            None => {
                let module_id = graph.merge_module(&import.module);
                graph.merge_edge(file_id, module_id, EdgeKind::Imports, props);
            }
        }
    }
}

fn class_symbol(repo: &str, path: &str, class: &ClassRecord, kind: SymbolKind) -> SymbolNode {
    SymbolNode {
        kind,
        name: class.name.clone(),
        repo: repo.to_string(),
        path: path.to_string(),
        line_number: class.line_number,
        end_line: class.end_line,
        source: class.source.clone(),
        docstring: class.docstring.clone(),
        args: vec![],
        bases: class.bases.clone(),
        decorators: class.decorators.clone(),
        visibility: None,
        cyclomatic_complexity: None,
        is_dependency: false,
    }
}

fn function_symbol(repo: &str, path: &str, f: &FunctionRecord, kind: SymbolKind) -> SymbolNode {
    SymbolNode {
        kind,
        name: f.name.clone(),
        repo: repo.to_string(),
        path: path.to_string(),
        line_number: f.line_number,
        end_line: f.end_line,
        source: f.source.clone(),
        docstring: f.docstring.clone(),
        args: f.args.clone(),
        bases: vec![],
        decorators: f.decorators.clone(),
        visibility: f.visibility.clone(),
        cyclomatic_complexity: Some(f.cyclomatic_complexity),
        is_dependency: false,
    }
}

fn find_symbol_at(
    graph: &crate::graph::store::CodeGraph,
    repo: &str,
    path: &str,
    name: &str,
    line: u32,
) -> Option<NodeId> {
    graph.symbol(&crate::graph::model::SymbolKey {
        name: name.to_string(),
        repo: repo.to_string(),
        path: path.to_string(),
        line_number: line,
    })
}

fn first_symbol_named(
    graph: &crate::graph::store::CodeGraph,
    repo: &str,
    path: &str,
    name: &str,
) -> Option<NodeId> {
    graph
        .symbols_named(repo, name)
        .into_iter()
        .find(|&id| graph.node(id).and_then(|n| n.as_symbol()).map(|s| s.path.as_str()) == Some(path))
}

/// Locate the call target inside `path`: a callable symbol named
/// `callee_name`; a Class target is routed into its constructor when one
/// exists.
fn callable_target(
    graph: &crate::graph::store::CodeGraph,
    repo: &str,
    path: &str,
    callee_name: &str,
) -> Option<NodeId> {
    let candidate = graph.symbols_named(repo, callee_name).into_iter().find(|&id| {
        graph
            .node(id)
            .and_then(|n| n.as_symbol())
            .map(|s| s.path == path && s.kind.is_callable_target())
            .unwrap_or(false)
    })?;

    let symbol = graph.node(candidate).and_then(|n| n.as_symbol())?;
    if symbol.kind == SymbolKind::Class {
        for edge in graph.out_edges(candidate) {
            if edge.kind != EdgeKind::Contains {
                continue;
            }
            if let Some(child) = graph.node(edge.to).and_then(|n| n.as_symbol()) {
                if CONSTRUCTOR_NAMES.contains(&child.name.as_str()) {
                    return Some(edge.to);
                }
            }
        }
    }
    Some(candidate)
}

/// Import target resolution against the pre-scan map: exactly-one match
/// wins; ambiguity is broken by the module path; no match means external.
fn resolve_import_target(
    imports_map: &ImportsMap,
    import: &crate::parsing::ImportRecord,
    importing_path: &str,
) -> Option<String> {
    let lookup = import
        .imported_name
        .as_deref()
        .filter(|n| *n != "*")
        .unwrap_or_else(|| {
            import
                .module
                .rsplit(['.', '/'])
                .next()
                .unwrap_or(&import.module)
        });

    let candidates = imports_map.get(lookup)?;
    let in_repo: Vec<&String> = candidates.iter().filter(|p| *p != importing_path).collect();
    let pool = if in_repo.is_empty() {
        candidates.iter().collect::<Vec<_>>()
    } else {
        in_repo
    };
    match pool.as_slice() {
        [] => None,
        [single] => Some((*single).clone()),
        many => {
            let fragment = import
                .module
                .replace('.', "/")
                .trim_start_matches("./")
                .to_string();
            many.iter()
                .find(|p| p.contains(&fragment))
                .map(|p| (**p).clone())
                .or_else(|| Some((*many[0]).clone()))
        }
    }
}
