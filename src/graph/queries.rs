//! Read-side queries: the PR-review context builder, caller lookup, impact
//! analysis, and the repository management surface.
//!
//! Every traversal is depth- or count-bounded so query cost stays flat no
//! matter how cyclic the graph is.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::graph::GraphStore;
use crate::graph::callers::scan_callers;
use crate::graph::model::{EdgeKind, Node, NodeId, SymbolKind};
use crate::graph::store::CodeGraph;
use crate::types::{Hunk, RepoId};

pub const TRUNCATION_MARKER: &str = "\n… (truncated)";

#[derive(Debug, Clone, Serialize)]
pub struct AffectedSymbol {
    pub kind: String,
    pub name: String,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub source: String,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Populated for classes: every method body, so a reviewer never has to
    /// guess what a method does.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<MethodBody>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodBody {
    pub name: String,
    pub line_number: u32,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallerInfo {
    pub name: String,
    pub kind: String,
    pub path: String,
    pub line_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_line: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolCallers {
    pub symbol: String,
    pub symbol_kind: String,
    pub callers: Vec<CallerInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyInfo {
    pub name: String,
    pub kind: String,
    pub path: String,
    pub line_number: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolDependencies {
    pub symbol: String,
    pub dependencies: Vec<DependencyInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportedSymbol {
    pub name: String,
    pub kind: String,
    pub path: String,
    pub line_number: u32,
    pub source: String,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    pub from_file: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HierarchyEntry {
    pub name: String,
    pub path: String,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassHierarchy {
    pub class: String,
    pub parents: Vec<HierarchyEntry>,
    pub children: Vec<HierarchyEntry>,
}

/// Full context for one diff, ready for the review pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct DiffContext {
    pub affected_symbols: Vec<AffectedSymbol>,
    pub callers: Vec<SymbolCallers>,
    pub dependencies: Vec<SymbolDependencies>,
    pub imports: Vec<ImportedSymbol>,
    pub class_hierarchy: Vec<ClassHierarchy>,
    pub total_affected: usize,
    pub total_files: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpactedSymbol {
    pub name: String,
    pub kind: String,
    pub path: String,
    pub line_number: u32,
    pub distance: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositorySummary {
    pub repo: String,
    pub owner: String,
    pub name: String,
    pub file_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryStats {
    pub repo: String,
    pub files: usize,
    pub classes: usize,
    pub functions: usize,
    pub methods: usize,
    pub variables: usize,
    pub total_lines: u64,
    pub languages: Vec<String>,
}

pub struct ContextBuilder<'a> {
    store: &'a GraphStore,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    /// C3 entry point: map hunks to symbols and assemble every context
    /// section. An empty diff yields empty arrays, never an error.
    pub fn build_diff_context(&self, repo: &RepoId, changes: &[Hunk]) -> DiffContext {
        let limits = self.store.limits();
        let repo_key = repo.as_key();
        let graph = self.store.graph();

        let mut affected = Vec::new();
        let mut callers = Vec::new();
        let mut dependencies = Vec::new();
        let mut imports = Vec::new();
        let mut hierarchy = Vec::new();
        let mut seen_symbols: HashSet<(String, String)> = HashSet::new();
        let mut seen_imports: HashSet<String> = HashSet::new();
        let mut seen_files: HashSet<String> = HashSet::new();

        for change in changes {
            let symbol_ids =
                overlapping_symbols(&graph, &repo_key, &change.file_path, change.start_line, change.end_line);

            for id in symbol_ids {
                let Some(symbol) = graph.node(id).and_then(Node::as_symbol) else {
                    continue;
                };
                let key = (symbol.path.clone(), symbol.name.clone());
                if !seen_symbols.insert(key) {
                    continue;
                }

                let (source, truncated) = cap_source(&symbol.source, limits.primary_source_cap);
                let methods = if symbol.kind == SymbolKind::Class {
                    class_methods(&graph, id, limits.primary_source_cap)
                } else {
                    Vec::new()
                };

                affected.push(AffectedSymbol {
                    kind: symbol.kind.as_str().to_string(),
                    name: symbol.name.clone(),
                    file_path: symbol.path.clone(),
                    start_line: symbol.line_number,
                    end_line: symbol.end_line,
                    source,
                    truncated,
                    docstring: symbol.docstring.clone(),
                    args: symbol.args.clone(),
                    methods,
                });

                let caller_records = self.callers_of(&graph, id, limits.callers_limit);
                if !caller_records.is_empty() {
                    callers.push(SymbolCallers {
                        symbol: symbol.name.clone(),
                        symbol_kind: symbol.kind.as_str().to_string(),
                        callers: caller_records,
                    });
                }

                let dependency_records =
                    dependencies_of(&graph, id, limits.dependencies_limit);
                if !dependency_records.is_empty() {
                    dependencies.push(SymbolDependencies {
                        symbol: symbol.name.clone(),
                        dependencies: dependency_records,
                    });
                }

                if symbol.kind == SymbolKind::Class {
                    hierarchy.push(class_hierarchy_of(
                        &graph,
                        id,
                        limits.hierarchy_depth,
                        limits.collateral_source_cap,
                    ));
                }
            }

            if seen_files.insert(change.file_path.clone()) {
                imports.extend(imported_symbols_for_file(
                    &graph,
                    &repo_key,
                    &change.file_path,
                    limits.collateral_source_cap,
                    &mut seen_imports,
                ));
            }
        }

        DiffContext {
            total_affected: affected.len(),
            total_files: changes
                .iter()
                .map(|c| c.file_path.as_str())
                .collect::<HashSet<_>>()
                .len(),
            affected_symbols: affected,
            callers,
            dependencies,
            imports,
            class_hierarchy: hierarchy,
        }
    }

    /// Graph-edge callers with the file-content scan as deterministic
    /// fallback when zero CALLS edges resolve.
    pub fn find_callers(&self, repo: &RepoId, name: &str) -> Vec<CallerInfo> {
        let limits = self.store.limits();
        let repo_key = repo.as_key();
        let graph = self.store.graph();

        let mut result = Vec::new();
        for id in graph.symbols_named(&repo_key, name) {
            result.extend(self.callers_of(&graph, id, limits.callers_limit));
            if result.len() >= limits.callers_limit {
                result.truncate(limits.callers_limit);
                break;
            }
        }
        if !result.is_empty() {
            return result;
        }

        let definition_path = graph
            .symbols_named(&repo_key, name)
            .first()
            .and_then(|&id| graph.node(id).and_then(Node::as_symbol))
            .map(|s| s.path.clone());
        drop(graph);

        scan_callers(self.store, &repo_key, name, definition_path.as_deref())
            .into_iter()
            .map(|hit| CallerInfo {
                name: hit.function_name,
                kind: "function".to_string(),
                path: hit.path,
                line_number: hit.function_line,
                call_line: Some(hit.call_line),
            })
            .collect()
    }

    /// Callers of one symbol node; for classes the methods' callers count
    /// too, since changing the class changes them.
    fn callers_of(&self, graph: &CodeGraph, id: NodeId, limit: usize) -> Vec<CallerInfo> {
        let mut targets = vec![id];
        if graph
            .node(id)
            .and_then(Node::as_symbol)
            .map(|s| s.kind == SymbolKind::Class)
            .unwrap_or(false)
        {
            for edge in graph.out_edges(id) {
                if edge.kind == EdgeKind::Contains {
                    targets.push(edge.to);
                }
            }
        }

        let mut result = Vec::new();
        let mut seen = HashSet::new();
        for target in targets {
            for (from, edge) in graph.in_edges(target) {
                if edge.kind != EdgeKind::Calls {
                    continue;
                }
                let Some(caller) = graph.node(from).and_then(Node::as_symbol) else {
                    continue;
                };
                if !matches!(caller.kind, SymbolKind::Function | SymbolKind::Method) {
                    continue;
                }
                if !seen.insert((caller.path.clone(), caller.name.clone(), edge.props.line_number))
                {
                    continue;
                }
                result.push(CallerInfo {
                    name: caller.name.clone(),
                    kind: caller.kind.as_str().to_string(),
                    path: caller.path.clone(),
                    line_number: caller.line_number,
                    call_line: edge.props.line_number,
                });
                if result.len() >= limit {
                    return result;
                }
            }
        }
        result
    }

    /// Transitive callers of a symbol, bounded at the impact depth.
    pub fn impact_of(&self, repo: &RepoId, name: &str, path: Option<&str>) -> Vec<ImpactedSymbol> {
        let limits = self.store.limits();
        let repo_key = repo.as_key();
        let graph = self.store.graph();

        let roots: Vec<NodeId> = graph
            .symbols_named(&repo_key, name)
            .into_iter()
            .filter(|&id| match (path, graph.node(id).and_then(Node::as_symbol)) {
                (Some(p), Some(s)) => s.path == p,
                (None, Some(_)) => true,
                _ => false,
            })
            .collect();

        let mut visited: HashSet<NodeId> = roots.iter().copied().collect();
        let mut queue: VecDeque<(NodeId, usize)> =
            roots.into_iter().map(|id| (id, 0)).collect();
        let mut result = Vec::new();

        while let Some((id, depth)) = queue.pop_front() {
            if depth >= limits.impact_depth {
                continue;
            }
            for (from, edge) in graph.in_edges(id) {
                if !matches!(edge.kind, EdgeKind::Calls | EdgeKind::Inherits) {
                    continue;
                }
                if !visited.insert(from) {
                    continue;
                }
                if let Some(symbol) = graph.node(from).and_then(Node::as_symbol) {
                    result.push(ImpactedSymbol {
                        name: symbol.name.clone(),
                        kind: symbol.kind.as_str().to_string(),
                        path: symbol.path.clone(),
                        line_number: symbol.line_number,
                        distance: depth + 1,
                    });
                }
                queue.push_back((from, depth + 1));
            }
        }
        result
    }

    /// Size-gated full-file retrieval.
    pub fn file_source(&self, repo: &RepoId, path: &str) -> Option<(String, u32)> {
        let graph = self.store.graph();
        let file_id = graph.file(&repo.as_key(), path)?;
        let file = graph.node(file_id).and_then(Node::as_file)?;
        file.source_code
            .as_ref()
            .map(|s| (s.clone(), file.lines_count))
    }

    pub fn list_repositories(&self) -> Vec<RepositorySummary> {
        let graph = self.store.graph();
        graph
            .repositories()
            .into_iter()
            .filter_map(|id| match graph.node(id) {
                Some(Node::Repository(r)) => Some(RepositorySummary {
                    repo: r.repo.clone(),
                    owner: r.owner.clone(),
                    name: r.name.clone(),
                    file_count: graph.files_in_repo(&r.repo).len(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn repository_stats(&self, repo: &RepoId) -> Option<RepositoryStats> {
        let repo_key = repo.as_key();
        let graph = self.store.graph();
        graph.repository(&repo_key)?;

        let mut stats = RepositoryStats {
            repo: repo_key.clone(),
            files: 0,
            classes: 0,
            functions: 0,
            methods: 0,
            variables: 0,
            total_lines: 0,
            languages: Vec::new(),
        };
        let mut languages = HashSet::new();
        for id in graph.files_in_repo(&repo_key) {
            if let Some(file) = graph.node(id).and_then(Node::as_file) {
                stats.files += 1;
                stats.total_lines += u64::from(file.lines_count);
                languages.insert(file.language.clone());
            }
        }
        for id in graph.symbols_in_repo(&repo_key) {
            match graph.node(id).and_then(Node::as_symbol).map(|s| s.kind) {
                Some(SymbolKind::Class) => stats.classes += 1,
                Some(SymbolKind::Function) => stats.functions += 1,
                Some(SymbolKind::Method) => stats.methods += 1,
                Some(SymbolKind::Variable) => stats.variables += 1,
                _ => {}
            }
        }
        let mut languages: Vec<String> = languages.into_iter().collect();
        languages.sort();
        stats.languages = languages;
        Some(stats)
    }
}

/// Function / Method / Class nodes of `path` whose span overlaps the hunk.
fn overlapping_symbols(
    graph: &CodeGraph,
    repo: &str,
    path: &str,
    start_line: u32,
    end_line: u32,
) -> Vec<NodeId> {
    graph
        .symbols_in_file(repo, path)
        .into_iter()
        .filter(|&id| {
            graph
                .node(id)
                .and_then(Node::as_symbol)
                .map(|s| {
                    matches!(
                        s.kind,
                        SymbolKind::Function | SymbolKind::Method | SymbolKind::Class
                    ) && s.line_number <= end_line
                        && s.end_line.max(s.line_number) >= start_line
                })
                .unwrap_or(false)
        })
        .collect()
}

fn class_methods(graph: &CodeGraph, class_id: NodeId, cap: usize) -> Vec<MethodBody> {
    let mut methods = Vec::new();
    for edge in graph.out_edges(class_id) {
        if edge.kind != EdgeKind::Contains {
            continue;
        }
        if let Some(method) = graph.node(edge.to).and_then(Node::as_symbol) {
            if matches!(method.kind, SymbolKind::Method | SymbolKind::Function) {
                let (source, _) = cap_source(&method.source, cap);
                methods.push(MethodBody {
                    name: method.name.clone(),
                    line_number: method.line_number,
                    source,
                    docstring: method.docstring.clone(),
                });
            }
        }
    }
    methods.sort_by_key(|m| m.line_number);
    methods
}

fn dependencies_of(graph: &CodeGraph, id: NodeId, limit: usize) -> Vec<DependencyInfo> {
    let mut sources = vec![id];
    if graph
        .node(id)
        .and_then(Node::as_symbol)
        .map(|s| s.kind == SymbolKind::Class)
        .unwrap_or(false)
    {
        for edge in graph.out_edges(id) {
            if edge.kind == EdgeKind::Contains {
                sources.push(edge.to);
            }
        }
    }

    let mut result = Vec::new();
    let mut seen = HashSet::new();
    for source in sources {
        for edge in graph.out_edges(source) {
            if edge.kind != EdgeKind::Calls {
                continue;
            }
            let Some(target) = graph.node(edge.to).and_then(Node::as_symbol) else {
                continue;
            };
            // Dependency-ingested targets are noise for review context.
            if target.is_dependency {
                continue;
            }
            if !seen.insert((target.path.clone(), target.name.clone())) {
                continue;
            }
            result.push(DependencyInfo {
                name: target.name.clone(),
                kind: target.kind.as_str().to_string(),
                path: target.path.clone(),
                line_number: target.line_number,
            });
            if result.len() >= limit {
                return result;
            }
        }
    }
    result
}

fn class_hierarchy_of(
    graph: &CodeGraph,
    class_id: NodeId,
    max_depth: usize,
    source_cap: usize,
) -> ClassHierarchy {
    let class_name = graph
        .node(class_id)
        .and_then(Node::as_symbol)
        .map(|s| s.name.clone())
        .unwrap_or_default();

    // Parents: bounded BFS up the INHERITS edges. Cycles terminate because
    // visited nodes are never re-queued.
    let mut parents = Vec::new();
    let mut visited = HashSet::from([class_id]);
    let mut queue = VecDeque::from([(class_id, 0usize)]);
    while let Some((id, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        for edge in graph.out_edges(id) {
            if edge.kind != EdgeKind::Inherits {
                continue;
            }
            if !visited.insert(edge.to) {
                continue;
            }
            if let Some(parent) = graph.node(edge.to).and_then(Node::as_symbol) {
                let (source, _) = cap_source(&parent.source, source_cap);
                parents.push(HierarchyEntry {
                    name: parent.name.clone(),
                    path: parent.path.clone(),
                    depth: depth + 1,
                    source: Some(source),
                });
            }
            queue.push_back((edge.to, depth + 1));
        }
    }

    // Children: direct inheritors only.
    let mut children = Vec::new();
    for (from, edge) in graph.in_edges(class_id) {
        if edge.kind != EdgeKind::Inherits {
            continue;
        }
        if let Some(child) = graph.node(from).and_then(Node::as_symbol) {
            children.push(HierarchyEntry {
                name: child.name.clone(),
                path: child.path.clone(),
                depth: 1,
                source: None,
            });
        }
    }

    ClassHierarchy {
        class: class_name,
        parents,
        children,
    }
}

fn imported_symbols_for_file(
    graph: &CodeGraph,
    repo: &str,
    path: &str,
    source_cap: usize,
    seen: &mut HashSet<String>,
) -> Vec<ImportedSymbol> {
    let Some(file_id) = graph.file(repo, path) else {
        return Vec::new();
    };
    let mut result = Vec::new();

    for edge in graph.out_edges(file_id) {
        if edge.kind != EdgeKind::Imports {
            continue;
        }
        let Some(imported_name) = edge
            .props
            .imported_name
            .clone()
            .or_else(|| edge.props.alias.clone())
            .filter(|n| n != "*")
        else {
            continue;
        };
        if !seen.insert(imported_name.clone()) {
            continue;
        }

        // Prefer a symbol defined in the imported file itself, then fall
        // back to any in-repo definition with that name.
        let target_path = graph
            .node(edge.to)
            .and_then(Node::as_file)
            .map(|f| f.path.clone());
        let candidate = graph
            .symbols_named(repo, &imported_name)
            .into_iter()
            .filter_map(|id| graph.node(id).and_then(Node::as_symbol))
            .filter(|s| {
                matches!(
                    s.kind,
                    SymbolKind::Function | SymbolKind::Class | SymbolKind::Struct
                )
            })
            .find(|s| match &target_path {
                Some(p) => &s.path == p,
                None => true,
            });
        let Some(symbol) = candidate else { continue };

        let (source, truncated) = cap_source(&symbol.source, source_cap);
        result.push(ImportedSymbol {
            name: imported_name,
            kind: symbol.kind.as_str().to_string(),
            path: symbol.path.clone(),
            line_number: symbol.line_number,
            source,
            truncated,
            docstring: symbol.docstring.clone(),
            from_file: path.to_string(),
        });
    }
    result
}

/// Truncate at the cap (on a char boundary) with an explicit marker.
pub fn cap_source(source: &str, cap: usize) -> (String, bool) {
    if source.len() <= cap {
        return (source.to_string(), false);
    }
    let mut boundary = cap;
    while boundary > 0 && !source.is_char_boundary(boundary) {
        boundary -= 1;
    }
    let mut out = source[..boundary].to_string();
    out.push_str(TRUNCATION_MARKER);
    (out, true)
}
