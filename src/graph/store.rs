//! Embedded property-graph store.
//!
//! A `petgraph` stable graph holds the nodes and edges; keyed maps on top
//! give MERGE-by-tuple semantics, and stable indices keep held ids valid
//! through the delete-heavy incremental path. All methods take `&mut self`;
//! the shared handle in [`crate::graph::GraphStore`] provides the locking,
//! and a single write-lock acquisition is the transaction boundary.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::graph::model::{
    DirectoryNode, Edge, EdgeKind, EdgeProps, FileNode, ModuleNode, Node, NodeId, ParameterKey,
    ParameterNode, RepositoryNode, SymbolKey, SymbolNode, UnresolvedNode,
};

/// Edge payload stored in the graph; the endpoints live in the topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EdgeWeight {
    kind: EdgeKind,
    props: EdgeProps,
}

#[derive(Debug, Default)]
pub struct CodeGraph {
    graph: StableDiGraph<Node, EdgeWeight>,

    repos: HashMap<String, NodeId>,
    dirs: HashMap<(String, String), NodeId>,
    files: HashMap<(String, String), NodeId>,
    symbols: HashMap<SymbolKey, NodeId>,
    modules: HashMap<String, NodeId>,
    parameters: HashMap<ParameterKey, NodeId>,
    unresolved: HashMap<(String, String), NodeId>,
}

/// Serializable form: nodes and edges by value, keyed by the old index so
/// edges can be re-threaded on load. Key maps are rebuilt from the node
/// properties.
#[derive(Debug, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<(usize, Node)>,
    edges: Vec<SnapshotEdge>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEdge {
    from: usize,
    to: usize,
    kind: EdgeKind,
    #[serde(default)]
    props: EdgeProps,
}

impl CodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Node merges
    // ------------------------------------------------------------------

    pub fn merge_repository(
        &mut self,
        repo: &str,
        owner: &str,
        name: &str,
        is_dependency: bool,
    ) -> NodeId {
        if let Some(&id) = self.repos.get(repo) {
            if let Some(Node::Repository(r)) = self.graph.node_weight_mut(id) {
                r.owner = owner.to_string();
                r.name = name.to_string();
                r.is_dependency = is_dependency;
            }
            return id;
        }
        let id = self.graph.add_node(Node::Repository(RepositoryNode {
            repo: repo.to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
            is_dependency,
        }));
        self.repos.insert(repo.to_string(), id);
        id
    }

    pub fn merge_directory(&mut self, repo: &str, path: &str, name: &str) -> NodeId {
        let key = (repo.to_string(), path.to_string());
        if let Some(&id) = self.dirs.get(&key) {
            if let Some(Node::Directory(d)) = self.graph.node_weight_mut(id) {
                d.name = name.to_string();
            }
            return id;
        }
        let id = self.graph.add_node(Node::Directory(DirectoryNode {
            repo: repo.to_string(),
            path: path.to_string(),
            name: name.to_string(),
        }));
        self.dirs.insert(key, id);
        id
    }

    pub fn merge_file(&mut self, file: FileNode) -> NodeId {
        let key = (file.repo.clone(), file.path.clone());
        if let Some(&id) = self.files.get(&key) {
            if let Some(weight) = self.graph.node_weight_mut(id) {
                *weight = Node::File(file);
            }
            return id;
        }
        let id = self.graph.add_node(Node::File(file));
        self.files.insert(key, id);
        id
    }

    pub fn merge_symbol(&mut self, symbol: SymbolNode) -> NodeId {
        let key = SymbolKey {
            name: symbol.name.clone(),
            repo: symbol.repo.clone(),
            path: symbol.path.clone(),
            line_number: symbol.line_number,
        };
        if let Some(&id) = self.symbols.get(&key) {
            if let Some(weight) = self.graph.node_weight_mut(id) {
                *weight = Node::Symbol(symbol);
            }
            return id;
        }
        let id = self.graph.add_node(Node::Symbol(symbol));
        self.symbols.insert(key, id);
        id
    }

    pub fn merge_module(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.modules.get(name) {
            return id;
        }
        let id = self.graph.add_node(Node::Module(ModuleNode {
            name: name.to_string(),
        }));
        self.modules.insert(name.to_string(), id);
        id
    }

    pub fn merge_parameter(&mut self, param: ParameterNode) -> NodeId {
        let key = ParameterKey {
            name: param.name.clone(),
            repo: param.repo.clone(),
            path: param.path.clone(),
            function_line: param.function_line,
        };
        if let Some(&id) = self.parameters.get(&key) {
            return id;
        }
        let id = self.graph.add_node(Node::Parameter(param));
        self.parameters.insert(key, id);
        id
    }

    pub fn merge_unresolved(&mut self, repo: &str, name: &str) -> NodeId {
        let key = (repo.to_string(), name.to_string());
        if let Some(&id) = self.unresolved.get(&key) {
            return id;
        }
        let id = self.graph.add_node(Node::Unresolved(UnresolvedNode {
            repo: repo.to_string(),
            name: name.to_string(),
        }));
        self.unresolved.insert(key, id);
        id
    }

    // ------------------------------------------------------------------
    // Edge merge
    // ------------------------------------------------------------------

    /// Idempotent edge creation. Identity is `(kind, to)` plus
    /// `props.line_number` for IMPORTS and CALLS. Re-merging updates the
    /// mutable props in place.
    pub fn merge_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind, props: EdgeProps) {
        let line_keyed = matches!(kind, EdgeKind::Imports | EdgeKind::Calls);
        let existing = self
            .graph
            .edges_connecting(from, to)
            .find(|e| {
                e.weight().kind == kind
                    && (!line_keyed || e.weight().props.line_number == props.line_number)
            })
            .map(|e| e.id());
        match existing {
            Some(edge_id) => {
                if let Some(weight) = self.graph.edge_weight_mut(edge_id) {
                    weight.props = props;
                }
            }
            None => {
                self.graph.add_edge(from, to, EdgeWeight { kind, props });
            }
        }
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node_weight(id)
    }

    /// Outgoing edges of a node, as owned views.
    pub fn out_edges(&self, id: NodeId) -> Vec<Edge> {
        self.graph
            .edges(id)
            .map(|e| Edge {
                kind: e.weight().kind,
                to: e.target(),
                props: e.weight().props.clone(),
            })
            .collect()
    }

    /// Incoming edges as `(from, edge)` pairs.
    pub fn in_edges(&self, id: NodeId) -> Vec<(NodeId, Edge)> {
        self.graph
            .edges_directed(id, Direction::Incoming)
            .map(|e| {
                (
                    e.source(),
                    Edge {
                        kind: e.weight().kind,
                        to: id,
                        props: e.weight().props.clone(),
                    },
                )
            })
            .collect()
    }

    pub fn repository(&self, repo: &str) -> Option<NodeId> {
        self.repos.get(repo).copied()
    }

    pub fn file(&self, repo: &str, path: &str) -> Option<NodeId> {
        self.files.get(&(repo.to_string(), path.to_string())).copied()
    }

    pub fn directory(&self, repo: &str, path: &str) -> Option<NodeId> {
        self.dirs.get(&(repo.to_string(), path.to_string())).copied()
    }

    pub fn symbol(&self, key: &SymbolKey) -> Option<NodeId> {
        self.symbols.get(key).copied()
    }

    pub fn module(&self, name: &str) -> Option<NodeId> {
        self.modules.get(name).copied()
    }

    /// All files of a repository, sorted by path for deterministic output.
    pub fn files_in_repo(&self, repo: &str) -> Vec<NodeId> {
        let mut entries: Vec<_> = self
            .files
            .iter()
            .filter(|((r, _), _)| r == repo)
            .collect();
        entries.sort_by(|((_, a), _), ((_, b), _)| a.cmp(b));
        entries.into_iter().map(|(_, &id)| id).collect()
    }

    /// All symbols of a repository.
    pub fn symbols_in_repo(&self, repo: &str) -> Vec<NodeId> {
        self.symbols
            .iter()
            .filter(|(k, _)| k.repo == repo)
            .map(|(_, &id)| id)
            .collect()
    }

    /// Symbols of one file, ordered by line number.
    pub fn symbols_in_file(&self, repo: &str, path: &str) -> Vec<NodeId> {
        let mut entries: Vec<_> = self
            .symbols
            .iter()
            .filter(|(k, _)| k.repo == repo && k.path == path)
            .collect();
        entries.sort_by_key(|(k, _)| k.line_number);
        entries.into_iter().map(|(_, &id)| id).collect()
    }

    /// Symbols with a given name anywhere in the repository.
    pub fn symbols_named(&self, repo: &str, name: &str) -> Vec<NodeId> {
        let mut entries: Vec<_> = self
            .symbols
            .iter()
            .filter(|(k, _)| k.repo == repo && k.name == name)
            .collect();
        entries.sort_by(|(a, _), (b, _)| (&a.path, a.line_number).cmp(&(&b.path, b.line_number)));
        entries.into_iter().map(|(_, &id)| id).collect()
    }

    pub fn repositories(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.repos.values().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Node counts by label plus edge total, for the debug surface.
    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats::default();
        for node in self.graph.node_weights() {
            match node {
                Node::Repository(_) => stats.repositories += 1,
                Node::Directory(_) => stats.directories += 1,
                Node::File(_) => stats.files += 1,
                Node::Symbol(s) => {
                    stats.symbols += 1;
                    match s.kind {
                        crate::graph::model::SymbolKind::Class => stats.classes += 1,
                        crate::graph::model::SymbolKind::Function
                        | crate::graph::model::SymbolKind::Method => stats.functions += 1,
                        _ => {}
                    }
                }
                Node::Module(_) => stats.modules += 1,
                Node::Parameter(_) => stats.parameters += 1,
                Node::Unresolved(_) => stats.unresolved += 1,
            }
        }
        stats.edges = self.graph.edge_count();
        stats
    }

    /// Count of nodes carrying the given repo key, across every label.
    pub fn nodes_in_repo(&self, repo: &str) -> usize {
        self.graph
            .node_weights()
            .filter(|n| n.repo() == Some(repo))
            .count()
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// Nodes reachable over CONTAINS from `start` (not including `start`).
    pub fn contains_descendants(&self, start: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        let mut result = Vec::new();
        while let Some(id) = queue.pop_front() {
            for edge in self.graph.edges(id) {
                if edge.weight().kind == EdgeKind::Contains && seen.insert(edge.target()) {
                    result.push(edge.target());
                    queue.push_back(edge.target());
                }
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Remove a node and every edge touching it. The stable graph drops
    /// adjacent edges itself; this also clears the key-map entry.
    pub fn detach_delete(&mut self, id: NodeId) {
        let Some(node) = self.graph.remove_node(id) else {
            return;
        };
        match node {
            Node::Repository(r) => {
                self.repos.remove(&r.repo);
            }
            Node::Directory(d) => {
                self.dirs.remove(&(d.repo, d.path));
            }
            Node::File(f) => {
                self.files.remove(&(f.repo, f.path));
            }
            Node::Symbol(s) => {
                self.symbols.remove(&SymbolKey {
                    name: s.name,
                    repo: s.repo,
                    path: s.path,
                    line_number: s.line_number,
                });
            }
            Node::Module(m) => {
                self.modules.remove(&m.name);
            }
            Node::Parameter(p) => {
                self.parameters.remove(&ParameterKey {
                    name: p.name,
                    repo: p.repo,
                    path: p.path,
                    function_line: p.function_line,
                });
            }
            Node::Unresolved(u) => {
                self.unresolved.remove(&(u.repo, u.name));
            }
        }
    }

    /// Delete a file, its symbols (and their parameters), every edge in or
    /// out of them, then prune parent directories left without children.
    pub fn delete_file(&mut self, repo: &str, path: &str) -> bool {
        let Some(file_id) = self.file(repo, path) else {
            return false;
        };

        let mut doomed = self.contains_descendants(file_id);
        // Parameters hang off functions via HAS_PARAMETER, not CONTAINS.
        let mut params = Vec::new();
        for &id in &doomed {
            for edge in self.graph.edges(id) {
                if edge.weight().kind == EdgeKind::HasParameter {
                    params.push(edge.target());
                }
            }
        }
        doomed.extend(params);
        doomed.push(file_id);

        for id in doomed {
            self.detach_delete(id);
        }

        self.prune_empty_directories(repo, path);
        true
    }

    /// Walk the ancestor chain of `path`, deepest first, removing
    /// directories that no longer contain anything.
    fn prune_empty_directories(&mut self, repo: &str, path: &str) {
        let mut current = std::path::Path::new(path).parent();
        while let Some(dir) = current {
            let dir_str = dir.to_string_lossy();
            if dir_str.is_empty() {
                break;
            }
            if let Some(dir_id) = self.directory(repo, &dir_str) {
                let has_children = self
                    .graph
                    .edges(dir_id)
                    .any(|e| e.weight().kind == EdgeKind::Contains);
                if has_children {
                    break;
                }
                self.detach_delete(dir_id);
            }
            current = dir.parent();
        }
    }

    /// Cascade-delete everything owned by a repository. Returns false when
    /// the repository is unknown.
    pub fn delete_repository(&mut self, repo: &str) -> bool {
        if self.repository(repo).is_none() {
            return false;
        }
        let doomed: Vec<NodeId> = self
            .graph
            .node_indices()
            .filter(|&id| {
                self.graph
                    .node_weight(id)
                    .and_then(Node::repo)
                    == Some(repo)
            })
            .collect();
        for id in doomed {
            self.detach_delete(id);
        }
        true
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn to_snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<(usize, Node)> = self
            .graph
            .node_indices()
            .filter_map(|id| self.graph.node_weight(id).map(|n| (id.index(), n.clone())))
            .collect();
        nodes.sort_by_key(|(index, _)| *index);

        let mut edges: Vec<SnapshotEdge> = Vec::with_capacity(self.graph.edge_count());
        for id in self.graph.node_indices() {
            for e in self.graph.edges(id) {
                edges.push(SnapshotEdge {
                    from: id.index(),
                    to: e.target().index(),
                    kind: e.weight().kind,
                    props: e.weight().props.clone(),
                });
            }
        }
        edges.sort_by_key(|e| (e.from, e.to));

        GraphSnapshot { nodes, edges }
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut graph = CodeGraph::new();
        // Old indices are sparse after deletes; remap onto fresh ones.
        let mut remap: HashMap<usize, NodeId> = HashMap::with_capacity(snapshot.nodes.len());

        for (old_index, node) in snapshot.nodes {
            let id = graph.graph.add_node(node.clone());
            remap.insert(old_index, id);
            match node {
                Node::Repository(r) => {
                    graph.repos.insert(r.repo, id);
                }
                Node::Directory(d) => {
                    graph.dirs.insert((d.repo, d.path), id);
                }
                Node::File(f) => {
                    graph.files.insert((f.repo, f.path), id);
                }
                Node::Symbol(s) => {
                    graph.symbols.insert(
                        SymbolKey {
                            name: s.name,
                            repo: s.repo,
                            path: s.path,
                            line_number: s.line_number,
                        },
                        id,
                    );
                }
                Node::Module(m) => {
                    graph.modules.insert(m.name, id);
                }
                Node::Parameter(p) => {
                    graph.parameters.insert(
                        ParameterKey {
                            name: p.name,
                            repo: p.repo,
                            path: p.path,
                            function_line: p.function_line,
                        },
                        id,
                    );
                }
                Node::Unresolved(u) => {
                    graph.unresolved.insert((u.repo, u.name), id);
                }
            }
        }

        for edge in snapshot.edges {
            let (Some(&from), Some(&to)) = (remap.get(&edge.from), remap.get(&edge.to)) else {
                continue;
            };
            graph.graph.add_edge(
                from,
                to,
                EdgeWeight {
                    kind: edge.kind,
                    props: edge.props,
                },
            );
        }
        graph
    }
}

/// Node/edge counts for the stats surface.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub repositories: usize,
    pub directories: usize,
    pub files: usize,
    pub symbols: usize,
    pub classes: usize,
    pub functions: usize,
    pub modules: usize,
    pub parameters: usize,
    pub unresolved: usize,
    pub edges: usize,
}
