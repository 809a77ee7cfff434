//! Node and edge types of the property graph.
//!
//! Identity keys:
//! - Repository: `repo` (`owner/name`)
//! - Directory / File: `(repo, path)` with repo-relative paths
//! - Symbols: `(name, repo, path, line_number)`
//! - Module: `name` (imported package, shared across repositories)
//! - Parameter: `(name, repo, path, function_line)`
//! - UnresolvedSymbol: `(repo, name)`

use serde::{Deserialize, Serialize};

/// Node handle into the store's petgraph. Stable across removals, so held
/// ids stay valid while other nodes are deleted.
pub type NodeId = petgraph::stable_graph::NodeIndex;

/// Label of a symbol node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Trait,
    Struct,
    Enum,
    Union,
    Variable,
    Macro,
    Property,
    Record,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Trait => "trait",
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::Union => "union",
            SymbolKind::Variable => "variable",
            SymbolKind::Macro => "macro",
            SymbolKind::Property => "property",
            SymbolKind::Record => "record",
        }
    }

    /// Kinds a CALLS edge may target besides UnresolvedSymbol.
    pub fn is_callable_target(&self) -> bool {
        matches!(
            self,
            SymbolKind::Function | SymbolKind::Method | SymbolKind::Class | SymbolKind::Struct
        )
    }

    /// Kinds the pre-scanner exports into the imports map.
    pub fn is_exportable(&self) -> bool {
        matches!(
            self,
            SymbolKind::Function
                | SymbolKind::Class
                | SymbolKind::Trait
                | SymbolKind::Interface
                | SymbolKind::Struct
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryNode {
    pub repo: String,
    pub owner: String,
    pub name: String,
    pub is_dependency: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryNode {
    pub repo: String,
    pub path: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNode {
    pub repo: String,
    pub path: String,
    pub name: String,
    pub language: String,
    pub lines_count: u32,
    /// Full text, absent above the storage cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,
    pub is_dependency: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolNode {
    pub kind: SymbolKind,
    pub name: String,
    pub repo: String,
    pub path: String,
    pub line_number: u32,
    pub end_line: u32,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub bases: Vec<String>,
    #[serde(default)]
    pub decorators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cyclomatic_complexity: Option<u32>,
    #[serde(default)]
    pub is_dependency: bool,
}

/// Imported package that resolved outside the repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleNode {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterNode {
    pub name: String,
    pub repo: String,
    pub path: String,
    pub function_line: u32,
}

/// Placeholder target for CALLS edges that no in-repo definition matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnresolvedNode {
    pub repo: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "label", rename_all = "snake_case")]
pub enum Node {
    Repository(RepositoryNode),
    Directory(DirectoryNode),
    File(FileNode),
    Symbol(SymbolNode),
    Module(ModuleNode),
    Parameter(ParameterNode),
    Unresolved(UnresolvedNode),
}

impl Node {
    pub fn repo(&self) -> Option<&str> {
        match self {
            Node::Repository(n) => Some(&n.repo),
            Node::Directory(n) => Some(&n.repo),
            Node::File(n) => Some(&n.repo),
            Node::Symbol(n) => Some(&n.repo),
            Node::Parameter(n) => Some(&n.repo),
            Node::Unresolved(n) => Some(&n.repo),
            Node::Module(_) => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&SymbolNode> {
        match self {
            Node::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Node::File(f) => Some(f),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    Contains,
    Imports,
    Calls,
    Inherits,
    Implements,
    HasParameter,
    Includes,
}

/// Edge properties. Which fields are meaningful depends on the kind; the
/// identity tuple per kind is enforced by the store's merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_call_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_resolved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

/// Outgoing-edge view handed back by the store's adjacency queries.
#[derive(Debug, Clone)]
pub struct Edge {
    pub kind: EdgeKind,
    pub to: NodeId,
    pub props: EdgeProps,
}

/// Identity key of a symbol node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolKey {
    pub name: String,
    pub repo: String,
    pub path: String,
    pub line_number: u32,
}

/// Identity key of a parameter node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterKey {
    pub name: String,
    pub repo: String,
    pub path: String,
    pub function_line: u32,
}
