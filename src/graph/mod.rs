//! The property-graph store and everything that reads or writes it.
//!
//! [`GraphStore`] is the shared handle: a petgraph-backed keyed graph
//! behind a RwLock, the tantivy fulltext indexes, and snapshot persistence.
//! One write-lock acquisition is one transaction; reads run concurrently
//! and tolerate mid-ingest state.

pub mod callers;
pub mod fulltext;
pub mod model;
pub mod persistence;
pub mod queries;
pub mod store;
pub mod writer;

use std::path::Path;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::LimitsConfig;
use crate::error::GraphResult;
pub use callers::{FallbackCaller, scan_callers};
pub use fulltext::{CodeSearchHit, FileSearchHit, FulltextIndex};
pub use model::{EdgeKind, EdgeProps, Node, NodeId, SymbolKind};
pub use persistence::GraphPersistence;
pub use queries::{ContextBuilder, DiffContext};
pub use store::{CodeGraph, GraphStats};
pub use writer::{CallEdgeSpec, GraphWriter, InheritEdgeSpec, InheritKind};

pub struct GraphStore {
    graph: RwLock<CodeGraph>,
    fulltext: FulltextIndex,
    persistence: Option<GraphPersistence>,
    limits: LimitsConfig,
}

impl GraphStore {
    /// Open (or create) the on-disk store under `data_dir`.
    pub fn open(data_dir: &Path, limits: LimitsConfig) -> GraphResult<Self> {
        let persistence = GraphPersistence::new(data_dir.join("graph"));
        let graph = persistence.load_or_default()?;
        let fulltext = FulltextIndex::open(&data_dir.join("fulltext"))?;
        Ok(Self {
            graph: RwLock::new(graph),
            fulltext,
            persistence: Some(persistence),
            limits,
        })
    }

    /// Ephemeral store: RAM-backed fulltext, no snapshots. Used by tests.
    pub fn in_memory(limits: LimitsConfig) -> GraphResult<Self> {
        Ok(Self {
            graph: RwLock::new(CodeGraph::new()),
            fulltext: FulltextIndex::in_ram()?,
            persistence: None,
            limits,
        })
    }

    pub fn graph(&self) -> RwLockReadGuard<'_, CodeGraph> {
        self.graph.read()
    }

    pub(crate) fn graph_mut(&self) -> RwLockWriteGuard<'_, CodeGraph> {
        self.graph.write()
    }

    pub fn fulltext(&self) -> &FulltextIndex {
        &self.fulltext
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Snapshot the graph to disk. No-op for in-memory stores.
    pub fn save(&self) -> GraphResult<()> {
        if let Some(persistence) = &self.persistence {
            persistence.save(&self.graph.read())?;
        }
        Ok(())
    }
}
