//! Snapshot persistence for the graph store.
//!
//! JSON snapshot written atomically (temp file + rename) so a crashed save
//! never leaves a half-written graph behind.

use std::fs;
use std::path::PathBuf;

use crate::error::{GraphError, GraphResult};
use crate::graph::store::{CodeGraph, GraphSnapshot};

pub struct GraphPersistence {
    base_path: PathBuf,
}

impl GraphPersistence {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn snapshot_path(&self) -> PathBuf {
        self.base_path.join("graph.json")
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path().exists()
    }

    #[must_use = "a failed save leaves only the previous snapshot on disk"]
    pub fn save(&self, graph: &CodeGraph) -> GraphResult<()> {
        fs::create_dir_all(&self.base_path).map_err(|e| GraphError::Persistence {
            path: self.base_path.clone(),
            source: e,
        })?;

        let data = serde_json::to_vec(&graph.to_snapshot())
            .map_err(|e| GraphError::Fatal(format!("snapshot serialization failed: {e}")))?;

        let tmp = self.snapshot_path().with_extension("tmp");
        fs::write(&tmp, data).map_err(|e| GraphError::Persistence {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, self.snapshot_path()).map_err(|e| GraphError::Persistence {
            path: self.snapshot_path(),
            source: e,
        })?;
        Ok(())
    }

    pub fn load(&self) -> GraphResult<CodeGraph> {
        let data = fs::read(self.snapshot_path()).map_err(|e| GraphError::Load {
            path: self.snapshot_path(),
            reason: e.to_string(),
        })?;
        let snapshot: GraphSnapshot =
            serde_json::from_slice(&data).map_err(|e| GraphError::Load {
                path: self.snapshot_path(),
                reason: e.to_string(),
            })?;
        Ok(CodeGraph::from_snapshot(snapshot))
    }

    /// Load when a snapshot exists, otherwise start empty.
    pub fn load_or_default(&self) -> GraphResult<CodeGraph> {
        if self.exists() {
            self.load()
        } else {
            Ok(CodeGraph::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let persistence = GraphPersistence::new(dir.path().to_path_buf());

        let mut graph = CodeGraph::new();
        graph.merge_repository("o/r", "o", "r", false);
        persistence.save(&graph).unwrap();
        assert!(persistence.exists());

        let loaded = persistence.load().unwrap();
        assert!(loaded.repository("o/r").is_some());
    }

    #[test]
    fn load_or_default_starts_empty() {
        let dir = TempDir::new().unwrap();
        let persistence = GraphPersistence::new(dir.path().join("nested"));
        let graph = persistence.load_or_default().unwrap();
        assert_eq!(graph.stats().repositories, 0);
    }
}
