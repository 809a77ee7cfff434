//! Shared value types used across the ingestion and query layers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `name → [repo-relative defining paths]`, built by the pre-scanner and
/// consumed by the deferred resolvers. Job-local; dies with the job.
pub type ImportsMap = HashMap<String, Vec<String>>;

/// Repository identity: the `owner/name` string is the single join key for
/// everything stored in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// The `owner/name` form stored on every node.
    pub fn as_key(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Parse an `owner/name` string. Returns None when the slash is missing.
    pub fn parse(s: &str) -> Option<Self> {
        let (owner, name) = s.split_once('/')?;
        if owner.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(owner, name))
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// One contiguous changed range of a diff, in new-file coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
}

/// Status of a file in a push / PR comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Modified,
    Removed,
    Renamed,
}

/// A single changed file as reported by the repository host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub filename: String,
    pub status: ChangeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_filename: Option<String>,
}

impl ChangeRecord {
    pub fn new(filename: impl Into<String>, status: ChangeStatus) -> Self {
        Self {
            filename: filename.into(),
            status,
            previous_filename: None,
        }
    }

    pub fn renamed(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            filename: to.into(),
            status: ChangeStatus::Renamed,
            previous_filename: Some(from.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_id_roundtrip() {
        let id = RepoId::parse("acme/widgets").unwrap();
        assert_eq!(id.owner, "acme");
        assert_eq!(id.name, "widgets");
        assert_eq!(id.as_key(), "acme/widgets");
    }

    #[test]
    fn repo_id_rejects_bad_input() {
        assert!(RepoId::parse("no-slash").is_none());
        assert!(RepoId::parse("/name").is_none());
        assert!(RepoId::parse("owner/").is_none());
    }
}
