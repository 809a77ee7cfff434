//! repograph: a code knowledge graph service.
//!
//! Source repositories are parsed with language-aware extractors into a
//! typed property graph (files, directories, symbols, imports, calls,
//! inheritance), kept current by diff-driven incremental updates, and
//! queried to assemble pull-request review context.

pub mod api;
pub mod config;
pub mod error;
pub mod github;
pub mod graph;
pub mod ingest;
pub mod jobs;
pub mod logging;
pub mod parsing;
pub mod queue;
pub mod types;
pub mod worker;

pub use config::Settings;
pub use error::{GraphError, HostError, IngestError, ParseError};
pub use graph::{ContextBuilder, GraphStore, GraphWriter};
pub use ingest::{IncrementalStats, IncrementalUpdater, IngestionPipeline, IngestionStats};
pub use parsing::{ExtractorSet, FileRecord, Language};
pub use types::{ChangeRecord, ChangeStatus, Hunk, ImportsMap, RepoId};
