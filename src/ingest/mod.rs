//! Ingestion: enumeration, pre-scan, deferred resolution, and the two
//! pipelines (full rebuild and incremental update).

pub mod incremental;
pub mod pipeline;
pub mod prescan;
pub mod resolver;
pub mod walker;

pub use incremental::{IncrementalStats, IncrementalUpdater};
pub use pipeline::{IngestionPipeline, IngestionStats};
pub use prescan::build_imports_map;
pub use resolver::{resolve_calls, resolve_inheritance};
pub use walker::enumerate_source_files;
