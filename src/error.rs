//! Error types for the code graph service.
//!
//! Structured errors via thiserror. The split mirrors the subsystem
//! boundaries: parsing, graph store, ingestion jobs, repository host, API.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the graph store and the graph writer.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("repository '{repo}' not found in graph")]
    RepositoryNotFound { repo: String },

    #[error("file '{path}' not found in repository '{repo}'")]
    FileNotFound { repo: String, path: String },

    #[error("failed to persist graph snapshot to '{path}': {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load graph snapshot from '{path}': {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("fulltext index operation failed during {operation}: {cause}")]
    Fulltext { operation: String, cause: String },

    /// Transient store failure. The writer retries these with backoff.
    #[error("transient store error: {0}")]
    Transient(String),

    #[error("graph store error: {0}")]
    Fatal(String),
}

impl GraphError {
    /// Whether the writer's retry loop should attempt this operation again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Per-file parse failures. Non-fatal: the pipeline records them in
/// `stats.errors` and moves on.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to initialize {language} grammar: {reason}")]
    GrammarInit { language: String, reason: String },

    #[error("failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{language} parser produced no tree for '{path}'")]
    NoTree { path: PathBuf, language: String },

    #[error("unsupported extension '{extension}' for '{path}'")]
    UnsupportedExtension { path: PathBuf, extension: String },
}

/// Errors that terminate an ingestion or incremental job.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("repository sync failed for {repo}: {reason}")]
    SyncFailed { repo: String, reason: String },

    #[error("scratch directory error: {0}")]
    Scratch(#[from] std::io::Error),
}

/// Errors from the repository host collaborator.
#[derive(Error, Debug)]
pub enum HostError {
    /// The app installation lacks access to the repository. 403-class.
    #[error("no access to {repo}: {reason}")]
    AccessDenied { repo: String, reason: String },

    #[error("git clone failed for {repo}: {stderr}")]
    CloneFailed { repo: String, stderr: String },

    #[error("git {operation} timed out after {seconds}s")]
    GitTimeout { operation: String, seconds: u64 },

    #[error("failed to build app token: {0}")]
    Token(String),

    #[error("host API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("host request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Errors surfaced by the task queue collaborator.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("task delivery to '{endpoint}' failed: {reason}")]
    Delivery { endpoint: String, reason: String },
}

/// Errors from the job tracker.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("job '{0}' not found")]
    NotFound(String),

    #[error("job store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job record corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type GraphResult<T> = Result<T, GraphError>;
pub type ParseResult<T> = Result<T, ParseError>;
pub type IngestResult<T> = Result<T, IngestError>;
pub type HostResult<T> = Result<T, HostError>;
pub type JobResult<T> = Result<T, JobError>;
