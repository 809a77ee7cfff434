//! Job tracking.
//!
//! One record per ingestion / incremental job, with the uniqueness rule
//! that keeps concurrent writers off the same repository: while a job for
//! `(owner, repo_name)` is PENDING, DISPATCHED or RUNNING, creating another
//! returns the in-flight job instead.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{JobError, JobResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Dispatched,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Dispatched | JobStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub job_id: String,
    pub owner: String,
    pub repo_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub clear_existing: bool,
    pub status: JobStatus,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Final stats payload; shape depends on the job type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Task payload for a full repository ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionTaskPayload {
    pub job_id: String,
    pub owner: String,
    pub repo_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub clear_existing: bool,
}

/// Task payload for a PR-merge incremental update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementalPRPayload {
    pub job_id: String,
    pub owner: String,
    pub repo_name: String,
    pub pr_number: u64,
}

/// Task payload for a direct-push incremental update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementalPushPayload {
    pub job_id: String,
    pub owner: String,
    pub repo_name: String,
    pub before_sha: String,
    pub after_sha: String,
}

/// Short random id with a type prefix, e.g. `ing-4f1d2c9a07b3`.
pub fn new_job_id(prefix: &str) -> String {
    let suffix: u64 = rand::random::<u64>() & 0xffff_ffff_ffff;
    format!("{prefix}-{suffix:012x}")
}

/// Fields settable alongside a status transition.
#[derive(Debug, Default)]
pub struct StatusUpdate {
    pub stats: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

pub trait JobTracker: Send + Sync {
    /// Create a pending job record. Does not apply the uniqueness rule;
    /// callers go through [`JobTracker::create_unique`].
    fn create(&self, payload: &IngestionTaskPayload) -> JobResult<IngestionJob>;

    fn get(&self, job_id: &str) -> JobResult<Option<IngestionJob>>;

    fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        update: StatusUpdate,
    ) -> JobResult<()>;

    fn list_recent(&self, limit: usize) -> JobResult<Vec<IngestionJob>>;

    fn find_active(&self, owner: &str, repo_name: &str) -> JobResult<Option<IngestionJob>>;

    /// DuplicateJob guard: returns `(job, created)`. When an active job
    /// already exists for the repository, that job comes back with
    /// `created = false` and nothing is written.
    fn create_unique(&self, payload: &IngestionTaskPayload) -> JobResult<(IngestionJob, bool)> {
        if let Some(active) = self.find_active(&payload.owner, &payload.repo_name)? {
            return Ok((active, false));
        }
        Ok((self.create(payload)?, true))
    }
}

/// JSON-file-per-job tracker under the data directory.
pub struct FileJobTracker {
    dir: PathBuf,
}

impl FileJobTracker {
    pub fn new(dir: PathBuf) -> JobResult<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn job_path(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{job_id}.json"))
    }

    fn write(&self, job: &IngestionJob) -> JobResult<()> {
        let tmp = self.job_path(&job.job_id).with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(job)?)?;
        std::fs::rename(&tmp, self.job_path(&job.job_id))?;
        Ok(())
    }

    fn read_all(&self) -> JobResult<Vec<IngestionJob>> {
        let mut jobs = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read(&path)
                .map_err(JobError::from)
                .and_then(|data| serde_json::from_slice(&data).map_err(JobError::from))
            {
                Ok(job) => jobs.push(job),
                Err(e) => tracing::warn!("[jobs] skipping unreadable record {}: {e}", path.display()),
            }
        }
        Ok(jobs)
    }
}

impl JobTracker for FileJobTracker {
    fn create(&self, payload: &IngestionTaskPayload) -> JobResult<IngestionJob> {
        let now = Utc::now().to_rfc3339();
        let job = IngestionJob {
            job_id: payload.job_id.clone(),
            owner: payload.owner.clone(),
            repo_name: payload.repo_name.clone(),
            branch: payload.branch.clone(),
            clear_existing: payload.clear_existing,
            status: JobStatus::Pending,
            created_at: now.clone(),
            updated_at: now,
            started_at: None,
            completed_at: None,
            stats: None,
            error_message: None,
        };
        self.write(&job)?;
        crate::log_event!("jobs", "created", "{} for {}/{}", job.job_id, job.owner, job.repo_name);
        Ok(job)
    }

    fn get(&self, job_id: &str) -> JobResult<Option<IngestionJob>> {
        let path = self.job_path(job_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(path)?;
        Ok(Some(serde_json::from_slice(&data)?))
    }

    fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        update: StatusUpdate,
    ) -> JobResult<()> {
        let mut job = self
            .get(job_id)?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        let now = Utc::now().to_rfc3339();
        job.status = status;
        job.updated_at = now.clone();
        if status == JobStatus::Running {
            job.started_at = Some(now.clone());
        }
        if status.is_terminal() {
            job.completed_at = Some(now);
        }
        if update.stats.is_some() {
            job.stats = update.stats;
        }
        if update.error_message.is_some() {
            job.error_message = update.error_message;
        }
        self.write(&job)?;
        crate::log_event!("jobs", "status", "{job_id} -> {status:?}");
        Ok(())
    }

    fn list_recent(&self, limit: usize) -> JobResult<Vec<IngestionJob>> {
        let mut jobs = self.read_all()?;
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    fn find_active(&self, owner: &str, repo_name: &str) -> JobResult<Option<IngestionJob>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|j| j.owner == owner && j.repo_name == repo_name && j.status.is_active())
            .max_by(|a, b| a.created_at.cmp(&b.created_at)))
    }
}
