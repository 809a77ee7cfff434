//! Layered configuration for both the API and worker processes.
//!
//! Sources, later wins:
//! - built-in defaults
//! - `.repograph/settings.toml` (found by walking up from the cwd)
//! - environment variables prefixed `RG_`, with `__` separating nesting:
//!   `RG_WORKER__PARSE_THREADS=4` sets `worker.parse_threads`.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub const CONFIG_DIR: &str = ".repograph";
pub const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Root directory for the graph snapshot, fulltext index and job records.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub github: GithubConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GitHub App credentials. Both processes read these; the worker uses them
/// for clone/compare, the API for webhook-triggered PR file listings.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GithubConfig {
    /// Numeric GitHub App id.
    #[serde(default)]
    pub app_id: Option<u64>,

    /// Path to the app's RSA private key (PEM).
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    /// API base, overridable for GitHub Enterprise.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueueConfig {
    /// Base URL of the worker process the queue delivers to.
    #[serde(default = "default_worker_url")]
    pub worker_url: String,

    /// Bearer token attached to every delivery.
    #[serde(default)]
    pub identity_token: Option<String>,

    /// Dispatch deadline per task, seconds.
    #[serde(default = "default_dispatch_deadline")]
    pub dispatch_deadline_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkerConfig {
    /// Threads for the per-file parse pool. 0 means `min(cpus, 8)`.
    #[serde(default)]
    pub parse_threads: usize,

    /// Scratch root for clones. Defaults to the system temp dir.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    /// Directory names never descended into during enumeration.
    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,
}

/// Bounds fixed by the query contracts; exposed here so operators can tune
/// them without a rebuild.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LimitsConfig {
    /// Source text stored on File nodes only up to this size.
    #[serde(default = "default_max_source_bytes")]
    pub max_file_source_bytes: usize,

    /// Caller-fallback scanner skips files larger than this.
    #[serde(default = "default_scan_max_bytes")]
    pub caller_scan_max_file_bytes: usize,

    #[serde(default = "default_hierarchy_depth")]
    pub hierarchy_depth: usize,

    #[serde(default = "default_impact_depth")]
    pub impact_depth: usize,

    #[serde(default = "default_callers_limit")]
    pub callers_limit: usize,

    #[serde(default = "default_dependencies_limit")]
    pub dependencies_limit: usize,

    /// Per-symbol source cap for primary (affected) symbols.
    #[serde(default = "default_primary_cap")]
    pub primary_source_cap: usize,

    /// Per-symbol source cap for imported collateral symbols.
    #[serde(default = "default_collateral_cap")]
    pub collateral_source_cap: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,

    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".repograph/data")
}
fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_worker_url() -> String {
    "http://127.0.0.1:8081".to_string()
}
fn default_dispatch_deadline() -> u64 {
    30 * 60
}
fn default_ignore_dirs() -> Vec<String> {
    [
        "node_modules",
        ".git",
        "__pycache__",
        ".venv",
        "venv",
        "dist",
        "build",
        "target",
        "vendor",
        ".next",
        ".tox",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_max_source_bytes() -> usize {
    2 * 1024 * 1024
}
fn default_scan_max_bytes() -> usize {
    500 * 1024
}
fn default_hierarchy_depth() -> usize {
    5
}
fn default_impact_depth() -> usize {
    3
}
fn default_callers_limit() -> usize {
    10
}
fn default_dependencies_limit() -> usize {
    15
}
fn default_primary_cap() -> usize {
    10_000
}
fn default_collateral_cap() -> usize {
    5_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            github: GithubConfig::default(),
            queue: QueueConfig::default(),
            worker: WorkerConfig::default(),
            limits: LimitsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_url: default_worker_url(),
            identity_token: None,
            dispatch_deadline_secs: default_dispatch_deadline(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            parse_threads: 0,
            scratch_dir: None,
            ignore_dirs: default_ignore_dirs(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_source_bytes: default_max_source_bytes(),
            caller_scan_max_file_bytes: default_scan_max_bytes(),
            hierarchy_depth: default_hierarchy_depth(),
            impact_depth: default_impact_depth(),
            callers_limit: default_callers_limit(),
            dependencies_limit: default_dependencies_limit(),
            primary_source_cap: default_primary_cap(),
            collateral_source_cap: default_collateral_cap(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl WorkerConfig {
    /// Effective parse pool size: explicit value, or `min(cpus, 8)`.
    pub fn effective_parse_threads(&self) -> usize {
        if self.parse_threads > 0 {
            self.parse_threads
        } else {
            num_cpus::get().min(8)
        }
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

impl Settings {
    /// Load from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        let config_path = Self::find_config_file()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load from a specific TOML file plus env overrides.
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("RG_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
    }

    /// Walk up from the cwd looking for `.repograph/settings.toml`.
    fn find_config_file() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        for ancestor in current.ancestors() {
            let candidate = ancestor.join(CONFIG_DIR).join(CONFIG_FILE);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }

    /// Persist as pretty TOML, creating parent directories.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Write a default settings file into `.repograph/`.
    pub fn init_config_file(force: bool) -> anyhow::Result<PathBuf> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);
        if !force && config_path.exists() {
            anyhow::bail!("configuration already exists at {} (use --force to overwrite)",
                config_path.display());
        }
        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.limits.hierarchy_depth, 5);
        assert_eq!(settings.limits.callers_limit, 10);
        assert_eq!(settings.limits.dependencies_limit, 15);
        assert_eq!(settings.limits.max_file_source_bytes, 2 * 1024 * 1024);
        assert!(settings.worker.effective_parse_threads() >= 1);
        assert!(settings.worker.ignore_dirs.contains(&"node_modules".to_string()));
    }

    #[test]
    fn load_from_toml_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(
            &path,
            r#"
data_dir = "/var/lib/repograph"

[worker]
parse_threads = 2

[limits]
callers_limit = 3

[queue]
worker_url = "http://worker:9000"
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/var/lib/repograph"));
        assert_eq!(settings.worker.parse_threads, 2);
        assert_eq!(settings.limits.callers_limit, 3);
        assert_eq!(settings.queue.worker_url, "http://worker:9000");
        // untouched values keep their defaults
        assert_eq!(settings.limits.dependencies_limit, 15);
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");

        let mut settings = Settings::default();
        settings.limits.hierarchy_depth = 7;
        settings.save(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.limits.hierarchy_depth, 7);
    }
}
