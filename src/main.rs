use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use repograph::api::{self, ApiState};
use repograph::config::Settings;
use repograph::github::{GitHubClient, RepositoryHost};
use repograph::graph::{ContextBuilder, GraphStore};
use repograph::ingest::IngestionPipeline;
use repograph::jobs::{FileJobTracker, JobTracker};
use repograph::queue::{HttpTaskQueue, TaskQueue};
use repograph::types::{Hunk, RepoId};
use repograph::worker::{self, WorkerContext};

#[derive(Parser)]
#[command(name = "repograph")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Code knowledge graph service for PR review context")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Ingest a local working tree into the graph
    Ingest {
        /// Path to the repository checkout
        path: std::path::PathBuf,

        /// Repository owner used as the graph key
        #[arg(long, default_value = "local")]
        owner: String,

        /// Repository name; defaults to the directory name
        #[arg(long)]
        name: Option<String>,

        /// Delete any existing graph data for this repository first
        #[arg(long)]
        clear: bool,
    },

    /// Run the API process (webhooks, queries, job dispatch)
    ServeApi {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:8080", env = "RG_API_BIND")]
        bind: String,
    },

    /// Run the worker process (task execution)
    ServeWorker {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:8081", env = "RG_WORKER_BIND")]
        bind: String,
    },

    /// Build diff context for one file range and print it as JSON
    Context {
        /// Repository key, `owner/name`
        #[arg(long)]
        repo: String,

        /// Repo-relative file path
        #[arg(long)]
        file: String,

        /// Changed line range, `start:end`
        #[arg(long)]
        lines: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load configuration")?;
    repograph::logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(force)?;
            println!("Wrote configuration to {}", path.display());
            Ok(())
        }

        Commands::Ingest {
            path,
            owner,
            name,
            clear,
        } => {
            let name = name.unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "repository".to_string())
            });
            let repo = RepoId::new(owner, name);
            let settings = Arc::new(settings);
            let store = Arc::new(GraphStore::open(&settings.data_dir, settings.limits.clone())?);

            let pipeline = IngestionPipeline::new(store, settings);
            let stats =
                tokio::task::spawn_blocking(move || pipeline.ingest_local(&repo, &path, clear))
                    .await??;

            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }

        Commands::ServeApi { bind } => {
            let settings = Arc::new(settings);
            let store = Arc::new(GraphStore::open(&settings.data_dir, settings.limits.clone())?);
            let tracker: Arc<dyn JobTracker> =
                Arc::new(FileJobTracker::new(settings.data_dir.join("jobs"))?);
            let queue: Arc<dyn TaskQueue> = Arc::new(HttpTaskQueue::from_config(&settings.queue));
            let host = build_host(&settings);

            let router = api::router(ApiState {
                settings: settings.clone(),
                store,
                tracker,
                queue,
                host,
            });

            repograph::log_event!("api", "listening", "{bind}");
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("cannot bind {bind}"))?;
            axum::serve(listener, router).await?;
            Ok(())
        }

        Commands::ServeWorker { bind } => {
            let settings = Arc::new(settings);
            let store = Arc::new(GraphStore::open(&settings.data_dir, settings.limits.clone())?);
            let tracker: Arc<dyn JobTracker> =
                Arc::new(FileJobTracker::new(settings.data_dir.join("jobs"))?);
            let host = build_host(&settings)
                .context("worker requires github.app_id and github.private_key_path")?;

            let router = worker::router(WorkerContext {
                settings: settings.clone(),
                store,
                tracker,
                host,
            });

            repograph::log_event!("worker", "listening", "{bind}");
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("cannot bind {bind}"))?;
            axum::serve(listener, router).await?;
            Ok(())
        }

        Commands::Context { repo, file, lines } => {
            let repo = RepoId::parse(&repo).context("repo must be 'owner/name'")?;
            let (start, end) = lines.split_once(':').context("lines must be 'start:end'")?;
            let hunk = Hunk {
                file_path: file,
                start_line: start.parse().context("invalid start line")?,
                end_line: end.parse().context("invalid end line")?,
            };
            let store = GraphStore::open(&settings.data_dir, settings.limits.clone())?;
            let context = ContextBuilder::new(&store).build_diff_context(&repo, &[hunk]);
            println!("{}", serde_json::to_string_pretty(&context)?);
            Ok(())
        }
    }
}

/// The host client exists only when app credentials are configured.
fn build_host(settings: &Settings) -> Option<Arc<dyn RepositoryHost>> {
    if settings.github.app_id.is_none() {
        return None;
    }
    match GitHubClient::from_config(&settings.github) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!("[main] github client unavailable: {e}");
            None
        }
    }
}
