//! `ckiller` command-line client.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ckiller_client::{render, ApiClient, ClientConfig, JobWatcher, RetryBudget, Transport};
use ckiller_models::{JobKind, ProjectId};

#[derive(Parser)]
#[command(name = "ckiller", version, about = "Narrated short-video generator client")]
struct Cli {
    /// API base URL
    #[arg(long, env = "CKILLER_API_URL")]
    api_url: Option<String>,

    /// Push reconnect budget: a number or "unbounded"
    #[arg(long)]
    retries: Option<RetryBudget>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a project for a source video
    Create { name: String, source_url: String },
    /// Start the description job
    Describe {
        project: String,
        /// Return right after the job starts
        #[arg(long)]
        detach: bool,
    },
    /// Generate commentary from the finished description
    Commentary { project: String },
    /// Start the video job
    Video {
        project: String,
        #[arg(long)]
        detach: bool,
    },
    /// Follow a running job until it ends
    Watch { project: String, kind: JobKind },
    /// Print the current state of a job
    Status { project: String, kind: JobKind },
    /// Download an artifact
    Download {
        project: String,
        name: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env();
    if let Some(url) = cli.api_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(budget) = cli.retries {
        config.retry_budget = budget;
    }
    let client = Arc::new(ApiClient::new(config).context("Failed to build HTTP client")?);

    match cli.command {
        Command::Create { name, source_url } => {
            let record = client.create_project(&name, &source_url, None).await?;
            println!("{}", record.id);
        }
        Command::Describe { project, detach } => {
            let project_id = ProjectId::from(project);
            client.start_description(&project_id).await?;
            if !detach {
                watch(&client, project_id, JobKind::Description).await?;
            }
        }
        Command::Commentary { project } => {
            let record = client.generate_commentary(&ProjectId::from(project)).await?;
            for segment in &record.commentary {
                println!("{} {}", segment.timestamp, segment.text);
            }
        }
        Command::Video { project, detach } => {
            let project_id = ProjectId::from(project);
            client.start_video(&project_id).await?;
            if !detach {
                watch(&client, project_id, JobKind::Video).await?;
            }
        }
        Command::Watch { project, kind } => {
            watch(&client, ProjectId::from(project), kind).await?;
        }
        Command::Status { project, kind } => {
            let project_id = ProjectId::from(project);
            let subtitles = subtitles_enabled(&client, &project_id).await?;
            let event = client.status(&project_id, kind).await?;
            print!("{}", render(&event.snapshot, subtitles));
        }
        Command::Download {
            project,
            name,
            output,
        } => {
            let bytes = client
                .download_artifact(&ProjectId::from(project), &name)
                .await?;
            let path = output.unwrap_or_else(|| PathBuf::from(&name));
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Saved {} bytes to {}", bytes.len(), path.display());
        }
    }

    Ok(())
}

async fn subtitles_enabled(client: &ApiClient, project_id: &ProjectId) -> Result<bool> {
    let record = client.get_project(project_id).await?;
    Ok(record.options.video.subtitles_enabled)
}

/// Follow a job, redrawing the step list on every accepted change.
async fn watch(client: &Arc<ApiClient>, project_id: ProjectId, kind: JobKind) -> Result<()> {
    let subtitles = subtitles_enabled(client, &project_id).await?;
    let watcher = JobWatcher::new(client.clone(), project_id, kind, client.config().clone());
    let mut updates = watcher.subscribe();

    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().as_ref().map(|e| e.snapshot.clone());
            if let Some(snapshot) = snapshot {
                println!("{}", render(&snapshot, subtitles));
            }
        }
    });

    let outcome = watcher.run().await;
    drop(watcher);
    let _ = printer.await;

    let event = outcome?;
    if let Some((step, message)) = event.snapshot.failure() {
        bail!("{} job failed at {}: {}", kind, step, message);
    }
    println!("{} job completed", kind);
    Ok(())
}
