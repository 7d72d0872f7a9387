use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use backstroke_worker::config;
use backstroke_worker::db;
use backstroke_worker::model::SyncJob;
use backstroke_worker::queue::{JobQueue, SqliteJobQueue};

#[derive(Debug, Parser)]
#[command(author, version, about = "Push a sync job read from a JSON file onto the queue")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// JSON file holding one job: {type, user, link, fromRequest?}
    job: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let raw = std::fs::read_to_string(&args.job)
        .with_context(|| format!("failed to read {}", args.job.display()))?;
    let job: SyncJob = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid sync job", args.job.display()))?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let id = SqliteJobQueue::new(pool).push(&job).await?;
    info!(job_id = id, link_id = job.link.id, kind = job.kind.as_str(), "job enqueued");
    println!("{}", id);
    Ok(())
}
