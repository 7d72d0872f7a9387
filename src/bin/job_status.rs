use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use backstroke_worker::config;
use backstroke_worker::db;
use backstroke_worker::queue::{SqliteStatusStore, StatusStore};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Print a job's outcome, a link's job history, or the number of pending jobs"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print the outcome record of this job as JSON
    #[arg(long, conflicts_with = "link")]
    job: Option<i64>,

    /// Print the ids of jobs run for this link, oldest first
    #[arg(long)]
    link: Option<i64>,
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

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;
    let store = SqliteStatusStore::new(pool.clone());

    if let Some(job_id) = args.job {
        let record = store
            .get(job_id)
            .await?
            .ok_or_else(|| anyhow!("job {} has no outcome yet", job_id))?;
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else if let Some(link_id) = args.link {
        for job_id in store.link_history(link_id).await? {
            println!("{}", job_id);
        }
    } else {
        println!("{}", db::count_pending_jobs(&pool).await?);
    }
    Ok(())
}
