use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use backstroke_worker::config;
use backstroke_worker::db;
use backstroke_worker::git::GitCli;
use backstroke_worker::github::GitHubClient;
use backstroke_worker::queue::{SqliteJobQueue, SqliteStatusStore};
use backstroke_worker::worker::{BatchProcessor, RateLimitGuard};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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
    let bot = cfg.bot_credentials()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let git = GitCli::default().with_timeout(Duration::from_millis(cfg.github.git_timeout_ms));
    git.ensure_available().await?;

    let api = Arc::new(GitHubClient::from_config(&cfg.github)?);
    let processor = BatchProcessor::from_config(
        &cfg,
        api.clone(),
        Arc::new(git),
        Arc::new(SqliteJobQueue::new(pool.clone())),
        Arc::new(SqliteStatusStore::new(pool)),
    )?;
    let guard = RateLimitGuard::new(api, bot.token, cfg.app.min_rate_limit_remaining);
    let poll_sleep = Duration::from_millis(cfg.app.poll_interval_ms);

    info!(bot = %bot.username, "starting fork sync worker");
    loop {
        match guard.should_pause().await {
            Ok(true) => {
                tokio::time::sleep(poll_sleep).await;
                continue;
            }
            Ok(false) => {}
            Err(err) => error!(%err, "rate limit check failed"),
        }

        match processor.process_next().await {
            Ok(processed) => {
                if !processed {
                    tokio::time::sleep(poll_sleep).await;
                }
            }
            Err(err) => {
                error!(?err, "worker error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
