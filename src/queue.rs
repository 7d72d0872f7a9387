//! The queue jobs arrive on and the store their outcomes land in.
use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::db::{self, ClaimedJob, Pool};
use crate::model::{JobId, LinkId, OutcomeRecord, SyncJob};

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn push(&self, job: &SyncJob) -> Result<JobId>;

    /// Claims the next job, if any. A claimed job is never handed out again.
    async fn pop(&self) -> Result<Option<ClaimedJob>>;
}

#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Records the outcome of `job_id` and returns the record id.
    async fn set(&self, job_id: JobId, record: &OutcomeRecord) -> Result<i64>;

    async fn get(&self, job_id: JobId) -> Result<Option<OutcomeRecord>>;

    /// Appends `job_id` to the link's history.
    async fn attach_to_link(&self, link_id: LinkId, job_id: JobId) -> Result<()>;

    async fn link_history(&self, link_id: LinkId) -> Result<Vec<JobId>>;
}

#[derive(Debug, Clone)]
pub struct SqliteJobQueue {
    pool: Pool,
}

impl SqliteJobQueue {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn push(&self, job: &SyncJob) -> Result<JobId> {
        let payload = serde_json::to_string(job).context("failed to encode job")?;
        db::enqueue_job(&self.pool, job.kind.as_str(), &payload).await
    }

    async fn pop(&self) -> Result<Option<ClaimedJob>> {
        db::claim_next_job(&self.pool).await
    }
}

#[derive(Debug, Clone)]
pub struct SqliteStatusStore {
    pool: Pool,
}

impl SqliteStatusStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusStore for SqliteStatusStore {
    async fn set(&self, job_id: JobId, record: &OutcomeRecord) -> Result<i64> {
        let encoded = serde_json::to_string(record).context("failed to encode outcome")?;
        db::insert_outcome(&self.pool, job_id, record.status.as_str(), &encoded).await
    }

    async fn get(&self, job_id: JobId) -> Result<Option<OutcomeRecord>> {
        let Some(stored) = db::fetch_outcome(&self.pool, job_id).await? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&stored.record)
            .with_context(|| format!("stored outcome of job {} is not valid JSON", job_id))?;
        Ok(Some(record))
    }

    async fn attach_to_link(&self, link_id: LinkId, job_id: JobId) -> Result<()> {
        db::attach_job_to_link(&self.pool, link_id, job_id).await?;
        Ok(())
    }

    async fn link_history(&self, link_id: LinkId) -> Result<Vec<JobId>> {
        db::link_history(&self.pool, link_id).await
    }
}
