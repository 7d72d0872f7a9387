use super::model::{ClaimedJob, StoredOutcome};
use crate::model::{JobId, LinkId};
use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::Row;
use sqlx::SqlitePool;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    // In-memory databases are per connection; keep a single one so every query sees the same data.
    let max_connections = if normalized.starts_with("sqlite::memory") {
        1
    } else {
        5
    };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {}", normalized))?;
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Expands a leading `~/` in a file-backed SQLite URL, makes sure the parent
/// directory exists and asks SQLite to create the file. In-memory and
/// non-sqlite URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{}", expanded_path);
    match query_part {
        Some(q) if q.contains("mode=") => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            rebuilt.push_str("&mode=rwc");
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn enqueue_job(pool: &Pool, kind: &str, payload: &str) -> Result<JobId> {
    let rec = sqlx::query("INSERT INTO jobs (kind, payload) VALUES (?, ?) RETURNING id")
        .bind(kind)
        .bind(payload)
        .fetch_one(pool)
        .await?;
    Ok(rec.get::<i64, _>("id"))
}

/// Claims the oldest unclaimed job. The single UPDATE makes the claim atomic,
/// so a job is handed out at most once.
#[instrument(skip_all)]
pub async fn claim_next_job(pool: &Pool) -> Result<Option<ClaimedJob>> {
    let row = sqlx::query(
        "UPDATE jobs SET claimed_at = CURRENT_TIMESTAMP \
         WHERE id = (SELECT id FROM jobs WHERE claimed_at IS NULL ORDER BY id LIMIT 1) \
         RETURNING id, kind, payload",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| ClaimedJob {
        id: row.get("id"),
        kind: row.get("kind"),
        payload: row.get("payload"),
    }))
}

#[instrument(skip_all)]
pub async fn count_pending_jobs(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE claimed_at IS NULL")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Outcomes are written once per job; a second write for the same job fails.
#[instrument(skip_all)]
pub async fn insert_outcome(pool: &Pool, job_id: JobId, status: &str, record: &str) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO job_outcomes (job_id, status, record) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(job_id)
    .bind(status)
    .bind(record)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to store outcome of job {}", job_id))?;
    Ok(rec.get::<i64, _>("id"))
}

#[instrument(skip_all)]
pub async fn fetch_outcome(pool: &Pool, job_id: JobId) -> Result<Option<StoredOutcome>> {
    let row = sqlx::query("SELECT id, job_id, status, record FROM job_outcomes WHERE job_id = ?")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| StoredOutcome {
        id: row.get("id"),
        job_id: row.get("job_id"),
        status: row.get("status"),
        record: row.get("record"),
    }))
}

#[instrument(skip_all)]
pub async fn attach_job_to_link(pool: &Pool, link_id: LinkId, job_id: JobId) -> Result<i64> {
    let rec = sqlx::query("INSERT INTO link_jobs (link_id, job_id) VALUES (?, ?) RETURNING id")
        .bind(link_id)
        .bind(job_id)
        .fetch_one(pool)
        .await?;
    Ok(rec.get::<i64, _>("id"))
}

/// Job ids attached to a link, oldest first.
#[instrument(skip_all)]
pub async fn link_history(pool: &Pool, link_id: LinkId) -> Result<Vec<JobId>> {
    let ids: Vec<i64> =
        sqlx::query_scalar("SELECT job_id FROM link_jobs WHERE link_id = ? ORDER BY id")
            .bind(link_id)
            .fetch_all(pool)
            .await?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_pool() -> Pool {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[test]
    fn memory_urls_pass_through() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            prepare_sqlite_url("postgres://localhost/db"),
            "postgres://localhost/db"
        );
    }

    #[test]
    fn file_urls_get_create_mode() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested").join("backstroke.db");
        let url = format!("sqlite://{}", path.display());
        let prepared = prepare_sqlite_url(&url);
        assert_eq!(prepared, format!("sqlite://{}?mode=rwc", path.display()));
        assert!(path.parent().unwrap().exists());

        let prepared = prepare_sqlite_url(&format!("{}?mode=ro", url));
        assert!(prepared.ends_with("?mode=ro"));
    }

    #[tokio::test]
    async fn claim_is_fifo_and_once() {
        let pool = setup_pool().await;
        let first = enqueue_job(&pool, "MANUAL", "{\"n\":1}").await.unwrap();
        let second = enqueue_job(&pool, "AUTOMATIC", "{\"n\":2}").await.unwrap();
        assert_eq!(count_pending_jobs(&pool).await.unwrap(), 2);

        let job = claim_next_job(&pool).await.unwrap().unwrap();
        assert_eq!(job.id, first);
        assert_eq!(job.kind, "MANUAL");
        assert_eq!(job.payload, "{\"n\":1}");

        let job = claim_next_job(&pool).await.unwrap().unwrap();
        assert_eq!(job.id, second);
        assert!(claim_next_job(&pool).await.unwrap().is_none());
        assert_eq!(count_pending_jobs(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn outcome_written_once() {
        let pool = setup_pool().await;
        let job = enqueue_job(&pool, "MANUAL", "{}").await.unwrap();
        assert!(fetch_outcome(&pool, job).await.unwrap().is_none());

        insert_outcome(&pool, job, "OK", "{\"status\":\"OK\"}")
            .await
            .unwrap();
        let stored = fetch_outcome(&pool, job).await.unwrap().unwrap();
        assert_eq!(stored.job_id, job);
        assert_eq!(stored.status, "OK");

        assert!(insert_outcome(&pool, job, "ERROR", "{}").await.is_err());
    }

    #[tokio::test]
    async fn link_history_keeps_insertion_order() {
        let pool = setup_pool().await;
        attach_job_to_link(&pool, 8, 30).await.unwrap();
        attach_job_to_link(&pool, 9, 31).await.unwrap();
        attach_job_to_link(&pool, 8, 12).await.unwrap();
        assert_eq!(link_history(&pool, 8).await.unwrap(), vec![30, 12]);
        assert_eq!(link_history(&pool, 9).await.unwrap(), vec![31]);
        assert!(link_history(&pool, 10).await.unwrap().is_empty());
    }
}
