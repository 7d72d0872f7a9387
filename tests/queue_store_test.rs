use serde_json::json;

use backstroke_worker::db;
use backstroke_worker::model::{
    ForkFailure, ManyOutput, Metrics, OutcomeOutput, OutcomeRecord, OutcomeStatus, SyncJob,
};
use backstroke_worker::queue::{JobQueue, SqliteJobQueue, SqliteStatusStore, StatusStore};

async fn setup_pool() -> db::Pool {
    let pool = db::init_pool("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

fn job(link_id: i64, kind: &str) -> SyncJob {
    serde_json::from_value(json!({
        "type": kind,
        "user": { "accessToken": "user-token" },
        "link": {
            "id": link_id,
            "enabled": true,
            "upstream": { "owner": "1egoman", "repo": "backstroke", "branch": "master" },
            "fork": { "type": "fork-all" },
        },
        "fromRequest": "req-1",
    }))
    .unwrap()
}

#[tokio::test]
async fn queue_hands_out_each_job_once_in_order() {
    let pool = setup_pool().await;
    let queue = SqliteJobQueue::new(pool.clone());

    let first = queue.push(&job(1, "MANUAL")).await.unwrap();
    let second = queue.push(&job(2, "AUTOMATIC")).await.unwrap();
    assert!(second > first);

    let claimed = queue.pop().await.unwrap().unwrap();
    assert_eq!(claimed.id, first);
    assert_eq!(claimed.kind, "MANUAL");
    let decoded: SyncJob = serde_json::from_str(&claimed.payload).unwrap();
    assert_eq!(decoded, job(1, "MANUAL"));

    let claimed = queue.pop().await.unwrap().unwrap();
    assert_eq!(claimed.id, second);
    assert_eq!(claimed.kind, "AUTOMATIC");

    assert!(queue.pop().await.unwrap().is_none());
}

#[tokio::test]
async fn store_keeps_outcomes_and_history() {
    let pool = setup_pool().await;
    let store = SqliteStatusStore::new(pool.clone());

    let record = OutcomeRecord::ok(
        OutcomeOutput::Many(ManyOutput {
            many: true,
            metrics: Metrics {
                total: 2,
                successes: 1,
            },
            errors: vec![ForkFailure::new(
                "Couldn't create pull request on repository b/two: boom",
            )],
            is_enabled: true,
        }),
        Some("req-1".into()),
    );
    let record_id = store.set(30, &record).await.unwrap();
    assert!(record_id > 0);
    assert_eq!(store.get(30).await.unwrap(), Some(record));
    assert_eq!(store.get(31).await.unwrap(), None);

    let stored = db::fetch_outcome(&pool, 30).await.unwrap().unwrap();
    assert_eq!(stored.status, OutcomeStatus::Ok.as_str());

    store.attach_to_link(8, 30).await.unwrap();
    store.attach_to_link(8, 12).await.unwrap();
    store.attach_to_link(9, 40).await.unwrap();
    assert_eq!(store.link_history(8).await.unwrap(), vec![30, 12]);
    assert_eq!(store.link_history(9).await.unwrap(), vec![40]);
}
