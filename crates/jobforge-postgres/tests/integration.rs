//! Integration tests against a real Postgres instance.
//!
//! Gated behind `#[ignore]`: run with
//! `DATABASE_URL=postgres://... cargo test -p jobforge-postgres -- --ignored`.
//! Each test creates its own table prefix so runs don't collide.

use chrono::Utc;
use jobforge_core::{
    Job, JobDetails, JobState, PageRequest, StateHistoryEntry, StorageError, StorageProvider,
};
use jobforge_postgres::{DatabaseOptions, PgStorageProvider};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn provider(prefix: &str) -> PgStorageProvider {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to connect");
    let provider = PgStorageProvider::new(pool, prefix);
    provider
        .ensure_schema(DatabaseOptions::Create)
        .await
        .expect("failed to create schema");
    provider
}

fn unique_prefix(label: &str) -> String {
    format!("jft_{label}_{}", Uuid::new_v4().simple())
}

fn new_job(state: JobState) -> Job {
    Job::new(
        JobDetails::new("Reports", "generate", "[]"),
        StateHistoryEntry::new(state, Utc::now()),
    )
}

#[tokio::test]
#[ignore]
async fn insert_then_page_and_exists() {
    let prefix = unique_prefix("insert");
    let provider = provider(&prefix).await;

    let job = new_job(JobState::Enqueued);
    let details = job.job_details.clone();
    let saved = provider.save_job(job).await.expect("insert should succeed");
    assert_eq!(saved.version, 1);

    let page = provider
        .get_job_page(JobState::Enqueued, PageRequest::asc(0, 10))
        .await
        .expect("page read should succeed");
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, saved.id);

    let exists = provider
        .exists(&details, &[JobState::Enqueued])
        .await
        .expect("exists check should succeed");
    assert!(exists);
}

#[tokio::test]
#[ignore]
async fn concurrent_save_one_wins() {
    let prefix = unique_prefix("conflict");
    let provider = provider(&prefix).await;

    let job = new_job(JobState::Awaiting);
    let saved = provider.save_job(job).await.expect("insert should succeed");

    let mut a = saved.clone();
    a.transition(JobState::Enqueued, Utc::now(), None);
    let mut b = saved.clone();
    b.transition(JobState::Scheduled, Utc::now(), None);

    let first = provider.save_job(a).await.expect("first update should win");
    assert_eq!(first.version, 2);

    let err = provider.save_job(b).await.expect_err("stale version should conflict");
    assert!(matches!(err, StorageError::ConcurrentJobModification { .. }));
}

#[tokio::test]
#[ignore]
async fn delete_jobs_permanently_respects_cutoff() {
    let prefix = unique_prefix("cutoff");
    let provider = provider(&prefix).await;

    let older = new_job(JobState::Succeeded);
    let older_id = older.id;
    provider.save_job(older).await.unwrap();

    let cutoff = Utc::now();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let newer = new_job(JobState::Succeeded);
    provider.save_job(newer).await.unwrap();

    let deleted = provider
        .delete_jobs_permanently(JobState::Succeeded, cutoff)
        .await
        .expect("cutoff delete should succeed");
    assert_eq!(deleted, 1);
    assert!(provider.get_job_by_id(older_id).await.is_err());
}

#[tokio::test]
#[ignore]
async fn metadata_roundtrip() {
    let prefix = unique_prefix("metadata");
    let provider = provider(&prefix).await;

    let record = jobforge_core::MetadataRecord {
        name: "disk-space".into(),
        owner: "server-1".into(),
        value: serde_json::json!({"free_mb": 1024}),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    provider.save_metadata(record.clone()).await.expect("save should succeed");

    let fetched = provider
        .get_metadata("disk-space", "server-1")
        .await
        .expect("get should succeed");
    assert!(fetched.is_some());
    assert_eq!(fetched.unwrap().value, record.value);
}
