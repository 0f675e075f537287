//! Integration tests against a real Redis instance.
//!
//! Gated behind `#[ignore]`: run with
//! `REDIS_URL=redis://... cargo test -p jobforge-redis -- --ignored`.
//! Each test uses a unique key prefix so runs don't collide.

use chrono::Utc;
use deadpool_redis::{Config as PoolConfig, Runtime};
use jobforge_core::{
    Job, JobDetails, JobState, PageRequest, StateHistoryEntry, StorageError, StorageProvider,
};
use jobforge_redis::RedisStorageProvider;
use uuid::Uuid;

fn provider(prefix: &str) -> RedisStorageProvider {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let pool = PoolConfig::from_url(url)
        .create_pool(Some(Runtime::Tokio1))
        .expect("failed to create pool");
    RedisStorageProvider::new(pool, prefix)
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
    let provider = provider(&unique_prefix("insert"));

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
    let provider = provider(&unique_prefix("conflict"));

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
async fn shared_signature_survives_until_last_holder_leaves_state() {
    let provider = provider(&unique_prefix("sig"));
    let details = JobDetails::new("Reports", "generate", "[]");

    let a = Job::new(details.clone(), StateHistoryEntry::new(JobState::Scheduled, Utc::now()));
    let b = Job::new(details.clone(), StateHistoryEntry::new(JobState::Scheduled, Utc::now()));
    let a = provider.save_job(a).await.unwrap();
    provider.save_job(b).await.unwrap();

    let mut a = a;
    a.transition(JobState::Enqueued, Utc::now(), None);
    provider.save_job(a).await.unwrap();

    assert!(provider.exists(&details, &[JobState::Scheduled]).await.unwrap());
}
