//! Integration tests against a real MongoDB instance.
//!
//! Gated behind `#[ignore]`: run with
//! `MONGODB_URI=mongodb://... cargo test -p jobforge-mongo -- --ignored`.
//! Each test uses a unique database name so runs don't collide.

use chrono::Utc;
use jobforge_core::{
    Job, JobDetails, JobState, PageRequest, StateHistoryEntry, StorageError, StorageProvider,
};
use jobforge_mongo::{Collections, MongoStorageProvider};
use mongodb::Client;
use uuid::Uuid;

async fn provider(label: &str) -> MongoStorageProvider {
    let uri = std::env::var("MONGODB_URI").expect("MONGODB_URI must be set for integration tests");
    let client = Client::with_uri_str(&uri).await.expect("failed to connect");
    let db_name = format!("jft_{label}_{}", Uuid::new_v4().simple());
    let db = client.database(&db_name);
    let provider = MongoStorageProvider::new(db, Collections::with_prefix(""));
    provider.ensure_indexes().await.expect("failed to create indexes");
    provider
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
    let provider = provider("insert").await;

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
    let provider = provider("conflict").await;

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
