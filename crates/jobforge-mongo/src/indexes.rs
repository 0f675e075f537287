//! Compound indexes mirroring the SQL backend's access paths:
//! state+updatedAt, state+scheduledAt, recurringJobId+state,
//! signature+state on the jobs collection, plus a unique name+owner index
//! on metadata.

use mongodb::bson::doc;
use mongodb::{Database, IndexModel};

use crate::collections::Collections;

pub async fn ensure_indexes(db: &Database, collections: &Collections) -> mongodb::error::Result<()> {
    let jobs = db.collection::<mongodb::bson::Document>(&collections.jobs);
    jobs.create_index(
        IndexModel::builder()
            .keys(doc! { "state": 1, "updated_at": 1 })
            .build(),
    )
    .await?;
    jobs.create_index(
        IndexModel::builder()
            .keys(doc! { "state": 1, "scheduled_at": 1 })
            .build(),
    )
    .await?;
    jobs.create_index(
        IndexModel::builder()
            .keys(doc! { "recurring_job_id": 1, "state": 1 })
            .build(),
    )
    .await?;
    jobs.create_index(
        IndexModel::builder()
            .keys(doc! { "signature": 1, "state": 1 })
            .build(),
    )
    .await?;

    let metadata = db.collection::<mongodb::bson::Document>(&collections.metadata);
    metadata
        .create_index(
            IndexModel::builder()
                .keys(doc! { "name": 1, "owner": 1 })
                .options(mongodb::options::IndexOptions::builder().unique(true).build())
                .build(),
        )
        .await?;

    let recurring = db.collection::<mongodb::bson::Document>(&collections.recurring_jobs);
    recurring
        .create_index(
            IndexModel::builder()
                .keys(doc! { "_id": 1 })
                .build(),
        )
        .await?;

    Ok(())
}
