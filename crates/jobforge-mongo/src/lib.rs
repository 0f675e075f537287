//! MongoDB `StorageProvider` implementation for jobforge-core.
//!
//! One collection per table-equivalent: `jobs`, `recurring_jobs`,
//! `background_job_servers`, `metadata`. Each `jobs` document stores the
//! full `Job` under an embedded `job` subdocument plus denormalized
//! top-level fields (`state`, `updated_at`, `scheduled_at`,
//! `recurring_job_id`, `signature`, `version`) that back the compound
//! indexes in [`indexes`]. A mutation's atomic group is a single
//! `findOneAndUpdate`/`findOneAndReplace` filtered on `(_id, version)`,
//! the same document-level CAS pattern the Postgres backend uses.

mod collections;
mod config;
mod indexes;

pub use collections::Collections;
pub use config::MongoConfig;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::TryStreamExt;
use jobforge_core::{
    BackgroundJobServer, Job, JobDetails, JobId, JobStats, JobState, MetadataRecord, Page,
    PageOrder, PageRequest, RecurringJob, StorageError, StorageProvider,
};
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{FindOneAndReplaceOptions, FindOptions, ReturnDocument};
use mongodb::{Client, Database};
use uuid::Uuid;

fn to_fatal(err: mongodb::error::Error) -> StorageError {
    StorageError::fatal(anyhow::Error::new(err))
}

fn map_mongo_error(err: mongodb::error::Error) -> StorageError {
    if err.is_network_error() || err.is_server_selection_error() {
        StorageError::transient(anyhow::Error::new(err))
    } else {
        to_fatal(err)
    }
}

fn job_to_document(job: &Job, state_key: &'static str) -> Result<Document, StorageError> {
    let job_doc = mongodb::bson::to_document(job).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?;
    let mut doc = doc! {
        "_id": job.id.to_string(),
        "version": job.version as i64,
        "state": state_key,
        "updated_at": mongodb::bson::DateTime::from_chrono(job.updated_at),
        "signature": job.signature(),
        "job": job_doc,
    };
    if let Some(scheduled_at) = job.scheduled_at() {
        doc.insert("scheduled_at", mongodb::bson::DateTime::from_chrono(scheduled_at));
    } else {
        doc.insert("scheduled_at", Bson::Null);
    }
    if let Some(recurring_job_id) = job.recurring_job_id() {
        doc.insert("recurring_job_id", recurring_job_id);
    } else {
        doc.insert("recurring_job_id", Bson::Null);
    }
    Ok(doc)
}

fn document_to_job(doc: &Document) -> Result<Job, StorageError> {
    let job_doc = doc
        .get_document("job")
        .map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?
        .clone();
    let mut job: Job = mongodb::bson::from_document(job_doc).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?;
    let version = doc.get_i64("version").map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?;
    job.version = version as u64;
    Ok(job)
}

fn sort_doc(order: PageOrder) -> Document {
    match order {
        PageOrder::UpdatedAtAsc => doc! { "updated_at": 1 },
        PageOrder::UpdatedAtDesc => doc! { "updated_at": -1 },
    }
}

/// A fully compliant `StorageProvider` backed by a `mongodb::Database`.
pub struct MongoStorageProvider {
    db: Database,
    collections: Collections,
}

impl MongoStorageProvider {
    pub fn new(db: Database, collections: Collections) -> Self {
        Self { db, collections }
    }

    pub async fn connect(config: &MongoConfig) -> Result<Self, StorageError> {
        let client = Client::with_uri_str(&config.mongodb_uri).await.map_err(to_fatal)?;
        let db = client.database(&config.database_name);
        let collections = Collections::with_prefix(&config.collection_prefix);
        Ok(Self::new(db, collections))
    }

    pub async fn ensure_indexes(&self) -> Result<(), StorageError> {
        indexes::ensure_indexes(&self.db, &self.collections).await.map_err(to_fatal)
    }

    fn jobs(&self) -> mongodb::Collection<Document> {
        self.db.collection(&self.collections.jobs)
    }

    fn recurring_jobs(&self) -> mongodb::Collection<Document> {
        self.db.collection(&self.collections.recurring_jobs)
    }

    fn servers(&self) -> mongodb::Collection<Document> {
        self.db.collection(&self.collections.background_job_servers)
    }

    fn metadata(&self) -> mongodb::Collection<Document> {
        self.db.collection(&self.collections.metadata)
    }
}

#[async_trait]
impl StorageProvider for MongoStorageProvider {
    async fn save_job(&self, job: Job) -> Result<Job, StorageError> {
        let jobs = self.jobs();

        if job.version == 0 {
            let mut to_insert = job.clone();
            to_insert.version = 1;
            let doc = job_to_document(&to_insert, to_insert.state().as_key())?;
            match jobs.insert_one(doc).await {
                Ok(_) => {
                    tracing::debug!(job_id = %to_insert.id, "inserted job");
                    Ok(to_insert)
                }
                Err(err) if is_duplicate_key(&err) => {
                    let existing = self.get_job_by_id(job.id).await?;
                    Err(StorageError::concurrent_modification(vec![existing]))
                }
                Err(err) => Err(map_mongo_error(err)),
            }
        } else {
            let mut updated = job.clone();
            updated.version = job.version + 1;
            let doc = job_to_document(&updated, updated.state().as_key())?;
            let filter = doc! { "_id": job.id.to_string(), "version": job.version as i64 };
            let result = jobs
                .find_one_and_replace(
                    filter,
                    doc,
                )
                .with_options(FindOneAndReplaceOptions::builder().return_document(ReturnDocument::After).build())
                .await
                .map_err(map_mongo_error)?;

            match result {
                Some(_) => {
                    tracing::debug!(job_id = %updated.id, version = updated.version, "updated job");
                    Ok(updated)
                }
                None => {
                    let existing = self.get_job_by_id(job.id).await?;
                    Err(StorageError::concurrent_modification(vec![existing]))
                }
            }
        }
    }

    async fn save_jobs(&self, jobs: Vec<Job>) -> Result<Vec<Job>, StorageError> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        let all_new = jobs.iter().all(|j| j.version == 0);
        let all_existing = jobs.iter().all(|j| j.version != 0);
        if !all_new && !all_existing {
            return Err(StorageError::invalid_argument(
                "save_jobs requires an all-new or all-existing batch",
            ));
        }

        let mut conflicts = Vec::new();
        let mut saved = Vec::with_capacity(jobs.len());
        for job in jobs {
            match self.save_job(job).await {
                Ok(s) => saved.push(s),
                Err(StorageError::ConcurrentJobModification { mut conflicts: c }) => {
                    conflicts.append(&mut c)
                }
                Err(e) => return Err(e),
            }
        }

        if !conflicts.is_empty() {
            return Err(StorageError::concurrent_modification(conflicts));
        }
        Ok(saved)
    }

    async fn get_job_by_id(&self, id: JobId) -> Result<Job, StorageError> {
        let doc = self
            .jobs()
            .find_one(doc! { "_id": id.to_string() })
            .await
            .map_err(map_mongo_error)?
            .ok_or_else(|| StorageError::job_not_found(id))?;
        document_to_job(&doc)
    }

    async fn delete_permanently(&self, id: JobId) -> Result<u64, StorageError> {
        let result = self
            .jobs()
            .delete_one(doc! { "_id": id.to_string() })
            .await
            .map_err(map_mongo_error)?;
        Ok(result.deleted_count)
    }

    async fn get_jobs(
        &self,
        state: JobState,
        updated_before: Option<DateTime<Utc>>,
        page: PageRequest,
    ) -> Result<Page<Job>, StorageError> {
        page.validate()?;
        let mut filter = doc! { "state": state.as_key() };
        if let Some(before) = updated_before {
            filter.insert("updated_at", doc! { "$lte": mongodb::bson::DateTime::from_chrono(before) });
        }

        let total = self.jobs().count_documents(filter.clone()).await.map_err(map_mongo_error)?;
        let options = FindOptions::builder()
            .sort(sort_doc(page.order))
            .skip(page.offset as u64)
            .limit(page.limit as i64)
            .build();
        let mut cursor = self.jobs().find(filter).with_options(options).await.map_err(map_mongo_error)?;

        let mut items = Vec::new();
        while let Some(doc) = cursor.try_next().await.map_err(map_mongo_error)? {
            items.push(document_to_job(&doc)?);
        }
        Ok(Page { total, items })
    }

    async fn get_scheduled_jobs(&self, before: DateTime<Utc>, page: PageRequest) -> Result<Page<Job>, StorageError> {
        page.validate()?;
        let filter = doc! {
            "state": JobState::Scheduled.as_key(),
            "scheduled_at": { "$lte": mongodb::bson::DateTime::from_chrono(before) },
        };
        let total = self.jobs().count_documents(filter.clone()).await.map_err(map_mongo_error)?;
        let options = FindOptions::builder()
            .sort(doc! { "scheduled_at": if page.order == PageOrder::UpdatedAtAsc { 1 } else { -1 } })
            .skip(page.offset as u64)
            .limit(page.limit as i64)
            .build();
        let mut cursor = self.jobs().find(filter).with_options(options).await.map_err(map_mongo_error)?;

        let mut items = Vec::new();
        while let Some(doc) = cursor.try_next().await.map_err(map_mongo_error)? {
            items.push(document_to_job(&doc)?);
        }
        Ok(Page { total, items })
    }

    async fn get_job_page(&self, state: JobState, page: PageRequest) -> Result<Page<Job>, StorageError> {
        self.get_jobs(state, None, page).await
    }

    async fn delete_jobs_permanently(&self, state: JobState, updated_before: DateTime<Utc>) -> Result<u64, StorageError> {
        let filter = doc! {
            "state": state.as_key(),
            "updated_at": { "$lte": mongodb::bson::DateTime::from_chrono(updated_before) },
        };
        let result = self.jobs().delete_many(filter).await.map_err(map_mongo_error)?;
        Ok(result.deleted_count)
    }

    async fn get_distinct_job_signatures(&self, states: &[JobState]) -> Result<Vec<String>, StorageError> {
        let keys: Vec<&str> = states.iter().map(JobState::as_key).collect();
        let values = self
            .jobs()
            .distinct("signature", doc! { "state": { "$in": keys } })
            .await
            .map_err(map_mongo_error)?;
        Ok(values
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect())
    }

    async fn exists(&self, details: &JobDetails, states: &[JobState]) -> Result<bool, StorageError> {
        let keys: Vec<&str> = states.iter().map(JobState::as_key).collect();
        let count = self
            .jobs()
            .count_documents(doc! { "signature": details.signature(), "state": { "$in": keys } })
            .await
            .map_err(map_mongo_error)?;
        Ok(count > 0)
    }

    async fn save_recurring_job(&self, recurring_job: RecurringJob) -> Result<RecurringJob, StorageError> {
        let job_doc = mongodb::bson::to_document(&recurring_job).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?;
        let doc = doc! { "_id": &recurring_job.id, "job": job_doc };
        self.recurring_jobs()
            .replace_one(doc! { "_id": &recurring_job.id }, doc)
            .upsert(true)
            .await
            .map_err(map_mongo_error)?;
        Ok(recurring_job)
    }

    async fn get_recurring_jobs(&self) -> Result<Vec<RecurringJob>, StorageError> {
        let mut cursor = self.recurring_jobs().find(doc! {}).await.map_err(map_mongo_error)?;
        let mut jobs = Vec::new();
        while let Some(doc) = cursor.try_next().await.map_err(map_mongo_error)? {
            let job_doc = doc.get_document("job").map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?.clone();
            jobs.push(mongodb::bson::from_document(job_doc).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?);
        }
        Ok(jobs)
    }

    async fn delete_recurring_job(&self, id: &str) -> Result<u64, StorageError> {
        let result = self.recurring_jobs().delete_one(doc! { "_id": id }).await.map_err(map_mongo_error)?;
        Ok(result.deleted_count)
    }

    async fn recurring_job_exists(&self, id: &str, states: &[JobState]) -> Result<bool, StorageError> {
        let keys: Vec<&str> = states.iter().map(JobState::as_key).collect();
        let count = self
            .jobs()
            .count_documents(doc! { "recurring_job_id": id, "state": { "$in": keys } })
            .await
            .map_err(map_mongo_error)?;
        Ok(count > 0)
    }

    async fn announce(&self, status: BackgroundJobServer) -> Result<BackgroundJobServer, StorageError> {
        let doc = server_to_document(&status)?;
        self.servers()
            .replace_one(doc! { "_id": status.id.to_string() }, doc)
            .upsert(true)
            .await
            .map_err(map_mongo_error)?;
        Ok(status)
    }

    async fn signal_alive(&self, status: BackgroundJobServer) -> Result<bool, StorageError> {
        let update = doc! {
            "$set": {
                "last_heartbeat": mongodb::bson::DateTime::from_chrono(status.last_heartbeat),
                "telemetry": mongodb::bson::to_bson(&status.telemetry).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?,
            }
        };
        let result = self
            .servers()
            .find_one_and_update(doc! { "_id": status.id.to_string() }, update)
            .with_options(mongodb::options::FindOneAndUpdateOptions::builder().return_document(ReturnDocument::After).build())
            .await
            .map_err(map_mongo_error)?
            .ok_or_else(|| StorageError::server_timed_out(status.id))?;
        result.get_bool("is_running").map_err(|e| StorageError::fatal(anyhow::Error::new(e)))
    }

    async fn signal_stopped(&self, id: Uuid) -> Result<(), StorageError> {
        self.servers().delete_one(doc! { "_id": id.to_string() }).await.map_err(map_mongo_error)?;
        Ok(())
    }

    async fn get_servers(&self) -> Result<Vec<BackgroundJobServer>, StorageError> {
        let options = FindOptions::builder().sort(doc! { "first_heartbeat": 1 }).build();
        let mut cursor = self.servers().find(doc! {}).with_options(options).await.map_err(map_mongo_error)?;
        let mut servers = Vec::new();
        while let Some(doc) = cursor.try_next().await.map_err(map_mongo_error)? {
            servers.push(document_to_server(&doc)?);
        }
        Ok(servers)
    }

    async fn get_longest_running(&self) -> Result<BackgroundJobServer, StorageError> {
        let options = FindOptions::builder().sort(doc! { "first_heartbeat": 1 }).limit(1).build();
        let doc = self
            .servers()
            .find(doc! {})
            .with_options(options)
            .await
            .map_err(map_mongo_error)?
            .try_next()
            .await
            .map_err(map_mongo_error)?
            .ok_or_else(|| StorageError::invalid_argument("no background job servers are registered"))?;
        document_to_server(&doc)
    }

    async fn remove_timed_out(&self, older_than: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = self
            .servers()
            .delete_many(doc! { "last_heartbeat": { "$lte": mongodb::bson::DateTime::from_chrono(older_than) } })
            .await
            .map_err(map_mongo_error)?;
        Ok(result.deleted_count)
    }

    async fn save_metadata(&self, metadata: MetadataRecord) -> Result<MetadataRecord, StorageError> {
        let doc = metadata_to_document(&metadata)?;
        self.metadata()
            .replace_one(doc! { "name": &metadata.name, "owner": &metadata.owner }, doc)
            .upsert(true)
            .await
            .map_err(map_mongo_error)?;
        Ok(metadata)
    }

    async fn get_metadata_by_name(&self, name: &str) -> Result<Vec<MetadataRecord>, StorageError> {
        let mut cursor = self.metadata().find(doc! { "name": name }).await.map_err(map_mongo_error)?;
        let mut records = Vec::new();
        while let Some(doc) = cursor.try_next().await.map_err(map_mongo_error)? {
            records.push(document_to_metadata(&doc)?);
        }
        Ok(records)
    }

    async fn get_metadata(&self, name: &str, owner: &str) -> Result<Option<MetadataRecord>, StorageError> {
        let doc = self
            .metadata()
            .find_one(doc! { "name": name, "owner": owner })
            .await
            .map_err(map_mongo_error)?;
        doc.as_ref().map(document_to_metadata).transpose()
    }

    async fn delete_metadata(&self, name: &str) -> Result<u64, StorageError> {
        let result = self.metadata().delete_many(doc! { "name": name }).await.map_err(map_mongo_error)?;
        Ok(result.deleted_count)
    }

    async fn get_job_stats(&self) -> Result<JobStats, StorageError> {
        let mut stats = JobStats::default();
        for state in JobState::ALL {
            let count = self
                .jobs()
                .count_documents(doc! { "state": state.as_key() })
                .await
                .map_err(map_mongo_error)?;
            match state {
                JobState::Awaiting => stats.awaiting = count,
                JobState::Scheduled => stats.scheduled = count,
                JobState::Enqueued => stats.enqueued = count,
                JobState::Processing => stats.processing = count,
                JobState::Succeeded => stats.succeeded = count,
                JobState::Failed => stats.failed = count,
                JobState::Deleted => stats.deleted = count,
            }
        }
        stats.recurring_jobs = self.recurring_jobs().count_documents(doc! {}).await.map_err(map_mongo_error)?;
        stats.background_job_servers = self.servers().count_documents(doc! {}).await.map_err(map_mongo_error)?;

        let counter = self
            .metadata()
            .find_one(doc! { "name": "succeeded-jobs-counter", "owner": "cluster" })
            .await
            .map_err(map_mongo_error)?;
        stats.all_time_succeeded = counter
            .and_then(|d| d.get_i64("value").ok())
            .unwrap_or(0) as u64;

        Ok(stats)
    }

    async fn publish_total_amount_of_succeeded_jobs(&self, n: u64) -> Result<(), StorageError> {
        self.metadata()
            .update_one(
                doc! { "name": "succeeded-jobs-counter", "owner": "cluster" },
                doc! { "$inc": { "value": n as i64 }, "$set": { "name": "succeeded-jobs-counter", "owner": "cluster" } },
            )
            .upsert(true)
            .await
            .map_err(map_mongo_error)?;
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(write_error))
            if write_error.code == 11000
    )
}

fn server_to_document(status: &BackgroundJobServer) -> Result<Document, StorageError> {
    Ok(doc! {
        "_id": status.id.to_string(),
        "name": status.name.clone(),
        "worker_pool_size": status.worker_pool_size as i32,
        "poll_interval_millis": status.poll_interval_millis as i64,
        "first_heartbeat": mongodb::bson::DateTime::from_chrono(status.first_heartbeat),
        "last_heartbeat": mongodb::bson::DateTime::from_chrono(status.last_heartbeat),
        "is_running": status.is_running,
        "telemetry": mongodb::bson::to_bson(&status.telemetry).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?,
    })
}

fn document_to_server(doc: &Document) -> Result<BackgroundJobServer, StorageError> {
    Ok(BackgroundJobServer {
        id: doc.get_str("_id").map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?.parse().map_err(|_| StorageError::fatal(anyhow::anyhow!("corrupt server id")))?,
        name: doc.get_str("name").ok().map(str::to_owned),
        worker_pool_size: doc.get_i32("worker_pool_size").map_err(|e| StorageError::fatal(anyhow::Error::new(e)))? as u32,
        poll_interval_millis: doc.get_i64("poll_interval_millis").map_err(|e| StorageError::fatal(anyhow::Error::new(e)))? as u64,
        first_heartbeat: doc.get_datetime("first_heartbeat").map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?.to_chrono(),
        last_heartbeat: doc.get_datetime("last_heartbeat").map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?.to_chrono(),
        is_running: doc.get_bool("is_running").map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?,
        telemetry: mongodb::bson::from_bson(doc.get("telemetry").cloned().unwrap_or(Bson::Null)).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?,
    })
}

fn metadata_to_document(metadata: &MetadataRecord) -> Result<Document, StorageError> {
    Ok(doc! {
        "name": &metadata.name,
        "owner": &metadata.owner,
        "value": mongodb::bson::to_bson(&metadata.value).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?,
        "created_at": mongodb::bson::DateTime::from_chrono(metadata.created_at),
        "updated_at": mongodb::bson::DateTime::from_chrono(metadata.updated_at),
    })
}

fn document_to_metadata(doc: &Document) -> Result<MetadataRecord, StorageError> {
    Ok(MetadataRecord {
        name: doc.get_str("name").map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?.to_owned(),
        owner: doc.get_str("owner").map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?.to_owned(),
        value: mongodb::bson::from_bson(doc.get("value").cloned().unwrap_or(Bson::Null)).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?,
        created_at: doc.get_datetime("created_at").map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?.to_chrono(),
        updated_at: doc.get_datetime("updated_at").map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?.to_chrono(),
    })
}
