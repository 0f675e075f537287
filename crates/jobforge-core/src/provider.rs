//! The Storage Abstraction: one async trait every backend implements.
//!
//! Load/save pairs return a typed error, and updates carry an expected
//! version for optimistic concurrency, covering the full operation set a
//! job-processing engine's persistence core needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StorageError;
use crate::model::{
    BackgroundJobServer, Job, JobDetails, JobId, JobStats, MetadataRecord, Page, PageRequest,
    RecurringJob,
};

/// The uniform contract all backends implement: job operations,
/// recurring-job operations, server liveness, and metadata/stats.
///
/// Every mutating method here corresponds to exactly one backend atomic
/// group: primary write, implied index removals, implied index additions,
/// version write, all-or-nothing. See `crate::index` for the pure
/// write-set computation and `crate::arbiter` for the version-check
/// protocol a conforming implementation runs before committing.
#[async_trait]
pub trait StorageProvider: Send + Sync + 'static {
    // ---- Job operations ----------------------------------------------

    /// Insert (`job.version == 0`) or update an existing job.
    ///
    /// Insert fails `ConcurrentJobModification` if a job with that id
    /// already exists. Update fails `ConcurrentJobModification` if the
    /// stored version doesn't match `job.version`. On success the stored
    /// version becomes `job.version + 1` and the returned job reflects it.
    async fn save_job(&self, job: Job) -> Result<Job, StorageError>;

    /// All-new-or-all-existing batch save. A mixed batch fails
    /// `InvalidArgument` before any write is attempted. For an
    /// all-existing batch, every job is arbitrated independently; any
    /// version-check failures are collected and returned together rather
    /// than fast-failing on the first one.
    async fn save_jobs(&self, jobs: Vec<Job>) -> Result<Vec<Job>, StorageError>;

    /// Fails `JobNotFound` if no job exists with this id.
    async fn get_job_by_id(&self, id: JobId) -> Result<Job, StorageError>;

    /// Removes the primary record and all index entries. Returns 0 or 1.
    async fn delete_permanently(&self, id: JobId) -> Result<u64, StorageError>;

    /// Paginated read of one state's queue. `updated_before` narrows to
    /// jobs at or before that instant when present. `page.order` other
    /// than ascending/descending by `updatedAt` fails `InvalidArgument`.
    async fn get_jobs(
        &self,
        state: crate::model::JobState,
        updated_before: Option<DateTime<Utc>>,
        page: PageRequest,
    ) -> Result<Page<Job>, StorageError>;

    /// SCHEDULED jobs with fire-at instant at or before `before`.
    async fn get_scheduled_jobs(
        &self,
        before: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Page<Job>, StorageError>;

    /// Total count for `state` plus one page of results.
    async fn get_job_page(
        &self,
        state: crate::model::JobState,
        page: PageRequest,
    ) -> Result<Page<Job>, StorageError>;

    /// Scans the state queue in ascending `updatedAt`, deleting jobs with
    /// `updatedAt <= updated_before`, stopping at the first job beyond the
    /// cutoff. Restartable: interruption leaves the store valid. Returns
    /// the count actually deleted.
    async fn delete_jobs_permanently(
        &self,
        state: crate::model::JobState,
        updated_before: DateTime<Utc>,
    ) -> Result<u64, StorageError>;

    /// Union of `signature-by-state` across the given states.
    async fn get_distinct_job_signatures(
        &self,
        states: &[crate::model::JobState],
    ) -> Result<Vec<String>, StorageError>;

    /// True iff `signature(details)` is present in `signature-by-state[s]`
    /// for any `s` in `states`.
    async fn exists(
        &self,
        details: &JobDetails,
        states: &[crate::model::JobState],
    ) -> Result<bool, StorageError>;

    // ---- Recurring-job operations -------------------------------------

    async fn save_recurring_job(&self, recurring_job: RecurringJob) -> Result<RecurringJob, StorageError>;

    async fn get_recurring_jobs(&self) -> Result<Vec<RecurringJob>, StorageError>;

    /// Returns the removed count (0 or 1); absence is not an error.
    async fn delete_recurring_job(&self, id: &str) -> Result<u64, StorageError>;

    async fn recurring_job_exists(
        &self,
        id: &str,
        states: &[crate::model::JobState],
    ) -> Result<bool, StorageError>;

    // ---- Server operations ---------------------------------------------

    /// Inserts or overwrites the server record; idempotent across restarts
    /// with the same id.
    async fn announce(&self, status: BackgroundJobServer) -> Result<BackgroundJobServer, StorageError>;

    /// Fails `ServerTimedOut` if no record exists. Returns the server's
    /// current `is_running` flag so the caller can react to being
    /// forcibly stopped.
    async fn signal_alive(&self, status: BackgroundJobServer) -> Result<bool, StorageError>;

    async fn signal_stopped(&self, id: Uuid) -> Result<(), StorageError>;

    /// All servers ordered by `first_heartbeat` ascending.
    async fn get_servers(&self) -> Result<Vec<BackgroundJobServer>, StorageError>;

    /// Head of `servers-by-created`. Fails with
    /// `StorageError::InvalidArgument` if the registry is empty — there is
    /// no job or server to point `ConcurrentJobModification` /
    /// `ServerTimedOut` at, so the empty-registry case is reported as a
    /// precondition failure instead.
    async fn get_longest_running(&self) -> Result<BackgroundJobServer, StorageError>;

    /// Deletes every server with `last_heartbeat <= older_than`. Removal
    /// is transactional per server: a crash mid-loop yields either
    /// present-and-fresh or absent, never a half-removed record.
    async fn remove_timed_out(&self, older_than: DateTime<Utc>) -> Result<u64, StorageError>;

    // ---- Metadata & stats ----------------------------------------------

    async fn save_metadata(&self, metadata: MetadataRecord) -> Result<MetadataRecord, StorageError>;

    /// All records with this name, across every owner.
    async fn get_metadata_by_name(&self, name: &str) -> Result<Vec<MetadataRecord>, StorageError>;

    /// Returns `None` rather than failing if no record exists for this key.
    async fn get_metadata(&self, name: &str, owner: &str) -> Result<Option<MetadataRecord>, StorageError>;

    /// Deletes every record named `name`, across all owners. Returns the
    /// number removed; absence is not an error.
    async fn delete_metadata(&self, name: &str) -> Result<u64, StorageError>;

    async fn get_job_stats(&self) -> Result<JobStats, StorageError>;

    /// Atomically increments the all-time-succeeded counter by `n`,
    /// independent of the current SUCCEEDED count.
    async fn publish_total_amount_of_succeeded_jobs(&self, n: u64) -> Result<(), StorageError>;
}
