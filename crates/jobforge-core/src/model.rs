//! Core data model: jobs, recurring jobs, servers, metadata.
//!
//! These types are transport-agnostic. A backend crate is responsible for
//! mapping them onto its own wire representation (SQL rows, Redis hashes,
//! BSON documents); this module never imports a backend's client crate.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Stable 128-bit job identifier.
pub type JobId = Uuid;

/// The closed set of states a job's history can occupy.
///
/// Order matters only for `Display`/serialization stability, not for any
/// state-machine transition rule — the core does not enforce which
/// transitions are legal, callers decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Awaiting,
    Scheduled,
    Enqueued,
    Processing,
    Succeeded,
    Failed,
    Deleted,
}

impl JobState {
    /// All states, in a stable order. Used by stats aggregation and tests.
    pub const ALL: [JobState; 7] = [
        JobState::Awaiting,
        JobState::Scheduled,
        JobState::Enqueued,
        JobState::Processing,
        JobState::Succeeded,
        JobState::Failed,
        JobState::Deleted,
    ];

    /// The key-family / table discriminator used by backends, e.g.
    /// `{prefix}:queue:{state}`.
    pub fn as_key(&self) -> &'static str {
        match self {
            JobState::Awaiting => "AWAITING",
            JobState::Scheduled => "SCHEDULED",
            JobState::Enqueued => "ENQUEUED",
            JobState::Processing => "PROCESSING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
            JobState::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_key())
    }
}

/// `class+method+arg signature` descriptor used for deduplication.
///
/// `signature()` is the stable hash keyed into `signature-by-state`,
/// the index `exists` queries against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDetails {
    pub class_name: String,
    pub method_name: String,
    pub arg_signature: String,
}

impl JobDetails {
    pub fn new(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        arg_signature: impl Into<String>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            arg_signature: arg_signature.into(),
        }
    }

    /// Stable dedup hash. Same inputs always hash to the same signature,
    /// independent of process, host, or hash-map iteration order.
    pub fn signature(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.class_name.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.method_name.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.arg_signature.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// One entry in a job's state history.
///
/// `payload` is opaque JSON so state-specific data (a SCHEDULED entry's
/// fire-at instant and recurring-job id, a FAILED entry's reason, a
/// PROCESSING entry's claiming server id) does not need a Rust variant
/// per state — the core does not dictate a serialization format for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateHistoryEntry {
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl StateHistoryEntry {
    pub fn new(state: JobState, created_at: DateTime<Utc>) -> Self {
        Self {
            state,
            created_at,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// `scheduled_at` for a SCHEDULED entry, read out of `payload["scheduled_at"]`.
    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.payload
            .as_ref()?
            .get("scheduled_at")?
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// `recurring_job_id` carried by a SCHEDULED entry, if any.
    pub fn recurring_job_id(&self) -> Option<String> {
        self.payload
            .as_ref()?
            .get("recurring_job_id")?
            .as_str()
            .map(str::to_owned)
    }
}

/// A unit of work tracked by the core.
///
/// The invariant that `state` equals the state of the most recent
/// history entry is maintained structurally: `Job::state()` is always
/// derived from `history`, there is no independent `state` field to
/// drift out of sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub version: u64,
    pub job_details: JobDetails,
    /// Non-empty; the current state is `history.last()`.
    pub history: Vec<StateHistoryEntry>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a brand-new job with `version = 0` (unsaved).
    pub fn new(job_details: JobDetails, initial: StateHistoryEntry) -> Self {
        let updated_at = initial.created_at;
        Self {
            id: Uuid::new_v4(),
            version: 0,
            job_details,
            history: vec![initial],
            updated_at,
        }
    }

    /// The job's current state is always its most recent history entry.
    ///
    /// # Panics
    /// Panics if `history` is empty, which would violate the data-model
    /// invariant that history is always non-empty.
    pub fn state(&self) -> JobState {
        self.history
            .last()
            .expect("Job.history must never be empty")
            .state
    }

    pub fn current_entry(&self) -> &StateHistoryEntry {
        self.history
            .last()
            .expect("Job.history must never be empty")
    }

    /// Append a new state history entry and bump `updated_at`.
    ///
    /// Does not bump `version` — that only happens on a successful
    /// `StorageProvider::save_job` call.
    pub fn transition(&mut self, state: JobState, at: DateTime<Utc>, payload: Option<serde_json::Value>) {
        let mut entry = StateHistoryEntry::new(state, at);
        if let Some(p) = payload {
            entry = entry.with_payload(p);
        }
        self.history.push(entry);
        self.updated_at = at;
    }

    /// `updated_at` at microsecond resolution, the score used by every
    /// state-queue index.
    pub fn updated_at_micros(&self) -> i64 {
        self.updated_at.timestamp_micros()
    }

    /// Fire-at instant, if the job is currently SCHEDULED.
    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        if self.state() != JobState::Scheduled {
            return None;
        }
        self.current_entry().scheduled_at()
    }

    pub fn recurring_job_id(&self) -> Option<String> {
        self.current_entry().recurring_job_id()
    }

    pub fn signature(&self) -> String {
        self.job_details.signature()
    }
}

/// A caller-defined recurring schedule template. Lifetime independent of
/// the job instances it spawns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringJob {
    pub id: String,
    pub schedule: String,
    pub job_details_template: JobDetails,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Resource telemetry reported on each server heartbeat. Individually
/// optional: not every host exposes every metric.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerTelemetry {
    pub system_total_memory_bytes: Option<u64>,
    pub system_free_memory_bytes: Option<u64>,
    pub system_cpu_load: Option<f32>,
    pub process_max_memory_bytes: Option<u64>,
    pub process_allocated_memory_bytes: Option<u64>,
    pub process_cpu_load: Option<f32>,
}

/// A worker process sharing the backing store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundJobServer {
    pub id: Uuid,
    pub name: Option<String>,
    pub worker_pool_size: u32,
    pub poll_interval_millis: u64,
    pub first_heartbeat: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub is_running: bool,
    #[serde(default)]
    pub telemetry: ServerTelemetry,
}

/// Compound-keyed `(name, owner)` metadata record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub name: String,
    pub owner: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Counts returned by `getJobStats`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct JobStats {
    pub awaiting: u64,
    pub scheduled: u64,
    pub enqueued: u64,
    pub processing: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub deleted: u64,
    pub all_time_succeeded: u64,
    pub recurring_jobs: u64,
    pub background_job_servers: u64,
}

impl JobStats {
    pub fn count_for(&self, state: JobState) -> u64 {
        match state {
            JobState::Awaiting => self.awaiting,
            JobState::Scheduled => self.scheduled,
            JobState::Enqueued => self.enqueued,
            JobState::Processing => self.processing,
            JobState::Succeeded => self.succeeded,
            JobState::Failed => self.failed,
            JobState::Deleted => self.deleted,
        }
    }
}

/// Sort order for paginated reads. Only ascending/descending by
/// `updatedAt` is supported; anything else is `InvalidArgument`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageOrder {
    UpdatedAtAsc,
    UpdatedAtDesc,
}

/// A single page request. `limit` of zero is rejected by `validate()`.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
    pub order: PageOrder,
}

impl PageRequest {
    pub fn new(offset: usize, limit: usize, order: PageOrder) -> Self {
        Self {
            offset,
            limit,
            order,
        }
    }

    pub fn asc(offset: usize, limit: usize) -> Self {
        Self::new(offset, limit, PageOrder::UpdatedAtAsc)
    }

    /// Validate shared request shape. Every backend calls this before
    /// touching its store so the `InvalidArgument` check isn't
    /// duplicated three times.
    pub fn validate(&self) -> Result<(), crate::error::StorageError> {
        if self.limit == 0 {
            return Err(crate::error::StorageError::invalid_argument(
                "page limit must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// A page of results plus the total count for the queried state
/// (`getJobPage`).
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub total: u64,
    pub items: Vec<T>,
}
