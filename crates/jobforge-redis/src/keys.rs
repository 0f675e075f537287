//! Key-family layout, parameterized by a configurable prefix.

use jobforge_core::{JobId, JobState};

pub fn job(prefix: &str, id: JobId) -> String {
    format!("{prefix}:job:{id}")
}

pub fn job_version(prefix: &str, id: JobId) -> String {
    format!("{prefix}:jobversion:{id}")
}

/// Sorted set: member = job id, score = `updatedAt` in microseconds.
pub fn queue(prefix: &str, state: JobState) -> String {
    format!("{prefix}:queue:{}", state.as_key())
}

/// Sorted set: member = job id, score = fire-at instant in microseconds.
pub fn scheduled(prefix: &str) -> String {
    format!("{prefix}:scheduled")
}

/// Refcounted sorted set: member = signature, score = refcount.
pub fn job_details(prefix: &str, state: JobState) -> String {
    format!("{prefix}:jobdetails:{}", state.as_key())
}

pub fn recurring_jobs(prefix: &str) -> String {
    format!("{prefix}:recurringjobs")
}

pub fn recurring_job(prefix: &str, id: &str) -> String {
    format!("{prefix}:recurringjob:{id}")
}

/// Refcounted sorted set: member = recurring job id, score = refcount.
pub fn recurring_ref(prefix: &str, state: JobState) -> String {
    format!("{prefix}:recurringjob:{}", state.as_key())
}

pub fn metadata(prefix: &str, name: &str, owner: &str) -> String {
    format!("{prefix}:metadata:{name}:{owner}")
}

/// Set of owners registered against one metadata name, so
/// `delete_metadata`/`get_metadata_by_name` don't need a `KEYS`/`SCAN`.
pub fn metadata_owners(prefix: &str, name: &str) -> String {
    format!("{prefix}:metadataowners:{name}")
}

pub fn server(prefix: &str, id: uuid::Uuid) -> String {
    format!("{prefix}:backgroundjobserver:{id}")
}

pub fn servers_created(prefix: &str) -> String {
    format!("{prefix}:backgroundjobservers:created")
}

pub fn servers_updated(prefix: &str) -> String {
    format!("{prefix}:backgroundjobservers:updated")
}

pub fn succeeded_counter(prefix: &str) -> String {
    format!("{prefix}:succeededjobscounter")
}
