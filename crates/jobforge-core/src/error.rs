//! Structured errors for the storage contract.
//!
//! `StorageError` is the only error type that crosses a `StorageProvider`
//! method boundary. Transport errors (`sqlx::Error`, `redis::RedisError`,
//! `mongodb::error::Error`) are backend-internal; a backend wraps them into
//! [`StorageError::StorageTransient`] or [`StorageError::StorageFatal`] at
//! its own boundary rather than leaking them.
//!
//! `anyhow::Error` does not implement `std::error::Error`, so the two
//! variants that carry one get a manual `Display`/`Error` impl instead of
//! a blanket `#[derive(thiserror::Error)]`, splitting pattern-matchable
//! pure-data errors from backend-wrapping ones.

use std::fmt;

use uuid::Uuid;

use crate::model::Job;

/// The six error kinds a `StorageProvider` can return.
#[derive(Debug)]
pub enum StorageError {
    /// Version check failed for one or more jobs.
    ///
    /// `conflicts` carries the stored snapshot of every job that failed the
    /// check so the caller can refresh and reapply.
    ConcurrentJobModification { conflicts: Vec<Job> },

    /// No job exists with the given id.
    JobNotFound { id: Uuid },

    /// A heartbeat or stop was attempted for a server no longer registered.
    ServerTimedOut { id: Uuid },

    /// Malformed page request, mixed new/existing batch, or unsupported sort.
    InvalidArgument { message: String },

    /// Retryable network or contention failure; the operation did not commit.
    StorageTransient(anyhow::Error),

    /// Non-retryable backend error (schema mismatch, authorization, etc).
    /// The operation did not commit; callers should stop using this provider.
    StorageFatal(anyhow::Error),
}

impl StorageError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        StorageError::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn job_not_found(id: Uuid) -> Self {
        StorageError::JobNotFound { id }
    }

    pub fn server_timed_out(id: Uuid) -> Self {
        StorageError::ServerTimedOut { id }
    }

    pub fn concurrent_modification(conflicts: Vec<Job>) -> Self {
        StorageError::ConcurrentJobModification { conflicts }
    }

    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        StorageError::StorageTransient(err.into())
    }

    pub fn fatal(err: impl Into<anyhow::Error>) -> Self {
        StorageError::StorageFatal(err.into())
    }

    /// Whether the worker layer may sensibly retry this operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::StorageTransient(_))
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConcurrentJobModification { conflicts } => write!(
                f,
                "concurrent modification: {} job(s) failed the version check",
                conflicts.len()
            ),
            StorageError::JobNotFound { id } => write!(f, "no job found with id {id}"),
            StorageError::ServerTimedOut { id } => {
                write!(f, "server {id} is not registered or has timed out")
            }
            StorageError::InvalidArgument { message } => {
                write!(f, "invalid argument: {message}")
            }
            StorageError::StorageTransient(e) => write!(f, "transient storage failure: {e}"),
            StorageError::StorageFatal(e) => write!(f, "fatal storage failure: {e}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::StorageTransient(e) | StorageError::StorageFatal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for StorageError {
    fn from(err: anyhow::Error) -> Self {
        StorageError::StorageTransient(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobDetails, JobState, StateHistoryEntry};
    use chrono::Utc;

    fn sample_job() -> Job {
        Job::new(
            JobDetails::new("Reports", "generate", "[]"),
            StateHistoryEntry::new(JobState::Enqueued, Utc::now()),
        )
    }

    #[test]
    fn concurrent_modification_display_counts_conflicts() {
        let err = StorageError::concurrent_modification(vec![sample_job(), sample_job()]);
        assert!(err.to_string().contains("2 job(s)"));
    }

    #[test]
    fn storage_transient_is_retryable_storage_fatal_is_not() {
        let transient = StorageError::transient(anyhow::anyhow!("connection reset"));
        let fatal = StorageError::fatal(anyhow::anyhow!("schema mismatch"));
        assert!(transient.is_retryable());
        assert!(!fatal.is_retryable());
    }

    #[test]
    fn storage_transient_source_is_preserved() {
        use std::error::Error as _;
        let err = StorageError::transient(anyhow::anyhow!("boom"));
        assert!(err.source().is_some());
    }

    #[test]
    fn job_not_found_display_contains_id() {
        let id = Uuid::nil();
        let err = StorageError::job_not_found(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
