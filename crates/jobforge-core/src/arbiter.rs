//! Optimistic Concurrency Arbiter: the version-check protocol every
//! backend's `save` runs before opening its atomic group, plus the
//! read-only unresolved-conflict diagnostic.

use smallvec::SmallVec;
use uuid::Uuid;

use crate::error::StorageError;
use crate::model::{Job, JobState};

/// Compare the stored version against the version the caller expected.
/// Every backend calls this before it opens its atomic group for an
/// update, with the stored job already in hand so the conflict report
/// carries its snapshot.
pub fn expect_version_with(stored_job: &Job, expected: u64) -> Result<(), StorageError> {
    if stored_job.version != expected {
        return Err(StorageError::concurrent_modification(vec![stored_job.clone()]));
    }
    Ok(())
}

/// Arbitrate a batch of (expected-version, stored) pairs independently,
/// collecting every conflict rather than fast-failing on the first one —
/// each job is arbitrated independently.
pub fn arbitrate_batch<'a>(
    pairs: impl IntoIterator<Item = (u64, &'a Job)>,
) -> Result<(), StorageError> {
    let conflicts: Vec<Job> = pairs
        .into_iter()
        .filter(|(expected, stored)| stored.version != *expected)
        .map(|(_, stored)| stored.clone())
        .collect();

    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(StorageError::concurrent_modification(conflicts))
    }
}

/// Up to the last three (state, timestamp) pairs for one side of an
/// unresolved conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSummary {
    pub state: JobState,
    pub at_micros: i64,
}

/// A local-vs-stored pair a higher layer could not reconcile on its own.
/// This is a read-only diagnostic — producing it never mutates the store.
#[derive(Debug, Clone)]
pub struct UnresolvedConflict {
    pub job_id: Uuid,
    pub local_version: u64,
    pub stored_version: u64,
    pub local_recent_states: SmallVec<[StateSummary; 3]>,
    pub stored_recent_states: SmallVec<[StateSummary; 3]>,
}

fn recent_states(job: &Job) -> SmallVec<[StateSummary; 3]> {
    job.history
        .iter()
        .rev()
        .take(3)
        .map(|entry| StateSummary {
            state: entry.state,
            at_micros: entry.created_at.timestamp_micros(),
        })
        .collect()
}

/// Build the diagnostic for a set of local-vs-stored job pairs that a
/// caller has determined it cannot reconcile on its own.
pub fn describe_unresolved(pairs: &[(Job, Job)]) -> Vec<UnresolvedConflict> {
    pairs
        .iter()
        .map(|(local, stored)| UnresolvedConflict {
            job_id: local.id,
            local_version: local.version,
            stored_version: stored.version,
            local_recent_states: recent_states(local),
            stored_recent_states: recent_states(stored),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobDetails, StateHistoryEntry};
    use chrono::Utc;

    fn job_with_version(version: u64) -> Job {
        let mut job = Job::new(
            JobDetails::new("Reports", "generate", "[]"),
            StateHistoryEntry::new(JobState::Enqueued, Utc::now()),
        );
        job.version = version;
        job
    }

    #[test]
    fn expect_version_with_matching_versions_ok() {
        let job = job_with_version(3);
        assert!(expect_version_with(&job, 3).is_ok());
    }

    #[test]
    fn expect_version_with_mismatch_reports_conflict() {
        let job = job_with_version(3);
        let err = expect_version_with(&job, 2).unwrap_err();
        match err {
            StorageError::ConcurrentJobModification { conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].version, 3);
            }
            _ => panic!("expected ConcurrentJobModification"),
        }
    }

    #[test]
    fn arbitrate_batch_collects_every_conflict_not_just_the_first() {
        let a = job_with_version(1);
        let b = job_with_version(2);
        let c = job_with_version(5);
        let pairs = vec![(1, &a), (1, &b), (5, &c)];
        let err = arbitrate_batch(pairs).unwrap_err();
        match err {
            StorageError::ConcurrentJobModification { conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].version, 2);
            }
            _ => panic!("expected ConcurrentJobModification"),
        }
    }

    #[test]
    fn describe_unresolved_caps_history_at_three_entries() {
        let mut local = job_with_version(4);
        for _ in 0..5 {
            local.transition(JobState::Processing, Utc::now(), None);
        }
        let stored = job_with_version(6);
        let diag = describe_unresolved(&[(local, stored)]);
        assert_eq!(diag.len(), 1);
        assert!(diag[0].local_recent_states.len() <= 3);
    }
}
