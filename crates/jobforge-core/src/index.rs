//! Pure, backend-agnostic secondary-index maintenance.
//!
//! Every mutating storage operation lowers to exactly one atomic group:
//! primary write, index removals implied by the old snapshot, index
//! additions implied by the new snapshot, version write. This module only
//! computes the removal/addition lists — it never touches a backend.
//!
//! Signature and recurring-ref membership is reference-counted rather than
//! a plain set-add/set-remove: two jobs can share a signature while only
//! one of them leaves a state, and the signature must remain present in
//! that state's `signature-by-state` set as long as any job backs it
//! (invariant I4). `IndexDelta::SignatureIncrement`/`SignatureDecrement`
//! let a backend track a refcount and only touch its physical set when the
//! count crosses zero.

use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::model::{Job, JobId, JobState, PageRequest};
use crate::provider::StorageProvider;

/// One atomic index mutation. Backends map each variant onto their own
/// physical representation (a SQL backend mostly ignores these, since its
/// indexes are implicit in the row's columns; a key-value or in-memory
/// backend applies each delta to a concrete sorted set / refcounted set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexDelta {
    StateQueueRemove {
        state: JobState,
        job_id: JobId,
    },
    StateQueueAdd {
        state: JobState,
        job_id: JobId,
        score_micros: i64,
    },
    ScheduledRemove {
        job_id: JobId,
    },
    ScheduledAdd {
        job_id: JobId,
        score_micros: i64,
    },
    SignatureDecrement {
        state: JobState,
        signature: String,
    },
    SignatureIncrement {
        state: JobState,
        signature: String,
    },
    RecurringRefDecrement {
        state: JobState,
        recurring_job_id: String,
    },
    RecurringRefIncrement {
        state: JobState,
        recurring_job_id: String,
    },
}

/// The deltas one job mutation implies, split by apply order: every
/// removal must land before any addition within the same atomic group,
/// matching the Index Maintainer's documented write order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexWriteSet {
    pub removals: Vec<IndexDelta>,
    pub additions: Vec<IndexDelta>,
}

impl IndexWriteSet {
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.additions.is_empty()
    }
}

/// Compute the index write-set for a job transitioning from `old` (`None`
/// for a brand-new job) to `new`.
pub fn rewrite_indexes_for(old: Option<&Job>, new: &Job) -> IndexWriteSet {
    let mut set = IndexWriteSet::default();
    let new_state = new.state();
    let new_signature = new.signature();
    let new_recurring = new.recurring_job_id();

    match old {
        None => {
            set.additions.push(IndexDelta::StateQueueAdd {
                state: new_state,
                job_id: new.id,
                score_micros: new.updated_at_micros(),
            });
            if let Some(scheduled_at) = new.scheduled_at() {
                set.additions.push(IndexDelta::ScheduledAdd {
                    job_id: new.id,
                    score_micros: scheduled_at.timestamp_micros(),
                });
            }
            set.additions.push(IndexDelta::SignatureIncrement {
                state: new_state,
                signature: new_signature,
            });
            if let Some(recurring_job_id) = new_recurring {
                set.additions.push(IndexDelta::RecurringRefIncrement {
                    state: new_state,
                    recurring_job_id,
                });
            }
        }
        Some(old) => {
            let old_state = old.state();
            let old_signature = old.signature();
            let old_recurring = old.recurring_job_id();
            let state_unchanged = old_state == new_state;
            let score_unchanged = old.updated_at_micros() == new.updated_at_micros();

            if !(state_unchanged && score_unchanged) {
                set.removals.push(IndexDelta::StateQueueRemove {
                    state: old_state,
                    job_id: old.id,
                });
                set.additions.push(IndexDelta::StateQueueAdd {
                    state: new_state,
                    job_id: new.id,
                    score_micros: new.updated_at_micros(),
                });
            }

            let old_scheduled_at = old.scheduled_at();
            let new_scheduled_at = new.scheduled_at();
            if old_scheduled_at.is_some() && old_scheduled_at != new_scheduled_at {
                set.removals.push(IndexDelta::ScheduledRemove { job_id: old.id });
            }
            if let Some(scheduled_at) = new_scheduled_at {
                if old_scheduled_at != new_scheduled_at {
                    set.additions.push(IndexDelta::ScheduledAdd {
                        job_id: new.id,
                        score_micros: scheduled_at.timestamp_micros(),
                    });
                }
            }

            // Any transition out of a state (including the SCHEDULED case
            // the Open Question calls out) decrements that state's
            // signature refcount; entering a state increments it. A job
            // whose signature changes while staying in the same state is
            // treated the same way for symmetry, though job details are
            // expected to be immutable in practice.
            if old_state != new_state || old_signature != new_signature {
                set.removals.push(IndexDelta::SignatureDecrement {
                    state: old_state,
                    signature: old_signature,
                });
                set.additions.push(IndexDelta::SignatureIncrement {
                    state: new_state,
                    signature: new_signature,
                });
            }

            if old_state != new_state || old_recurring != new_recurring {
                if let Some(recurring_job_id) = old_recurring {
                    set.removals.push(IndexDelta::RecurringRefDecrement {
                        state: old_state,
                        recurring_job_id,
                    });
                }
                if let Some(recurring_job_id) = new_recurring {
                    set.additions.push(IndexDelta::RecurringRefIncrement {
                        state: new_state,
                        recurring_job_id,
                    });
                }
            }
        }
    }

    set
}

/// The full removal set for a job leaving the store permanently. Used by
/// `deletePermanently`/`deleteJobsPermanently`.
pub fn remove_all_indexes_for(job: &Job) -> IndexWriteSet {
    let mut set = IndexWriteSet::default();
    let state = job.state();

    set.removals.push(IndexDelta::StateQueueRemove {
        state,
        job_id: job.id,
    });
    if job.scheduled_at().is_some() {
        set.removals.push(IndexDelta::ScheduledRemove { job_id: job.id });
    }
    set.removals.push(IndexDelta::SignatureDecrement {
        state,
        signature: job.signature(),
    });
    if let Some(recurring_job_id) = job.recurring_job_id() {
        set.removals.push(IndexDelta::RecurringRefDecrement {
            state,
            recurring_job_id,
        });
    }

    set
}

/// Generic paged-delete driver for backends with no cheaper single-statement
/// form (SQL and Mongo can express this as one `DELETE ... WHERE ... LIMIT`;
/// a sorted-set-backed key-value store cannot).
///
/// Iterates the state queue in pages of 1000, stopping at the first job
/// whose `updatedAt` exceeds `updated_before`. Never assumes a stable
/// snapshot of the queue — each page is re-read after the previous page's
/// deletes commit, since deletion shifts what "page 0" contains next.
pub async fn paged_delete_before(
    provider: &dyn StorageProvider,
    state: JobState,
    updated_before: DateTime<Utc>,
) -> Result<u64, StorageError> {
    const PAGE_SIZE: usize = 1000;
    let mut deleted = 0u64;

    loop {
        let page = provider
            .get_jobs(state, None, PageRequest::asc(0, PAGE_SIZE))
            .await?;
        if page.items.is_empty() {
            break;
        }

        let mut stop = false;
        for job in &page.items {
            if job.updated_at > updated_before {
                stop = true;
                break;
            }
            if provider.delete_permanently(job.id).await? == 1 {
                deleted += 1;
            }
        }

        if stop || page.items.len() < PAGE_SIZE {
            break;
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobDetails, StateHistoryEntry};
    use chrono::TimeZone;

    fn details() -> JobDetails {
        JobDetails::new("Reports", "generate", "[]")
    }

    fn at(micros: i64) -> DateTime<Utc> {
        Utc.timestamp_micros(micros).unwrap()
    }

    #[test]
    fn new_job_adds_state_queue_and_signature() {
        let job = Job::new(details(), StateHistoryEntry::new(JobState::Awaiting, at(1000)));
        let set = rewrite_indexes_for(None, &job);
        assert!(set.removals.is_empty());
        assert!(set
            .additions
            .contains(&IndexDelta::StateQueueAdd {
                state: JobState::Awaiting,
                job_id: job.id,
                score_micros: 1000,
            }));
        assert!(set
            .additions
            .contains(&IndexDelta::SignatureIncrement {
                state: JobState::Awaiting,
                signature: job.signature(),
            }));
    }

    #[test]
    fn scheduled_transition_adds_scheduled_set_entry() {
        let mut job = Job::new(details(), StateHistoryEntry::new(JobState::Awaiting, at(1000)));
        job.transition(
            JobState::Scheduled,
            at(1500),
            Some(serde_json::json!({ "scheduled_at": at(2000).to_rfc3339() })),
        );
        let old = Job {
            history: vec![job.history[0].clone()],
            updated_at: at(1000),
            ..job.clone()
        };
        let set = rewrite_indexes_for(Some(&old), &job);
        assert!(set
            .additions
            .iter()
            .any(|d| matches!(d, IndexDelta::ScheduledAdd { .. })));
    }

    #[test]
    fn leaving_scheduled_state_decrements_scheduled_signature_regardless_of_target() {
        let mut job = Job::new(details(), StateHistoryEntry::new(JobState::Awaiting, at(1000)));
        job.transition(
            JobState::Scheduled,
            at(1500),
            Some(serde_json::json!({ "scheduled_at": at(2000).to_rfc3339() })),
        );
        let scheduled = job.clone();

        // Any transition out of SCHEDULED (not just ENQUEUED/DELETED)
        // must clean up the SCHEDULED signature entry.
        job.transition(JobState::Failed, at(2500), None);
        let set = rewrite_indexes_for(Some(&scheduled), &job);
        assert!(set.removals.contains(&IndexDelta::SignatureDecrement {
            state: JobState::Scheduled,
            signature: job.signature(),
        }));
        assert!(set
            .removals
            .iter()
            .any(|d| matches!(d, IndexDelta::ScheduledRemove { .. })));
    }

    #[test]
    fn same_state_score_change_rewrites_state_queue_only() {
        let job_old = Job::new(details(), StateHistoryEntry::new(JobState::Enqueued, at(1000)));
        let mut job_new = job_old.clone();
        job_new.updated_at = at(1200);
        let set = rewrite_indexes_for(Some(&job_old), &job_new);
        assert!(set.removals.contains(&IndexDelta::StateQueueRemove {
            state: JobState::Enqueued,
            job_id: job_old.id,
        }));
        assert!(set
            .removals
            .iter()
            .all(|d| !matches!(d, IndexDelta::SignatureDecrement { .. })));
    }

    #[test]
    fn remove_all_indexes_covers_signature_and_scheduled_set() {
        let mut job = Job::new(details(), StateHistoryEntry::new(JobState::Awaiting, at(1000)));
        job.transition(
            JobState::Scheduled,
            at(1500),
            Some(serde_json::json!({ "scheduled_at": at(2000).to_rfc3339() })),
        );
        let set = remove_all_indexes_for(&job);
        assert!(set.additions.is_empty());
        assert!(set
            .removals
            .iter()
            .any(|d| matches!(d, IndexDelta::ScheduledRemove { .. })));
        assert!(set
            .removals
            .iter()
            .any(|d| matches!(d, IndexDelta::SignatureDecrement { .. })));
    }
}
