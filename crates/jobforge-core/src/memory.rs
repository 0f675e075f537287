//! `InMemoryStorageProvider`: a fully compliant `StorageProvider`
//! implementation backed by a single `std::sync::Mutex`-guarded state
//! struct (one mutex, one map, atomicity by construction).
//!
//! Used as the contract-test fixture for every property in the testable
//! properties list, and exported as a real zero-dependency provider for
//! single-process deployments and demos.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::arbiter;
use crate::error::StorageError;
use crate::index::{self, IndexDelta, IndexWriteSet};
use crate::model::{
    BackgroundJobServer, Job, JobDetails, JobId, JobState, JobStats, MetadataRecord, Page,
    PageOrder, PageRequest, RecurringJob,
};
use crate::provider::StorageProvider;

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<JobId, Job>,
    state_queues: HashMap<JobState, BTreeSet<(i64, JobId)>>,
    job_scores: HashMap<JobId, i64>,
    scheduled_set: BTreeSet<(i64, JobId)>,
    scheduled_scores: HashMap<JobId, i64>,
    signature_refcounts: HashMap<(JobState, String), u64>,
    recurring_refcounts: HashMap<(JobState, String), u64>,
    recurring_jobs: HashMap<String, RecurringJob>,
    servers: HashMap<Uuid, BackgroundJobServer>,
    servers_by_created: BTreeSet<(i64, Uuid)>,
    servers_created_scores: HashMap<Uuid, i64>,
    metadata: HashMap<(String, String), MetadataRecord>,
    all_time_succeeded: u64,
}

fn apply_delta(mem: &mut MemoryState, delta: &IndexDelta) {
    match delta {
        IndexDelta::StateQueueRemove { state, job_id } => {
            if let Some(score) = mem.job_scores.remove(job_id) {
                mem.state_queues
                    .entry(*state)
                    .or_default()
                    .remove(&(score, *job_id));
            }
        }
        IndexDelta::StateQueueAdd {
            state,
            job_id,
            score_micros,
        } => {
            mem.state_queues
                .entry(*state)
                .or_default()
                .insert((*score_micros, *job_id));
            mem.job_scores.insert(*job_id, *score_micros);
        }
        IndexDelta::ScheduledRemove { job_id } => {
            if let Some(score) = mem.scheduled_scores.remove(job_id) {
                mem.scheduled_set.remove(&(score, *job_id));
            }
        }
        IndexDelta::ScheduledAdd {
            job_id,
            score_micros,
        } => {
            mem.scheduled_set.insert((*score_micros, *job_id));
            mem.scheduled_scores.insert(*job_id, *score_micros);
        }
        IndexDelta::SignatureDecrement { state, signature } => {
            let key = (*state, signature.clone());
            if let Some(count) = mem.signature_refcounts.get_mut(&key) {
                *count -= 1;
                if *count == 0 {
                    mem.signature_refcounts.remove(&key);
                }
            }
        }
        IndexDelta::SignatureIncrement { state, signature } => {
            *mem.signature_refcounts
                .entry((*state, signature.clone()))
                .or_insert(0) += 1;
        }
        IndexDelta::RecurringRefDecrement {
            state,
            recurring_job_id,
        } => {
            let key = (*state, recurring_job_id.clone());
            if let Some(count) = mem.recurring_refcounts.get_mut(&key) {
                *count -= 1;
                if *count == 0 {
                    mem.recurring_refcounts.remove(&key);
                }
            }
        }
        IndexDelta::RecurringRefIncrement {
            state,
            recurring_job_id,
        } => {
            *mem.recurring_refcounts
                .entry((*state, recurring_job_id.clone()))
                .or_insert(0) += 1;
        }
    }
}

fn apply_write_set(mem: &mut MemoryState, set: &IndexWriteSet) {
    for delta in &set.removals {
        apply_delta(mem, delta);
    }
    for delta in &set.additions {
        apply_delta(mem, delta);
    }
}

fn paginate(
    queue: &BTreeSet<(i64, JobId)>,
    jobs: &HashMap<JobId, Job>,
    updated_before: Option<i64>,
    page: &PageRequest,
) -> Page<Job> {
    let mut ids: Vec<JobId> = match updated_before {
        Some(cutoff) => queue
            .iter()
            .filter(|(score, _)| *score <= cutoff)
            .map(|(_, id)| *id)
            .collect(),
        None => queue.iter().map(|(_, id)| *id).collect(),
    };
    if page.order == PageOrder::UpdatedAtDesc {
        ids.reverse();
    }
    let total = ids.len() as u64;
    let items = ids
        .into_iter()
        .skip(page.offset)
        .take(page.limit)
        .filter_map(|id| jobs.get(&id).cloned())
        .collect();
    Page { total, items }
}

/// A fully compliant, backend-agnostic `StorageProvider`. Every mutating
/// method locks the whole state for the duration of its atomic group,
/// giving it trivially correct atomicity at the cost of serializing
/// writes — acceptable for an in-process reference provider and test
/// fixture, not intended as a high-throughput backend.
pub struct InMemoryStorageProvider {
    state: Mutex<MemoryState>,
}

impl InMemoryStorageProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
        }
    }
}

impl Default for InMemoryStorageProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageProvider for InMemoryStorageProvider {
    async fn save_job(&self, job: Job) -> Result<Job, StorageError> {
        let mut mem = self.state.lock().expect("in-memory provider mutex poisoned");
        let existing = mem.jobs.get(&job.id).cloned();

        if job.version == 0 {
            if let Some(stored) = existing {
                return Err(StorageError::concurrent_modification(vec![stored]));
            }
            let mut saved = job;
            saved.version = 1;
            let write_set = index::rewrite_indexes_for(None, &saved);
            apply_write_set(&mut mem, &write_set);
            mem.jobs.insert(saved.id, saved.clone());
            Ok(saved)
        } else {
            let stored = existing.ok_or_else(|| StorageError::job_not_found(job.id))?;
            arbiter::expect_version_with(&stored, job.version)?;
            let mut saved = job;
            saved.version = stored.version + 1;
            let write_set = index::rewrite_indexes_for(Some(&stored), &saved);
            apply_write_set(&mut mem, &write_set);
            mem.jobs.insert(saved.id, saved.clone());
            Ok(saved)
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

        let mut mem = self.state.lock().expect("in-memory provider mutex poisoned");
        let mut conflicts = Vec::new();
        let mut pending: Vec<(IndexWriteSet, Job)> = Vec::with_capacity(jobs.len());

        for job in jobs {
            let existing = mem.jobs.get(&job.id).cloned();
            if all_new {
                if let Some(stored) = existing {
                    conflicts.push(stored);
                    continue;
                }
                let mut saved = job;
                saved.version = 1;
                let write_set = index::rewrite_indexes_for(None, &saved);
                pending.push((write_set, saved));
            } else {
                let stored = existing.ok_or_else(|| StorageError::job_not_found(job.id))?;
                if stored.version != job.version {
                    conflicts.push(stored);
                    continue;
                }
                let mut saved = job;
                saved.version = stored.version + 1;
                let write_set = index::rewrite_indexes_for(Some(&stored), &saved);
                pending.push((write_set, saved));
            }
        }

        if !conflicts.is_empty() {
            return Err(StorageError::concurrent_modification(conflicts));
        }

        let mut results = Vec::with_capacity(pending.len());
        for (write_set, saved) in pending {
            apply_write_set(&mut mem, &write_set);
            mem.jobs.insert(saved.id, saved.clone());
            results.push(saved);
        }
        Ok(results)
    }

    async fn get_job_by_id(&self, id: JobId) -> Result<Job, StorageError> {
        let mem = self.state.lock().expect("in-memory provider mutex poisoned");
        mem.jobs.get(&id).cloned().ok_or_else(|| StorageError::job_not_found(id))
    }

    async fn delete_permanently(&self, id: JobId) -> Result<u64, StorageError> {
        let mut mem = self.state.lock().expect("in-memory provider mutex poisoned");
        match mem.jobs.remove(&id) {
            Some(job) => {
                let write_set = index::remove_all_indexes_for(&job);
                apply_write_set(&mut mem, &write_set);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn get_jobs(
        &self,
        state: JobState,
        updated_before: Option<DateTime<Utc>>,
        page: PageRequest,
    ) -> Result<Page<Job>, StorageError> {
        page.validate()?;
        let mem = self.state.lock().expect("in-memory provider mutex poisoned");
        let empty = BTreeSet::new();
        let queue = mem.state_queues.get(&state).unwrap_or(&empty);
        Ok(paginate(
            queue,
            &mem.jobs,
            updated_before.map(|dt| dt.timestamp_micros()),
            &page,
        ))
    }

    async fn get_scheduled_jobs(
        &self,
        before: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Page<Job>, StorageError> {
        page.validate()?;
        let mem = self.state.lock().expect("in-memory provider mutex poisoned");
        Ok(paginate(
            &mem.scheduled_set,
            &mem.jobs,
            Some(before.timestamp_micros()),
            &page,
        ))
    }

    async fn get_job_page(&self, state: JobState, page: PageRequest) -> Result<Page<Job>, StorageError> {
        page.validate()?;
        let mem = self.state.lock().expect("in-memory provider mutex poisoned");
        let empty = BTreeSet::new();
        let queue = mem.state_queues.get(&state).unwrap_or(&empty);
        Ok(paginate(queue, &mem.jobs, None, &page))
    }

    async fn delete_jobs_permanently(
        &self,
        state: JobState,
        updated_before: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let mut mem = self.state.lock().expect("in-memory provider mutex poisoned");
        let cutoff = updated_before.timestamp_micros();
        let to_delete: Vec<JobId> = mem
            .state_queues
            .get(&state)
            .into_iter()
            .flatten()
            .take_while(|(score, _)| *score <= cutoff)
            .map(|(_, id)| *id)
            .collect();

        let mut deleted = 0u64;
        for id in to_delete {
            if let Some(job) = mem.jobs.remove(&id) {
                let write_set = index::remove_all_indexes_for(&job);
                apply_write_set(&mut mem, &write_set);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn get_distinct_job_signatures(&self, states: &[JobState]) -> Result<Vec<String>, StorageError> {
        let mem = self.state.lock().expect("in-memory provider mutex poisoned");
        let mut seen = HashSet::new();
        for (state, signature) in mem.signature_refcounts.keys() {
            if states.contains(state) {
                seen.insert(signature.clone());
            }
        }
        Ok(seen.into_iter().collect())
    }

    async fn exists(&self, details: &JobDetails, states: &[JobState]) -> Result<bool, StorageError> {
        let signature = details.signature();
        let mem = self.state.lock().expect("in-memory provider mutex poisoned");
        Ok(states
            .iter()
            .any(|state| mem.signature_refcounts.contains_key(&(*state, signature.clone()))))
    }

    async fn save_recurring_job(&self, recurring_job: RecurringJob) -> Result<RecurringJob, StorageError> {
        let mut mem = self.state.lock().expect("in-memory provider mutex poisoned");
        mem.recurring_jobs
            .insert(recurring_job.id.clone(), recurring_job.clone());
        Ok(recurring_job)
    }

    async fn get_recurring_jobs(&self) -> Result<Vec<RecurringJob>, StorageError> {
        let mem = self.state.lock().expect("in-memory provider mutex poisoned");
        Ok(mem.recurring_jobs.values().cloned().collect())
    }

    async fn delete_recurring_job(&self, id: &str) -> Result<u64, StorageError> {
        let mut mem = self.state.lock().expect("in-memory provider mutex poisoned");
        Ok(if mem.recurring_jobs.remove(id).is_some() { 1 } else { 0 })
    }

    async fn recurring_job_exists(&self, id: &str, states: &[JobState]) -> Result<bool, StorageError> {
        let mem = self.state.lock().expect("in-memory provider mutex poisoned");
        Ok(states
            .iter()
            .any(|state| mem.recurring_refcounts.contains_key(&(*state, id.to_string()))))
    }

    async fn announce(&self, status: BackgroundJobServer) -> Result<BackgroundJobServer, StorageError> {
        let mut mem = self.state.lock().expect("in-memory provider mutex poisoned");
        if let Some(old_score) = mem.servers_created_scores.remove(&status.id) {
            mem.servers_by_created.remove(&(old_score, status.id));
        }
        let score = status.first_heartbeat.timestamp_micros();
        mem.servers_by_created.insert((score, status.id));
        mem.servers_created_scores.insert(status.id, score);
        mem.servers.insert(status.id, status.clone());
        Ok(status)
    }

    async fn signal_alive(&self, status: BackgroundJobServer) -> Result<bool, StorageError> {
        let mut mem = self.state.lock().expect("in-memory provider mutex poisoned");
        let stored = mem
            .servers
            .get_mut(&status.id)
            .ok_or_else(|| StorageError::server_timed_out(status.id))?;
        stored.last_heartbeat = status.last_heartbeat;
        stored.telemetry = status.telemetry;
        Ok(stored.is_running)
    }

    async fn signal_stopped(&self, id: Uuid) -> Result<(), StorageError> {
        let mut mem = self.state.lock().expect("in-memory provider mutex poisoned");
        mem.servers.remove(&id);
        if let Some(score) = mem.servers_created_scores.remove(&id) {
            mem.servers_by_created.remove(&(score, id));
        }
        Ok(())
    }

    async fn get_servers(&self) -> Result<Vec<BackgroundJobServer>, StorageError> {
        let mem = self.state.lock().expect("in-memory provider mutex poisoned");
        Ok(mem
            .servers_by_created
            .iter()
            .filter_map(|(_, id)| mem.servers.get(id).cloned())
            .collect())
    }

    async fn get_longest_running(&self) -> Result<BackgroundJobServer, StorageError> {
        let mem = self.state.lock().expect("in-memory provider mutex poisoned");
        let (_, id) = mem
            .servers_by_created
            .iter()
            .next()
            .ok_or_else(|| StorageError::invalid_argument("no background job servers are registered"))?;
        mem.servers
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::invalid_argument("no background job servers are registered"))
    }

    async fn remove_timed_out(&self, older_than: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut mem = self.state.lock().expect("in-memory provider mutex poisoned");
        let stale: Vec<Uuid> = mem
            .servers
            .values()
            .filter(|s| s.last_heartbeat <= older_than)
            .map(|s| s.id)
            .collect();

        for id in &stale {
            mem.servers.remove(id);
            if let Some(score) = mem.servers_created_scores.remove(id) {
                mem.servers_by_created.remove(&(score, *id));
            }
        }
        Ok(stale.len() as u64)
    }

    async fn save_metadata(&self, metadata: MetadataRecord) -> Result<MetadataRecord, StorageError> {
        let mut mem = self.state.lock().expect("in-memory provider mutex poisoned");
        let key = (metadata.name.clone(), metadata.owner.clone());
        mem.metadata.insert(key, metadata.clone());
        Ok(metadata)
    }

    async fn get_metadata_by_name(&self, name: &str) -> Result<Vec<MetadataRecord>, StorageError> {
        let mem = self.state.lock().expect("in-memory provider mutex poisoned");
        Ok(mem
            .metadata
            .values()
            .filter(|record| record.name == name)
            .cloned()
            .collect())
    }

    async fn get_metadata(&self, name: &str, owner: &str) -> Result<Option<MetadataRecord>, StorageError> {
        let mem = self.state.lock().expect("in-memory provider mutex poisoned");
        Ok(mem.metadata.get(&(name.to_string(), owner.to_string())).cloned())
    }

    async fn delete_metadata(&self, name: &str) -> Result<u64, StorageError> {
        let mut mem = self.state.lock().expect("in-memory provider mutex poisoned");
        let keys: Vec<(String, String)> = mem
            .metadata
            .keys()
            .filter(|(n, _)| n == name)
            .cloned()
            .collect();
        let count = keys.len() as u64;
        for key in keys {
            mem.metadata.remove(&key);
        }
        Ok(count)
    }

    async fn get_job_stats(&self) -> Result<JobStats, StorageError> {
        let mem = self.state.lock().expect("in-memory provider mutex poisoned");
        let count_for = |state: JobState| mem.state_queues.get(&state).map(|q| q.len() as u64).unwrap_or(0);
        Ok(JobStats {
            awaiting: count_for(JobState::Awaiting),
            scheduled: count_for(JobState::Scheduled),
            enqueued: count_for(JobState::Enqueued),
            processing: count_for(JobState::Processing),
            succeeded: count_for(JobState::Succeeded),
            failed: count_for(JobState::Failed),
            deleted: count_for(JobState::Deleted),
            all_time_succeeded: mem.all_time_succeeded,
            recurring_jobs: mem.recurring_jobs.len() as u64,
            background_job_servers: mem.servers.len() as u64,
        })
    }

    async fn publish_total_amount_of_succeeded_jobs(&self, n: u64) -> Result<(), StorageError> {
        let mut mem = self.state.lock().expect("in-memory provider mutex poisoned");
        mem.all_time_succeeded += n;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobDetails, StateHistoryEntry};
    use chrono::TimeZone;

    fn at(micros: i64) -> DateTime<Utc> {
        Utc.timestamp_micros(micros).unwrap()
    }

    fn enqueued_job(updated_at: i64) -> Job {
        Job::new(
            JobDetails::new("Reports", "generate", "[]"),
            StateHistoryEntry::new(JobState::Enqueued, at(updated_at)),
        )
    }

    // insert + page + exists.
    #[tokio::test]
    async fn scenario_insert_then_page_and_exists() {
        let provider = InMemoryStorageProvider::new();
        let job = enqueued_job(1000);
        let details = job.job_details.clone();
        provider.save_job(job).await.unwrap();

        let page = provider
            .get_job_page(JobState::Enqueued, PageRequest::asc(0, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items.len(), 1);

        assert!(provider.exists(&details, &[JobState::Enqueued]).await.unwrap());
        assert!(!provider.exists(&details, &[JobState::Failed]).await.unwrap());
    }

    // Scenario 2: concurrent save on the same (id, version).
    #[tokio::test]
    async fn scenario_concurrent_save_one_wins() {
        let provider = InMemoryStorageProvider::new();
        let job = provider.save_job(enqueued_job(1000)).await.unwrap();

        let mut first = job.clone();
        first.transition(JobState::Processing, at(2000), None);
        let mut second = job.clone();
        second.transition(JobState::Failed, at(2000), None);

        let saved_first = provider.save_job(first).await.unwrap();
        assert_eq!(saved_first.version, 2);

        let err = provider.save_job(second).await.unwrap_err();
        match err {
            StorageError::ConcurrentJobModification { conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].version, 2);
            }
            other => panic!("expected ConcurrentJobModification, got {other}"),
        }
    }

    // Scenario 3: scheduled jobs queried by fire-at cutoff.
    #[tokio::test]
    async fn scenario_scheduled_jobs_before_cutoff() {
        let provider = InMemoryStorageProvider::new();
        let mut job = enqueued_job(500);
        job.transition(
            JobState::Scheduled,
            at(500),
            Some(serde_json::json!({ "scheduled_at": at(2000).to_rfc3339() })),
        );
        provider.save_job(job).await.unwrap();

        let before = provider
            .get_scheduled_jobs(at(1999), PageRequest::asc(0, 10))
            .await
            .unwrap();
        assert_eq!(before.items.len(), 0);

        let after = provider
            .get_scheduled_jobs(at(2001), PageRequest::asc(0, 10))
            .await
            .unwrap();
        assert_eq!(after.items.len(), 1);
    }

    // Scenario 4: bulk delete stops at the first job beyond the cutoff.
    #[tokio::test]
    async fn scenario_delete_jobs_permanently_respects_cutoff() {
        let provider = InMemoryStorageProvider::new();
        for updated_at in [1000, 3000, 5001, 7000] {
            let mut job = enqueued_job(updated_at);
            job.transition(JobState::Succeeded, at(updated_at), None);
            provider.save_job(job).await.unwrap();
        }

        let deleted = provider
            .delete_jobs_permanently(JobState::Succeeded, at(5000))
            .await
            .unwrap();
        assert_eq!(deleted, 2);

        let remaining = provider
            .get_job_page(JobState::Succeeded, PageRequest::asc(0, 10))
            .await
            .unwrap();
        assert_eq!(remaining.total, 2);
    }

    // Scenario 5: longest-running election survives a reap.
    #[tokio::test]
    async fn scenario_longest_running_survives_reap() {
        let provider = InMemoryStorageProvider::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        provider
            .announce(test_server(a, at(100), at(120)))
            .await
            .unwrap();
        provider
            .announce(test_server(b, at(200), at(200)))
            .await
            .unwrap();

        assert_eq!(provider.get_longest_running().await.unwrap().id, a);

        let removed = provider.remove_timed_out(at(150)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(provider.get_longest_running().await.unwrap().id, b);
    }

    // Scenario 6: all-time-succeeded counter is independent of live SUCCEEDED count.
    #[tokio::test]
    async fn scenario_publish_succeeded_counter_is_independent() {
        let provider = InMemoryStorageProvider::new();
        provider.publish_total_amount_of_succeeded_jobs(5).await.unwrap();
        let stats = provider.get_job_stats().await.unwrap();
        assert_eq!(stats.all_time_succeeded, 5);
        assert_eq!(stats.succeeded, 0);
    }

    #[tokio::test]
    async fn delete_permanently_clears_signature_index() {
        let provider = InMemoryStorageProvider::new();
        let job = provider.save_job(enqueued_job(1000)).await.unwrap();
        let details = job.job_details.clone();
        assert!(provider.exists(&details, &[JobState::Enqueued]).await.unwrap());

        let count = provider.delete_permanently(job.id).await.unwrap();
        assert_eq!(count, 1);
        assert!(!provider.exists(&details, &[JobState::Enqueued]).await.unwrap());
        assert!(matches!(
            provider.get_job_by_id(job.id).await.unwrap_err(),
            StorageError::JobNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn shared_signature_survives_until_last_holder_leaves_state() {
        let provider = InMemoryStorageProvider::new();
        let job_a = provider.save_job(enqueued_job(1000)).await.unwrap();
        let job_b = provider.save_job(enqueued_job(1100)).await.unwrap();
        let details = job_a.job_details.clone();

        let mut moved = job_a.clone();
        moved.transition(JobState::Processing, at(1500), None);
        provider.save_job(moved).await.unwrap();

        // job_b still holds the ENQUEUED signature.
        assert!(provider.exists(&details, &[JobState::Enqueued]).await.unwrap());

        let mut moved_b = job_b.clone();
        moved_b.transition(JobState::Processing, at(1600), None);
        provider.save_job(moved_b).await.unwrap();

        assert!(!provider.exists(&details, &[JobState::Enqueued]).await.unwrap());
    }

    #[tokio::test]
    async fn save_jobs_rejects_mixed_batch() {
        let provider = InMemoryStorageProvider::new();
        let new_job = enqueued_job(1000);
        let mut existing = provider.save_job(enqueued_job(1100)).await.unwrap();
        existing.transition(JobState::Processing, at(1200), None);

        let err = provider
            .save_jobs(vec![new_job, existing])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument { .. }));
    }

    fn test_server(id: Uuid, first_heartbeat: DateTime<Utc>, last_heartbeat: DateTime<Utc>) -> BackgroundJobServer {
        BackgroundJobServer {
            id,
            name: None,
            worker_pool_size: 1,
            poll_interval_millis: 1000,
            first_heartbeat,
            last_heartbeat,
            is_running: true,
            telemetry: Default::default(),
        }
    }
}
