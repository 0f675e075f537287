//! Change-Notification Dispatcher: rate-limited, coalescing, best-effort
//! fan-out of storage-mutation events to in-process listeners.
//!
//! Listeners register through an explicitly owned registry and scoped
//! handles rather than a global list. Delivery never blocks or fails the
//! wrapped storage operation: the decorated call already returned by the
//! time a notification is attempted, and the attempt itself is
//! `tokio::spawn`ed.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use uuid::Uuid;

use crate::error::StorageError;
use crate::model::{
    BackgroundJobServer, Job, JobDetails, JobId, JobStats, JobState, MetadataRecord, Page,
    PageRequest, RecurringJob,
};
use crate::provider::StorageProvider;

/// Notified (rate-limited) whenever a mutation can affect job counts.
pub trait JobStatsListener: Send + Sync + 'static {
    fn on_job_stats_changed(&self, stats: &JobStats);
}

/// Notified (rate-limited) whenever a metadata record changes.
pub trait MetadataListener: Send + Sync + 'static {
    fn on_metadata_changed(&self, metadata: &MetadataRecord);
}

type TokenLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum ListenerKind {
    JobStats,
    Metadata,
}

struct ListenerRegistry {
    job_stats: DashMap<u64, Arc<dyn JobStatsListener>>,
    metadata: DashMap<u64, Arc<dyn MetadataListener>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    fn new() -> Self {
        Self {
            job_stats: DashMap::new(),
            metadata: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

/// A scoped registration. Deregisters its listener when dropped so a
/// caller never has to remember to unsubscribe manually.
pub struct ListenerHandle {
    id: u64,
    kind: ListenerKind,
    registry: Arc<ListenerRegistry>,
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        match self.kind {
            ListenerKind::JobStats => {
                self.registry.job_stats.remove(&self.id);
            }
            ListenerKind::Metadata => {
                self.registry.metadata.remove(&self.id);
            }
        }
    }
}

/// Decorates any `StorageProvider`, adding rate-limited change
/// notification on top without altering the wrapped backend's behavior.
pub struct ChangeDispatcher<P: StorageProvider> {
    inner: Arc<P>,
    registry: Arc<ListenerRegistry>,
    job_stats_limiter: Arc<TokenLimiter>,
    metadata_limiter: Arc<TokenLimiter>,
}

impl<P: StorageProvider> ChangeDispatcher<P> {
    /// `job_stats_per_second` / `metadata_per_second` default to 1/s each
    /// when `None`.
    pub fn new(
        inner: Arc<P>,
        job_stats_per_second: Option<NonZeroU32>,
        metadata_per_second: Option<NonZeroU32>,
    ) -> Self {
        let default_rate = NonZeroU32::new(1).expect("1 is nonzero");
        Self {
            inner,
            registry: Arc::new(ListenerRegistry::new()),
            job_stats_limiter: Arc::new(RateLimiter::direct(Quota::per_second(
                job_stats_per_second.unwrap_or(default_rate),
            ))),
            metadata_limiter: Arc::new(RateLimiter::direct(Quota::per_second(
                metadata_per_second.unwrap_or(default_rate),
            ))),
        }
    }

    pub fn register_job_stats_listener(&self, listener: Arc<dyn JobStatsListener>) -> ListenerHandle {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.job_stats.insert(id, listener);
        ListenerHandle {
            id,
            kind: ListenerKind::JobStats,
            registry: Arc::clone(&self.registry),
        }
    }

    pub fn register_metadata_listener(&self, listener: Arc<dyn MetadataListener>) -> ListenerHandle {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.metadata.insert(id, listener);
        ListenerHandle {
            id,
            kind: ListenerKind::Metadata,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Best-effort, rate-limited job-stats notification. Excess calls
    /// within the budget are dropped at the call site — the next
    /// successful call reflects current state, nothing is queued or
    /// replayed.
    fn notify_job_stats(&self) {
        if self.registry.job_stats.is_empty() {
            return;
        }
        if self.job_stats_limiter.check().is_err() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            match inner.get_job_stats().await {
                Ok(stats) => {
                    for listener in registry.job_stats.iter() {
                        listener.value().on_job_stats_changed(&stats);
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "job-stats notification skipped: could not read stats")
                }
            }
        });
    }

    fn notify_metadata(&self, metadata: MetadataRecord) {
        if self.registry.metadata.is_empty() {
            return;
        }
        if self.metadata_limiter.check().is_err() {
            return;
        }
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            for listener in registry.metadata.iter() {
                listener.value().on_metadata_changed(&metadata);
            }
        });
    }
}

#[async_trait]
impl<P: StorageProvider> StorageProvider for ChangeDispatcher<P> {
    async fn save_job(&self, job: Job) -> Result<Job, StorageError> {
        let saved = self.inner.save_job(job).await?;
        self.notify_job_stats();
        Ok(saved)
    }

    async fn save_jobs(&self, jobs: Vec<Job>) -> Result<Vec<Job>, StorageError> {
        let saved = self.inner.save_jobs(jobs).await?;
        self.notify_job_stats();
        Ok(saved)
    }

    async fn get_job_by_id(&self, id: JobId) -> Result<Job, StorageError> {
        self.inner.get_job_by_id(id).await
    }

    async fn delete_permanently(&self, id: JobId) -> Result<u64, StorageError> {
        let count = self.inner.delete_permanently(id).await?;
        if count > 0 {
            self.notify_job_stats();
        }
        Ok(count)
    }

    async fn get_jobs(
        &self,
        state: JobState,
        updated_before: Option<DateTime<Utc>>,
        page: PageRequest,
    ) -> Result<Page<Job>, StorageError> {
        self.inner.get_jobs(state, updated_before, page).await
    }

    async fn get_scheduled_jobs(
        &self,
        before: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Page<Job>, StorageError> {
        self.inner.get_scheduled_jobs(before, page).await
    }

    async fn get_job_page(&self, state: JobState, page: PageRequest) -> Result<Page<Job>, StorageError> {
        self.inner.get_job_page(state, page).await
    }

    async fn delete_jobs_permanently(
        &self,
        state: JobState,
        updated_before: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let count = self.inner.delete_jobs_permanently(state, updated_before).await?;
        if count > 0 {
            self.notify_job_stats();
        }
        Ok(count)
    }

    async fn get_distinct_job_signatures(&self, states: &[JobState]) -> Result<Vec<String>, StorageError> {
        self.inner.get_distinct_job_signatures(states).await
    }

    async fn exists(&self, details: &JobDetails, states: &[JobState]) -> Result<bool, StorageError> {
        self.inner.exists(details, states).await
    }

    async fn save_recurring_job(&self, recurring_job: RecurringJob) -> Result<RecurringJob, StorageError> {
        let saved = self.inner.save_recurring_job(recurring_job).await?;
        self.notify_job_stats();
        Ok(saved)
    }

    async fn get_recurring_jobs(&self) -> Result<Vec<RecurringJob>, StorageError> {
        self.inner.get_recurring_jobs().await
    }

    async fn delete_recurring_job(&self, id: &str) -> Result<u64, StorageError> {
        let count = self.inner.delete_recurring_job(id).await?;
        if count > 0 {
            self.notify_job_stats();
        }
        Ok(count)
    }

    async fn recurring_job_exists(&self, id: &str, states: &[JobState]) -> Result<bool, StorageError> {
        self.inner.recurring_job_exists(id, states).await
    }

    async fn announce(&self, status: BackgroundJobServer) -> Result<BackgroundJobServer, StorageError> {
        let saved = self.inner.announce(status).await?;
        self.notify_job_stats();
        Ok(saved)
    }

    async fn signal_alive(&self, status: BackgroundJobServer) -> Result<bool, StorageError> {
        self.inner.signal_alive(status).await
    }

    async fn signal_stopped(&self, id: Uuid) -> Result<(), StorageError> {
        self.inner.signal_stopped(id).await?;
        self.notify_job_stats();
        Ok(())
    }

    async fn get_servers(&self) -> Result<Vec<BackgroundJobServer>, StorageError> {
        self.inner.get_servers().await
    }

    async fn get_longest_running(&self) -> Result<BackgroundJobServer, StorageError> {
        self.inner.get_longest_running().await
    }

    async fn remove_timed_out(&self, older_than: DateTime<Utc>) -> Result<u64, StorageError> {
        let count = self.inner.remove_timed_out(older_than).await?;
        if count > 0 {
            self.notify_job_stats();
        }
        Ok(count)
    }

    async fn save_metadata(&self, metadata: MetadataRecord) -> Result<MetadataRecord, StorageError> {
        let saved = self.inner.save_metadata(metadata).await?;
        self.notify_metadata(saved.clone());
        Ok(saved)
    }

    async fn get_metadata_by_name(&self, name: &str) -> Result<Vec<MetadataRecord>, StorageError> {
        self.inner.get_metadata_by_name(name).await
    }

    async fn get_metadata(&self, name: &str, owner: &str) -> Result<Option<MetadataRecord>, StorageError> {
        self.inner.get_metadata(name, owner).await
    }

    async fn delete_metadata(&self, name: &str) -> Result<u64, StorageError> {
        self.inner.delete_metadata(name).await
    }

    async fn get_job_stats(&self) -> Result<JobStats, StorageError> {
        self.inner.get_job_stats().await
    }

    async fn publish_total_amount_of_succeeded_jobs(&self, n: u64) -> Result<(), StorageError> {
        self.inner.publish_total_amount_of_succeeded_jobs(n).await?;
        self.notify_job_stats();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStorageProvider;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct CountingListener {
        calls: AtomicUsize,
        last: Mutex<Option<JobStats>>,
    }

    impl JobStatsListener for CountingListener {
        fn on_job_stats_changed(&self, stats: &JobStats) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(*stats);
        }
    }

    #[tokio::test]
    async fn listener_handle_drop_deregisters() {
        let inner = Arc::new(InMemoryStorageProvider::new());
        let dispatcher = ChangeDispatcher::new(inner, None, None);
        assert!(dispatcher.registry.job_stats.is_empty());

        let listener = Arc::new(CountingListener {
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        });
        let handle = dispatcher.register_job_stats_listener(listener);
        assert_eq!(dispatcher.registry.job_stats.len(), 1);

        drop(handle);
        assert!(dispatcher.registry.job_stats.is_empty());
    }

    #[tokio::test]
    async fn no_listeners_means_no_notification_work() {
        let inner = Arc::new(InMemoryStorageProvider::new());
        let dispatcher = ChangeDispatcher::new(inner, None, None);
        // With zero listeners registered, notify_job_stats should be a
        // no-op rather than spawning a task that reads stats for nobody.
        dispatcher.notify_job_stats();
        assert!(dispatcher.registry.job_stats.is_empty());
    }
}
