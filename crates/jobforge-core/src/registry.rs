//! Server Registry: heartbeat-based liveness bookkeeping and a background
//! reaper task for stale servers.
//!
//! A periodic `tokio::time::interval` loop that collects and removes
//! expired records, logging what it did. `StorageProvider` exposes the
//! five liveness operations directly so a caller can drive them itself;
//! this wrapper exists for the common case of "just run the reaper".

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::StorageError;
use crate::model::BackgroundJobServer;
use crate::provider::StorageProvider;

/// Thin wrapper around a `StorageProvider` exposing the server-liveness
/// operations plus a background reaper.
pub struct ServerRegistry<P: StorageProvider> {
    provider: Arc<P>,
}

impl<P: StorageProvider> ServerRegistry<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    pub async fn announce(&self, status: BackgroundJobServer) -> Result<BackgroundJobServer, StorageError> {
        self.provider.announce(status).await
    }

    /// Returns the server's current `is_running` flag, letting the caller
    /// react to having been forcibly stopped.
    pub async fn signal_alive(&self, status: BackgroundJobServer) -> Result<bool, StorageError> {
        self.provider.signal_alive(status).await
    }

    pub async fn signal_stopped(&self, id: Uuid) -> Result<(), StorageError> {
        self.provider.signal_stopped(id).await
    }

    pub async fn get_servers(&self) -> Result<Vec<BackgroundJobServer>, StorageError> {
        self.provider.get_servers().await
    }

    pub async fn get_longest_running(&self) -> Result<BackgroundJobServer, StorageError> {
        self.provider.get_longest_running().await
    }

    pub async fn remove_timed_out(&self, older_than: chrono::DateTime<Utc>) -> Result<u64, StorageError> {
        self.provider.remove_timed_out(older_than).await
    }

    /// Spawn a background task that periodically reaps servers whose
    /// last heartbeat is older than `max_age`, polling every `interval`.
    /// Returns the task handle; dropping it does not stop the task, the
    /// caller is expected to hold and eventually abort it.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration, max_age: Duration) -> JoinHandle<()>
    where
        P: 'static,
    {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let cutoff = Utc::now() - max_age;
                match registry.remove_timed_out(cutoff).await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(reaped = n, "removed timed-out background job servers"),
                    Err(err) => tracing::warn!(error = %err, "stale-server reaper pass failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStorageProvider;
    use crate::model::ServerTelemetry;
    use chrono::Duration as ChronoDuration;

    fn server(id: Uuid, heartbeat: chrono::DateTime<Utc>) -> BackgroundJobServer {
        BackgroundJobServer {
            id,
            name: Some("worker-1".into()),
            worker_pool_size: 4,
            poll_interval_millis: 15_000,
            first_heartbeat: heartbeat,
            last_heartbeat: heartbeat,
            is_running: true,
            telemetry: ServerTelemetry::default(),
        }
    }

    #[tokio::test]
    async fn longest_running_is_the_earliest_announced() {
        let provider = Arc::new(InMemoryStorageProvider::new());
        let registry = ServerRegistry::new(Arc::clone(&provider));

        let now = Utc::now();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        registry.announce(server(a, now)).await.unwrap();
        registry
            .announce(server(b, now + ChronoDuration::seconds(10)))
            .await
            .unwrap();

        let longest = registry.get_longest_running().await.unwrap();
        assert_eq!(longest.id, a);
    }

    #[tokio::test]
    async fn remove_timed_out_drops_stale_servers_only() {
        let provider = Arc::new(InMemoryStorageProvider::new());
        let registry = ServerRegistry::new(Arc::clone(&provider));

        let now = Utc::now();
        let stale = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        registry
            .announce(server(stale, now - ChronoDuration::seconds(120)))
            .await
            .unwrap();
        registry.announce(server(fresh, now)).await.unwrap();

        let removed = registry
            .remove_timed_out(now - ChronoDuration::seconds(60))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let remaining = registry.get_servers().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, fresh);
    }
}
