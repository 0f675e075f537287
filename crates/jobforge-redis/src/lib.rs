//! Redis `StorageProvider` implementation for jobforge-core.
//!
//! The primary record is the full serialized `Job` (`{prefix}:job:{id}`);
//! every secondary index is a concrete sorted set. A job mutation's
//! atomic group is one Lua script: compare the stored version, write the
//! primary record, and fold every `IndexWriteSet` entry into the same
//! script invocation so there's no window where the primary record and
//! its indexes disagree.

mod config;
mod keys;
mod ops;

pub use config::RedisConfig;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use jobforge_core::{
    paged_delete_before, remove_all_indexes_for, rewrite_indexes_for, BackgroundJobServer, Job,
    JobDetails, JobId, JobStats, JobState, MetadataRecord, Page, PageOrder, PageRequest,
    RecurringJob, StorageError, StorageProvider, IndexWriteSet,
};
use redis::AsyncCommands;
use uuid::Uuid;

fn to_fatal(err: redis::RedisError) -> StorageError {
    StorageError::fatal(anyhow::Error::new(err))
}

fn to_transient(err: redis::RedisError) -> StorageError {
    StorageError::transient(anyhow::Error::new(err))
}

fn map_redis_error(err: redis::RedisError) -> StorageError {
    if err.is_connection_dropped() || err.is_timeout() || err.is_io_error() {
        to_transient(err)
    } else {
        to_fatal(err)
    }
}

fn to_json(job: &Job) -> Result<String, StorageError> {
    serde_json::to_string(job).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))
}

fn ops_json(prefix: &str, deltas: &[jobforge_core::IndexDelta]) -> Result<String, StorageError> {
    let ops: Vec<ops::RedisOp> = deltas.iter().map(|d| ops::lower(prefix, d)).collect();
    serde_json::to_string(&ops).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))
}

/// A fully compliant `StorageProvider` backed by a `deadpool_redis::Pool`.
pub struct RedisStorageProvider {
    pool: Pool,
    prefix: String,
    save_script: redis::Script,
    delete_script: redis::Script,
}

impl RedisStorageProvider {
    pub fn new(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            prefix: key_prefix.into(),
            save_script: redis::Script::new(ops::SAVE_JOB_SCRIPT),
            delete_script: redis::Script::new(ops::DELETE_JOB_SCRIPT),
        }
    }

    pub fn connect(config: &RedisConfig) -> Result<Self, StorageError> {
        let pool_cfg = PoolConfig::from_url(&config.redis_url);
        let pool = pool_cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?;
        Ok(Self::new(pool, config.key_prefix.clone()))
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StorageError> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::transient(anyhow::Error::new(e)))
    }

    async fn apply_save(&self, expected: u64, new_version: u64, job: &Job, write_set: &IndexWriteSet) -> Result<bool, StorageError> {
        let mut conn = self.conn().await?;
        let mut all_ops = write_set.removals.clone();
        all_ops.extend(write_set.additions.clone());
        let ops_arg = ops_json(&self.prefix, &all_ops)?;
        let job_json = to_json(job)?;

        let result: Vec<redis::Value> = self
            .save_script
            .key(keys::job(&self.prefix, job.id))
            .key(keys::job_version(&self.prefix, job.id))
            .arg(expected)
            .arg(new_version)
            .arg(job_json)
            .arg(ops_arg)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        match result.first() {
            Some(redis::Value::Int(1)) => Ok(true),
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl StorageProvider for RedisStorageProvider {
    async fn save_job(&self, job: Job) -> Result<Job, StorageError> {
        let expected = job.version;
        let new_version = job.version + 1;

        let old = if expected == 0 {
            None
        } else {
            Some(self.get_job_by_id(job.id).await?)
        };
        let write_set = rewrite_indexes_for(old.as_ref(), &job);

        let mut saved = job.clone();
        saved.version = new_version;

        let ok = self.apply_save(expected, new_version, &saved, &write_set).await?;
        if !ok {
            let stored = self.get_job_by_id(job.id).await.ok();
            return Err(StorageError::concurrent_modification(stored.into_iter().collect()));
        }

        tracing::debug!(job_id = %saved.id, version = saved.version, "saved job");
        Ok(saved)
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
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(keys::job(&self.prefix, id)).await.map_err(map_redis_error)?;
        let raw = raw.ok_or_else(|| StorageError::job_not_found(id))?;
        from_json(&raw)
    }

    async fn delete_permanently(&self, id: JobId) -> Result<u64, StorageError> {
        let job = match self.get_job_by_id(id).await {
            Ok(job) => job,
            Err(StorageError::JobNotFound { .. }) => return Ok(0),
            Err(e) => return Err(e),
        };
        let write_set = remove_all_indexes_for(&job);
        let ops_arg = ops_json(&self.prefix, &write_set.removals)?;

        let mut conn = self.conn().await?;
        let removed: i64 = self
            .delete_script
            .key(keys::job(&self.prefix, id))
            .key(keys::job_version(&self.prefix, id))
            .arg(ops_arg)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(removed as u64)
    }

    async fn get_jobs(
        &self,
        state: JobState,
        updated_before: Option<DateTime<Utc>>,
        page: PageRequest,
    ) -> Result<Page<Job>, StorageError> {
        page.validate()?;
        let mut conn = self.conn().await?;
        let key = keys::queue(&self.prefix, state);

        let (total, ids): (u64, Vec<String>) = if let Some(before) = updated_before {
            let micros = before.timestamp_micros();
            let total: u64 = conn.zcount(&key, "-inf", micros).await.map_err(map_redis_error)?;
            let ids: Vec<String> = match page.order {
                PageOrder::UpdatedAtAsc => conn
                    .zrangebyscore_limit(&key, "-inf", micros, page.offset as isize, page.limit as isize)
                    .await
                    .map_err(map_redis_error)?,
                PageOrder::UpdatedAtDesc => conn
                    .zrevrangebyscore_limit(&key, micros, "-inf", page.offset as isize, page.limit as isize)
                    .await
                    .map_err(map_redis_error)?,
            };
            (total, ids)
        } else {
            let total: u64 = conn.zcard(&key).await.map_err(map_redis_error)?;
            let start = page.offset as isize;
            let stop = start + page.limit as isize - 1;
            let ids: Vec<String> = match page.order {
                PageOrder::UpdatedAtAsc => conn.zrange(&key, start, stop).await.map_err(map_redis_error)?,
                PageOrder::UpdatedAtDesc => conn.zrevrange(&key, start, stop).await.map_err(map_redis_error)?,
            };
            (total, ids)
        };

        let items = self.fetch_jobs(&ids).await?;
        Ok(Page { total, items })
    }

    async fn get_scheduled_jobs(&self, before: DateTime<Utc>, page: PageRequest) -> Result<Page<Job>, StorageError> {
        page.validate()?;
        let mut conn = self.conn().await?;
        let key = keys::scheduled(&self.prefix);
        let micros = before.timestamp_micros();

        let total: u64 = conn.zcount(&key, "-inf", micros).await.map_err(map_redis_error)?;
        let ids: Vec<String> = match page.order {
            PageOrder::UpdatedAtAsc => conn
                .zrangebyscore_limit(&key, "-inf", micros, page.offset as isize, page.limit as isize)
                .await
                .map_err(map_redis_error)?,
            PageOrder::UpdatedAtDesc => conn
                .zrevrangebyscore_limit(&key, micros, "-inf", page.offset as isize, page.limit as isize)
                .await
                .map_err(map_redis_error)?,
        };

        let items = self.fetch_jobs(&ids).await?;
        Ok(Page { total, items })
    }

    async fn get_job_page(&self, state: JobState, page: PageRequest) -> Result<Page<Job>, StorageError> {
        self.get_jobs(state, None, page).await
    }

    async fn delete_jobs_permanently(&self, state: JobState, updated_before: DateTime<Utc>) -> Result<u64, StorageError> {
        // Sorted sets have no single-statement conditional bulk delete;
        // fall back to the generic paged scan-and-delete driver.
        paged_delete_before(self, state, updated_before).await
    }

    async fn get_distinct_job_signatures(&self, states: &[JobState]) -> Result<Vec<String>, StorageError> {
        let mut conn = self.conn().await?;
        let mut set = std::collections::HashSet::new();
        for state in states {
            let members: Vec<String> = conn
                .zrange(keys::job_details(&self.prefix, *state), 0, -1)
                .await
                .map_err(map_redis_error)?;
            set.extend(members);
        }
        Ok(set.into_iter().collect())
    }

    async fn exists(&self, details: &JobDetails, states: &[JobState]) -> Result<bool, StorageError> {
        let mut conn = self.conn().await?;
        let signature = details.signature();
        for state in states {
            let score: Option<f64> = conn
                .zscore(keys::job_details(&self.prefix, *state), &signature)
                .await
                .map_err(map_redis_error)?;
            if score.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn save_recurring_job(&self, recurring_job: RecurringJob) -> Result<RecurringJob, StorageError> {
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(&recurring_job).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?;
        let _: () = conn
            .set(keys::recurring_job(&self.prefix, &recurring_job.id), json)
            .await
            .map_err(map_redis_error)?;
        let _: () = conn
            .sadd(keys::recurring_jobs(&self.prefix), &recurring_job.id)
            .await
            .map_err(map_redis_error)?;
        Ok(recurring_job)
    }

    async fn get_recurring_jobs(&self) -> Result<Vec<RecurringJob>, StorageError> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn
            .smembers(keys::recurring_jobs(&self.prefix))
            .await
            .map_err(map_redis_error)?;
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let raw: Option<String> = conn
                .get(keys::recurring_job(&self.prefix, &id))
                .await
                .map_err(map_redis_error)?;
            if let Some(raw) = raw {
                jobs.push(from_json(&raw)?);
            }
        }
        Ok(jobs)
    }

    async fn delete_recurring_job(&self, id: &str) -> Result<u64, StorageError> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn
            .del(keys::recurring_job(&self.prefix, id))
            .await
            .map_err(map_redis_error)?;
        let _: u64 = conn
            .srem(keys::recurring_jobs(&self.prefix), id)
            .await
            .map_err(map_redis_error)?;
        Ok(removed)
    }

    async fn recurring_job_exists(&self, id: &str, states: &[JobState]) -> Result<bool, StorageError> {
        let mut conn = self.conn().await?;
        for state in states {
            let score: Option<f64> = conn
                .zscore(keys::recurring_ref(&self.prefix, *state), id)
                .await
                .map_err(map_redis_error)?;
            if score.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn announce(&self, status: BackgroundJobServer) -> Result<BackgroundJobServer, StorageError> {
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(&status).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?;
        let _: () = conn.set(keys::server(&self.prefix, status.id), json).await.map_err(map_redis_error)?;
        let _: () = conn
            .zadd(keys::servers_created(&self.prefix), status.id.to_string(), status.first_heartbeat.timestamp_micros())
            .await
            .map_err(map_redis_error)?;
        let _: () = conn
            .zadd(keys::servers_updated(&self.prefix), status.id.to_string(), status.last_heartbeat.timestamp_micros())
            .await
            .map_err(map_redis_error)?;
        Ok(status)
    }

    async fn signal_alive(&self, status: BackgroundJobServer) -> Result<bool, StorageError> {
        let mut stored = self.get_server(status.id).await?.ok_or_else(|| StorageError::server_timed_out(status.id))?;
        stored.last_heartbeat = status.last_heartbeat;
        stored.telemetry = status.telemetry;

        let mut conn = self.conn().await?;
        let json = serde_json::to_string(&stored).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?;
        let _: () = conn.set(keys::server(&self.prefix, status.id), json).await.map_err(map_redis_error)?;
        let _: () = conn
            .zadd(keys::servers_updated(&self.prefix), status.id.to_string(), status.last_heartbeat.timestamp_micros())
            .await
            .map_err(map_redis_error)?;
        Ok(stored.is_running)
    }

    async fn signal_stopped(&self, id: Uuid) -> Result<(), StorageError> {
        let mut conn = self.conn().await?;
        let _: u64 = conn.del(keys::server(&self.prefix, id)).await.map_err(map_redis_error)?;
        let _: u64 = conn.zrem(keys::servers_created(&self.prefix), id.to_string()).await.map_err(map_redis_error)?;
        let _: u64 = conn.zrem(keys::servers_updated(&self.prefix), id.to_string()).await.map_err(map_redis_error)?;
        Ok(())
    }

    async fn get_servers(&self) -> Result<Vec<BackgroundJobServer>, StorageError> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.zrange(keys::servers_created(&self.prefix), 0, -1).await.map_err(map_redis_error)?;
        let mut servers = Vec::with_capacity(ids.len());
        for id in ids {
            let raw: Option<String> = conn.get(keys::server(&self.prefix, id.parse().map_err(|_| StorageError::fatal(anyhow::anyhow!("corrupt server id")))?)).await.map_err(map_redis_error)?;
            if let Some(raw) = raw {
                servers.push(from_json(&raw)?);
            }
        }
        Ok(servers)
    }

    async fn get_longest_running(&self) -> Result<BackgroundJobServer, StorageError> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.zrange(keys::servers_created(&self.prefix), 0, 0).await.map_err(map_redis_error)?;
        let id = ids
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::invalid_argument("no background job servers are registered"))?;
        let uuid = id.parse().map_err(|_| StorageError::fatal(anyhow::anyhow!("corrupt server id")))?;
        self.get_server(uuid)
            .await?
            .ok_or_else(|| StorageError::invalid_argument("no background job servers are registered"))
    }

    async fn remove_timed_out(&self, older_than: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut conn = self.conn().await?;
        let micros = older_than.timestamp_micros();
        let ids: Vec<String> = conn
            .zrangebyscore(keys::servers_updated(&self.prefix), "-inf", micros)
            .await
            .map_err(map_redis_error)?;
        let mut removed = 0u64;
        for id in &ids {
            let uuid: Uuid = id.parse().map_err(|_| StorageError::fatal(anyhow::anyhow!("corrupt server id")))?;
            let deleted: u64 = conn.del(keys::server(&self.prefix, uuid)).await.map_err(map_redis_error)?;
            let _: u64 = conn.zrem(keys::servers_created(&self.prefix), id).await.map_err(map_redis_error)?;
            let _: u64 = conn.zrem(keys::servers_updated(&self.prefix), id).await.map_err(map_redis_error)?;
            removed += deleted;
        }
        Ok(removed)
    }

    async fn save_metadata(&self, metadata: MetadataRecord) -> Result<MetadataRecord, StorageError> {
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(&metadata).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?;
        let _: () = conn
            .set(keys::metadata(&self.prefix, &metadata.name, &metadata.owner), json)
            .await
            .map_err(map_redis_error)?;
        let _: () = conn
            .sadd(keys::metadata_owners(&self.prefix, &metadata.name), &metadata.owner)
            .await
            .map_err(map_redis_error)?;
        Ok(metadata)
    }

    async fn get_metadata_by_name(&self, name: &str) -> Result<Vec<MetadataRecord>, StorageError> {
        let mut conn = self.conn().await?;
        let owners: Vec<String> = conn.smembers(keys::metadata_owners(&self.prefix, name)).await.map_err(map_redis_error)?;
        let mut records = Vec::with_capacity(owners.len());
        for owner in owners {
            let raw: Option<String> = conn.get(keys::metadata(&self.prefix, name, &owner)).await.map_err(map_redis_error)?;
            if let Some(raw) = raw {
                records.push(from_json(&raw)?);
            }
        }
        Ok(records)
    }

    async fn get_metadata(&self, name: &str, owner: &str) -> Result<Option<MetadataRecord>, StorageError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(keys::metadata(&self.prefix, name, owner)).await.map_err(map_redis_error)?;
        raw.map(|r| from_json(&r)).transpose()
    }

    async fn delete_metadata(&self, name: &str) -> Result<u64, StorageError> {
        let mut conn = self.conn().await?;
        let owners: Vec<String> = conn.smembers(keys::metadata_owners(&self.prefix, name)).await.map_err(map_redis_error)?;
        let mut removed = 0u64;
        for owner in &owners {
            let deleted: u64 = conn.del(keys::metadata(&self.prefix, name, owner)).await.map_err(map_redis_error)?;
            removed += deleted;
        }
        let _: u64 = conn.del(keys::metadata_owners(&self.prefix, name)).await.map_err(map_redis_error)?;
        Ok(removed)
    }

    async fn get_job_stats(&self) -> Result<JobStats, StorageError> {
        let mut conn = self.conn().await?;
        let mut stats = JobStats::default();
        for state in JobState::ALL {
            let count: u64 = conn.zcard(keys::queue(&self.prefix, state)).await.map_err(map_redis_error)?;
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
        stats.recurring_jobs = conn.scard(keys::recurring_jobs(&self.prefix)).await.map_err(map_redis_error)?;
        stats.background_job_servers = conn.zcard(keys::servers_created(&self.prefix)).await.map_err(map_redis_error)?;
        stats.all_time_succeeded = conn
            .get::<_, Option<u64>>(keys::succeeded_counter(&self.prefix))
            .await
            .map_err(map_redis_error)?
            .unwrap_or(0);
        Ok(stats)
    }

    async fn publish_total_amount_of_succeeded_jobs(&self, n: u64) -> Result<(), StorageError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn.incr(keys::succeeded_counter(&self.prefix), n as i64).await.map_err(map_redis_error)?;
        Ok(())
    }
}

impl RedisStorageProvider {
    async fn fetch_jobs(&self, ids: &[String]) -> Result<Vec<Job>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let keys: Vec<String> = ids
            .iter()
            .map(|id| keys::job(&self.prefix, id.parse().unwrap_or_default()))
            .collect();
        let raws: Vec<Option<String>> = conn.get(keys).await.map_err(map_redis_error)?;
        raws.into_iter().flatten().map(|r| from_json(&r)).collect()
    }

    async fn get_server(&self, id: Uuid) -> Result<Option<BackgroundJobServer>, StorageError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(keys::server(&self.prefix, id)).await.map_err(map_redis_error)?;
        raw.map(|r| from_json(&r)).transpose()
    }
}
