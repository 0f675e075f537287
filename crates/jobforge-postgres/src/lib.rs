//! PostgreSQL `StorageProvider` implementation for jobforge-core.
//!
//! One table per primary (`jobs`, `recurring_jobs`,
//! `background_job_servers`, `metadata`) plus a stats view. Secondary
//! indexes (state queue, scheduled set, signature-by-state,
//! recurring-refs-by-state) are not separate physical structures here —
//! they are SQL indexes on the `jobs` table's
//! `state`/`updated_at`/`scheduled_at`/`recurring_job_id`/`signature`
//! columns, so `jobforge_core`'s index write-sets are not applied
//! directly; the single `UPDATE ... WHERE id = $1 AND version = $2`
//! statement both arbitrates the version and rewrites every index in one
//! atomic group.

mod config;
mod schema;

pub use config::{DatabaseOptions, PostgresConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobforge_core::{
    BackgroundJobServer, Job, JobDetails, JobId, JobState, JobStats, MetadataRecord, Page,
    PageOrder, PageRequest, RecurringJob, StorageError, StorageProvider,
};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

fn to_fatal(err: sqlx::Error) -> StorageError {
    StorageError::fatal(anyhow::Error::new(err))
}

fn to_transient(err: sqlx::Error) -> StorageError {
    StorageError::transient(anyhow::Error::new(err))
}

/// Maps a `sqlx::Error` the way every method here does: connection pool
/// exhaustion and timeouts are retryable, everything else (constraint
/// violations aside from the ones we handle explicitly, protocol errors)
/// is fatal.
fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => to_transient(err),
        _ => to_fatal(err),
    }
}

fn job_from_row(row: &sqlx::postgres::PgRow) -> Result<Job, StorageError> {
    let json: Value = row.try_get("job_as_json").map_err(to_fatal)?;
    let mut job: Job = serde_json::from_value(json).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?;
    job.version = row.try_get::<i64, _>("version").map_err(to_fatal)? as u64;
    Ok(job)
}

struct JobRow {
    id: Uuid,
    version: i64,
    state: String,
    updated_at: DateTime<Utc>,
    scheduled_at: Option<DateTime<Utc>>,
    recurring_job_id: Option<String>,
    signature: String,
    job_as_json: Value,
}

fn row_for(job: &Job) -> Result<JobRow, StorageError> {
    let job_as_json = serde_json::to_value(job).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?;
    Ok(JobRow {
        id: job.id,
        version: job.version as i64,
        state: job.state().as_key().to_string(),
        updated_at: job.updated_at,
        scheduled_at: job.scheduled_at(),
        recurring_job_id: job.recurring_job_id(),
        signature: job.signature(),
        job_as_json,
    })
}

fn order_clause(order: PageOrder) -> &'static str {
    match order {
        PageOrder::UpdatedAtAsc => "ASC",
        PageOrder::UpdatedAtDesc => "DESC",
    }
}

/// A fully compliant `StorageProvider` backed by a `sqlx::PgPool`.
pub struct PgStorageProvider {
    pool: PgPool,
    prefix: String,
}

impl PgStorageProvider {
    pub fn new(pool: PgPool, table_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            prefix: table_prefix.into(),
        }
    }

    /// Runs the bundled DDL, creating tables/indexes/the stats view if
    /// absent. A no-op under `DatabaseOptions::SkipCreate`.
    pub async fn ensure_schema(&self, options: DatabaseOptions) -> Result<(), StorageError> {
        if options == DatabaseOptions::SkipCreate {
            return Ok(());
        }
        for statement in schema::create_statements(&self.prefix) {
            sqlx::query(&statement).execute(&self.pool).await.map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StorageProvider for PgStorageProvider {
    async fn save_job(&self, job: Job) -> Result<Job, StorageError> {
        let table = schema::jobs_table(&self.prefix);
        let row = row_for(&job)?;

        if job.version == 0 {
            let inserted = sqlx::query(&format!(
                "INSERT INTO {table} (id, version, state, updated_at, scheduled_at, recurring_job_id, signature, job_as_json)
                 VALUES ($1, 1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (id) DO NOTHING"
            ))
            .bind(row.id)
            .bind(&row.state)
            .bind(row.updated_at)
            .bind(row.scheduled_at)
            .bind(&row.recurring_job_id)
            .bind(&row.signature)
            .bind(&row.job_as_json)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            if inserted.rows_affected() == 0 {
                let existing = self.get_job_by_id(job.id).await?;
                return Err(StorageError::concurrent_modification(vec![existing]));
            }
            let mut saved = job;
            saved.version = 1;
            tracing::debug!(job_id = %saved.id, state = %saved.state(), "inserted job");
            return Ok(saved);
        }

        let next_version = job.version as i64 + 1;
        let result = sqlx::query(&format!(
            "UPDATE {table}
             SET version = $1, state = $2, updated_at = $3, scheduled_at = $4,
                 recurring_job_id = $5, signature = $6, job_as_json = $7
             WHERE id = $8 AND version = $9"
        ))
        .bind(next_version)
        .bind(&row.state)
        .bind(row.updated_at)
        .bind(row.scheduled_at)
        .bind(&row.recurring_job_id)
        .bind(&row.signature)
        .bind(&row.job_as_json)
        .bind(row.id)
        .bind(job.version as i64)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            let existing = self.get_job_by_id(job.id).await?;
            return Err(StorageError::concurrent_modification(vec![existing]));
        }

        let mut saved = job;
        saved.version = next_version as u64;
        tracing::debug!(job_id = %saved.id, version = saved.version, "updated job");
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
        let table = schema::jobs_table(&self.prefix);
        let row = sqlx::query(&format!("SELECT version, job_as_json FROM {table} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| StorageError::job_not_found(id))?;
        job_from_row(&row)
    }

    async fn delete_permanently(&self, id: JobId) -> Result<u64, StorageError> {
        let table = schema::jobs_table(&self.prefix);
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn get_jobs(
        &self,
        state: JobState,
        updated_before: Option<DateTime<Utc>>,
        page: PageRequest,
    ) -> Result<Page<Job>, StorageError> {
        page.validate()?;
        let table = schema::jobs_table(&self.prefix);
        let order = order_clause(page.order);

        let total: i64 = if let Some(before) = updated_before {
            sqlx::query_scalar(&format!(
                "SELECT COUNT(*) FROM {table} WHERE state = $1 AND updated_at <= $2"
            ))
            .bind(state.as_key())
            .bind(before)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?
        } else {
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE state = $1"))
                .bind(state.as_key())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?
        };

        let rows = if let Some(before) = updated_before {
            sqlx::query(&format!(
                "SELECT version, job_as_json FROM {table} WHERE state = $1 AND updated_at <= $2
                 ORDER BY updated_at {order} OFFSET $3 LIMIT $4"
            ))
            .bind(state.as_key())
            .bind(before)
            .bind(page.offset as i64)
            .bind(page.limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?
        } else {
            sqlx::query(&format!(
                "SELECT version, job_as_json FROM {table} WHERE state = $1
                 ORDER BY updated_at {order} OFFSET $2 LIMIT $3"
            ))
            .bind(state.as_key())
            .bind(page.offset as i64)
            .bind(page.limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?
        };

        let items = rows.iter().map(job_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            total: total as u64,
            items,
        })
    }

    async fn get_scheduled_jobs(&self, before: DateTime<Utc>, page: PageRequest) -> Result<Page<Job>, StorageError> {
        page.validate()?;
        let table = schema::jobs_table(&self.prefix);
        let order = order_clause(page.order);

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {table} WHERE state = 'SCHEDULED' AND scheduled_at <= $1"
        ))
        .bind(before)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let rows = sqlx::query(&format!(
            "SELECT version, job_as_json FROM {table} WHERE state = 'SCHEDULED' AND scheduled_at <= $1
             ORDER BY scheduled_at {order} OFFSET $2 LIMIT $3"
        ))
        .bind(before)
        .bind(page.offset as i64)
        .bind(page.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let items = rows.iter().map(job_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            total: total as u64,
            items,
        })
    }

    async fn get_job_page(&self, state: JobState, page: PageRequest) -> Result<Page<Job>, StorageError> {
        self.get_jobs(state, None, page).await
    }

    async fn delete_jobs_permanently(&self, state: JobState, updated_before: DateTime<Utc>) -> Result<u64, StorageError> {
        let table = schema::jobs_table(&self.prefix);
        // A single statement expresses the whole paging-traversal rule:
        // Postgres can apply the cutoff and the implicit ascending-
        // updated_at ordering in one `DELETE ... WHERE`.
        let result = sqlx::query(&format!(
            "DELETE FROM {table} WHERE id IN (
                SELECT id FROM {table} WHERE state = $1 AND updated_at <= $2 ORDER BY updated_at ASC
             )"
        ))
        .bind(state.as_key())
        .bind(updated_before)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn get_distinct_job_signatures(&self, states: &[JobState]) -> Result<Vec<String>, StorageError> {
        let table = schema::jobs_table(&self.prefix);
        let keys: Vec<&str> = states.iter().map(JobState::as_key).collect();
        let rows: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT DISTINCT signature FROM {table} WHERE state = ANY($1)"
        ))
        .bind(&keys)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    async fn exists(&self, details: &JobDetails, states: &[JobState]) -> Result<bool, StorageError> {
        let table = schema::jobs_table(&self.prefix);
        let keys: Vec<&str> = states.iter().map(JobState::as_key).collect();
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {table} WHERE signature = $1 AND state = ANY($2)"
        ))
        .bind(details.signature())
        .bind(&keys)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(count > 0)
    }

    async fn save_recurring_job(&self, recurring_job: RecurringJob) -> Result<RecurringJob, StorageError> {
        let table = schema::recurring_jobs_table(&self.prefix);
        let json = serde_json::to_value(&recurring_job).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?;
        sqlx::query(&format!(
            "INSERT INTO {table} (id, job_as_json) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET job_as_json = EXCLUDED.job_as_json"
        ))
        .bind(&recurring_job.id)
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(recurring_job)
    }

    async fn get_recurring_jobs(&self) -> Result<Vec<RecurringJob>, StorageError> {
        let table = schema::recurring_jobs_table(&self.prefix);
        let rows: Vec<(Value,)> = sqlx::query_as(&format!("SELECT job_as_json FROM {table}"))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter()
            .map(|(v,)| serde_json::from_value(v).map_err(|e| StorageError::fatal(anyhow::Error::new(e))))
            .collect()
    }

    async fn delete_recurring_job(&self, id: &str) -> Result<u64, StorageError> {
        let table = schema::recurring_jobs_table(&self.prefix);
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn recurring_job_exists(&self, id: &str, states: &[JobState]) -> Result<bool, StorageError> {
        let table = schema::jobs_table(&self.prefix);
        let keys: Vec<&str> = states.iter().map(JobState::as_key).collect();
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {table} WHERE recurring_job_id = $1 AND state = ANY($2)"
        ))
        .bind(id)
        .bind(&keys)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(count > 0)
    }

    async fn announce(&self, status: BackgroundJobServer) -> Result<BackgroundJobServer, StorageError> {
        let table = schema::servers_table(&self.prefix);
        let telemetry = serde_json::to_value(&status.telemetry).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?;
        sqlx::query(&format!(
            "INSERT INTO {table} (id, name, worker_pool_size, poll_interval_millis, first_heartbeat, last_heartbeat, is_running, telemetry)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                worker_pool_size = EXCLUDED.worker_pool_size,
                poll_interval_millis = EXCLUDED.poll_interval_millis,
                last_heartbeat = EXCLUDED.last_heartbeat,
                is_running = EXCLUDED.is_running,
                telemetry = EXCLUDED.telemetry"
        ))
        .bind(status.id)
        .bind(&status.name)
        .bind(status.worker_pool_size as i32)
        .bind(status.poll_interval_millis as i64)
        .bind(status.first_heartbeat)
        .bind(status.last_heartbeat)
        .bind(status.is_running)
        .bind(telemetry)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(status)
    }

    async fn signal_alive(&self, status: BackgroundJobServer) -> Result<bool, StorageError> {
        let table = schema::servers_table(&self.prefix);
        let telemetry = serde_json::to_value(&status.telemetry).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?;
        let row = sqlx::query(&format!(
            "UPDATE {table} SET last_heartbeat = $1, telemetry = $2 WHERE id = $3 RETURNING is_running"
        ))
        .bind(status.last_heartbeat)
        .bind(telemetry)
        .bind(status.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| StorageError::server_timed_out(status.id))?;
        row.try_get("is_running").map_err(to_fatal)
    }

    async fn signal_stopped(&self, id: Uuid) -> Result<(), StorageError> {
        let table = schema::servers_table(&self.prefix);
        sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_servers(&self) -> Result<Vec<BackgroundJobServer>, StorageError> {
        let table = schema::servers_table(&self.prefix);
        let rows = sqlx::query(&format!(
            "SELECT id, name, worker_pool_size, poll_interval_millis, first_heartbeat, last_heartbeat, is_running, telemetry
             FROM {table} ORDER BY first_heartbeat ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(server_from_row).collect()
    }

    async fn get_longest_running(&self) -> Result<BackgroundJobServer, StorageError> {
        let table = schema::servers_table(&self.prefix);
        let row = sqlx::query(&format!(
            "SELECT id, name, worker_pool_size, poll_interval_millis, first_heartbeat, last_heartbeat, is_running, telemetry
             FROM {table} ORDER BY first_heartbeat ASC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| StorageError::invalid_argument("no background job servers are registered"))?;
        server_from_row(&row)
    }

    async fn remove_timed_out(&self, older_than: DateTime<Utc>) -> Result<u64, StorageError> {
        let table = schema::servers_table(&self.prefix);
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE last_heartbeat <= $1"))
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn save_metadata(&self, metadata: MetadataRecord) -> Result<MetadataRecord, StorageError> {
        let table = schema::metadata_table(&self.prefix);
        sqlx::query(&format!(
            "INSERT INTO {table} (name, owner, value, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (name, owner) DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at"
        ))
        .bind(&metadata.name)
        .bind(&metadata.owner)
        .bind(&metadata.value)
        .bind(metadata.created_at)
        .bind(metadata.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(metadata)
    }

    async fn get_metadata_by_name(&self, name: &str) -> Result<Vec<MetadataRecord>, StorageError> {
        let table = schema::metadata_table(&self.prefix);
        let rows = sqlx::query(&format!(
            "SELECT name, owner, value, created_at, updated_at FROM {table} WHERE name = $1"
        ))
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(metadata_from_row).collect()
    }

    async fn get_metadata(&self, name: &str, owner: &str) -> Result<Option<MetadataRecord>, StorageError> {
        let table = schema::metadata_table(&self.prefix);
        let row = sqlx::query(&format!(
            "SELECT name, owner, value, created_at, updated_at FROM {table} WHERE name = $1 AND owner = $2"
        ))
        .bind(name)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.as_ref().map(metadata_from_row).transpose()
    }

    async fn delete_metadata(&self, name: &str) -> Result<u64, StorageError> {
        let table = schema::metadata_table(&self.prefix);
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE name = $1"))
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn get_job_stats(&self) -> Result<JobStats, StorageError> {
        let stats_view = schema::stats_view(&self.prefix);
        let recurring_table = schema::recurring_jobs_table(&self.prefix);
        let servers_table = schema::servers_table(&self.prefix);
        let metadata_table = schema::metadata_table(&self.prefix);

        let row = sqlx::query(&format!(
            "SELECT awaiting, scheduled, enqueued, processing, succeeded, failed, deleted FROM {stats_view}"
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let recurring_jobs: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {recurring_table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let background_job_servers: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {servers_table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let all_time_succeeded: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT value::text::bigint FROM {metadata_table} WHERE name = 'succeeded-jobs-counter' AND owner = 'cluster'"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        let all_time_succeeded = all_time_succeeded.unwrap_or(0);

        Ok(JobStats {
            awaiting: row.try_get::<i64, _>("awaiting").map_err(to_fatal)? as u64,
            scheduled: row.try_get::<i64, _>("scheduled").map_err(to_fatal)? as u64,
            enqueued: row.try_get::<i64, _>("enqueued").map_err(to_fatal)? as u64,
            processing: row.try_get::<i64, _>("processing").map_err(to_fatal)? as u64,
            succeeded: row.try_get::<i64, _>("succeeded").map_err(to_fatal)? as u64,
            failed: row.try_get::<i64, _>("failed").map_err(to_fatal)? as u64,
            deleted: row.try_get::<i64, _>("deleted").map_err(to_fatal)? as u64,
            all_time_succeeded: all_time_succeeded as u64,
            recurring_jobs: recurring_jobs as u64,
            background_job_servers: background_job_servers as u64,
        })
    }

    async fn publish_total_amount_of_succeeded_jobs(&self, n: u64) -> Result<(), StorageError> {
        let table = schema::metadata_table(&self.prefix);
        sqlx::query(&format!(
            "INSERT INTO {table} (name, owner, value, created_at, updated_at)
             VALUES ('succeeded-jobs-counter', 'cluster', to_jsonb($1::bigint), NOW(), NOW())
             ON CONFLICT (name, owner) DO UPDATE SET
                value = to_jsonb(({table}.value::text::bigint + $1)),
                updated_at = NOW()"
        ))
        .bind(n as i64)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}

fn server_from_row(row: &sqlx::postgres::PgRow) -> Result<BackgroundJobServer, StorageError> {
    let telemetry_json: Value = row.try_get("telemetry").map_err(to_fatal)?;
    Ok(BackgroundJobServer {
        id: row.try_get("id").map_err(to_fatal)?,
        name: row.try_get("name").map_err(to_fatal)?,
        worker_pool_size: row.try_get::<i32, _>("worker_pool_size").map_err(to_fatal)? as u32,
        poll_interval_millis: row.try_get::<i64, _>("poll_interval_millis").map_err(to_fatal)? as u64,
        first_heartbeat: row.try_get("first_heartbeat").map_err(to_fatal)?,
        last_heartbeat: row.try_get("last_heartbeat").map_err(to_fatal)?,
        is_running: row.try_get("is_running").map_err(to_fatal)?,
        telemetry: serde_json::from_value(telemetry_json).map_err(|e| StorageError::fatal(anyhow::Error::new(e)))?,
    })
}

fn metadata_from_row(row: &sqlx::postgres::PgRow) -> Result<MetadataRecord, StorageError> {
    Ok(MetadataRecord {
        name: row.try_get("name").map_err(to_fatal)?,
        owner: row.try_get("owner").map_err(to_fatal)?,
        value: row.try_get("value").map_err(to_fatal)?,
        created_at: row.try_get("created_at").map_err(to_fatal)?,
        updated_at: row.try_get("updated_at").map_err(to_fatal)?,
    })
}
