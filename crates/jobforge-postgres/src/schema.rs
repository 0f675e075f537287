//! DDL for the five tables + one view, prefixable.

/// Renders the full bundle of `CREATE TABLE IF NOT EXISTS`/`CREATE VIEW`
/// statements for the given table prefix, in dependency order.
pub fn create_statements(prefix: &str) -> Vec<String> {
    vec![
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {prefix}_jobs (
                id UUID PRIMARY KEY,
                version BIGINT NOT NULL,
                state TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                scheduled_at TIMESTAMPTZ,
                recurring_job_id TEXT,
                signature TEXT NOT NULL,
                job_as_json JSONB NOT NULL
            )
            "#
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{prefix}_jobs_state_updated ON {prefix}_jobs (state, updated_at)"),
        format!("CREATE INDEX IF NOT EXISTS idx_{prefix}_jobs_state_scheduled ON {prefix}_jobs (state, scheduled_at)"),
        format!("CREATE INDEX IF NOT EXISTS idx_{prefix}_jobs_recurring_state ON {prefix}_jobs (recurring_job_id, state)"),
        format!("CREATE INDEX IF NOT EXISTS idx_{prefix}_jobs_signature_state ON {prefix}_jobs (signature, state)"),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {prefix}_recurring_jobs (
                id TEXT PRIMARY KEY,
                job_as_json JSONB NOT NULL
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {prefix}_background_job_servers (
                id UUID PRIMARY KEY,
                name TEXT,
                worker_pool_size INTEGER NOT NULL,
                poll_interval_millis BIGINT NOT NULL,
                first_heartbeat TIMESTAMPTZ NOT NULL,
                last_heartbeat TIMESTAMPTZ NOT NULL,
                is_running BOOLEAN NOT NULL,
                telemetry JSONB NOT NULL
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {prefix}_metadata (
                name TEXT NOT NULL,
                owner TEXT NOT NULL,
                value JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (name, owner)
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {prefix}_migrations (
                id TEXT PRIMARY KEY,
                script TEXT NOT NULL,
                installed_at TIMESTAMPTZ NOT NULL
            )
            "#
        ),
        format!(
            r#"
            CREATE OR REPLACE VIEW {prefix}_jobs_stats AS
            SELECT
                COUNT(*) FILTER (WHERE state = 'AWAITING') AS awaiting,
                COUNT(*) FILTER (WHERE state = 'SCHEDULED') AS scheduled,
                COUNT(*) FILTER (WHERE state = 'ENQUEUED') AS enqueued,
                COUNT(*) FILTER (WHERE state = 'PROCESSING') AS processing,
                COUNT(*) FILTER (WHERE state = 'SUCCEEDED') AS succeeded,
                COUNT(*) FILTER (WHERE state = 'FAILED') AS failed,
                COUNT(*) FILTER (WHERE state = 'DELETED') AS deleted
            FROM {prefix}_jobs
            "#
        ),
    ]
}

/// `SELECT` fragment shared by every table-reading query; a single
/// `job_as_json` cast is the only way a row is turned back into a `Job`.
pub fn jobs_table(prefix: &str) -> String {
    format!("{prefix}_jobs")
}

pub fn recurring_jobs_table(prefix: &str) -> String {
    format!("{prefix}_recurring_jobs")
}

pub fn servers_table(prefix: &str) -> String {
    format!("{prefix}_background_job_servers")
}

pub fn metadata_table(prefix: &str) -> String {
    format!("{prefix}_metadata")
}

pub fn stats_view(prefix: &str) -> String {
    format!("{prefix}_jobs_stats")
}
