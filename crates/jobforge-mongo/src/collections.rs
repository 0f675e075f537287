//! Collection-name resolution, one collection per table-equivalent,
//! prefixable the same way the SQL backend's tables are.

#[derive(Debug, Clone)]
pub struct Collections {
    pub jobs: String,
    pub recurring_jobs: String,
    pub background_job_servers: String,
    pub metadata: String,
}

impl Collections {
    pub fn with_prefix(prefix: &str) -> Self {
        let name = |suffix: &str| -> String {
            if prefix.is_empty() {
                suffix.to_string()
            } else {
                format!("{prefix}_{suffix}")
            }
        };
        Self {
            jobs: name("jobs"),
            recurring_jobs: name("recurring_jobs"),
            background_job_servers: name("background_job_servers"),
            metadata: name("metadata"),
        }
    }
}
