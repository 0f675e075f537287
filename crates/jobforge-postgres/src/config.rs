//! Environment-driven configuration for the Postgres backend.
//!
//! `jobforge-core` itself never reads environment variables (its
//! `StorageProvider` implementations take an already-constructed pool);
//! this module is the boundary where a deployed process turns
//! `DATABASE_URL` et al. into one.

use std::env;

use anyhow::{Context, Result};

/// What a provider should do about schema objects on startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseOptions {
    /// Run the bundled DDL if the tables are missing.
    Create,
    /// Assume the schema already exists; never issue DDL.
    SkipCreate,
    /// Check the schema matches what this crate expects and fail fast if not.
    Validate,
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    pub table_prefix: String,
    pub max_connections: u32,
    pub database_options: DatabaseOptions,
}

impl PostgresConfig {
    /// Reads `DATABASE_URL` (required), `JOBFORGE_TABLE_PREFIX` (default
    /// `jobforge`), and `JOBFORGE_PG_MAX_CONNECTIONS` (default 10).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            table_prefix: env::var("JOBFORGE_TABLE_PREFIX").unwrap_or_else(|_| "jobforge".into()),
            max_connections: env::var("JOBFORGE_PG_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".into())
                .parse()
                .context("JOBFORGE_PG_MAX_CONNECTIONS must be a valid number")?,
            database_options: DatabaseOptions::Create,
        })
    }
}
