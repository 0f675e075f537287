//! Environment-driven configuration for the MongoDB backend.

use std::env;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub mongodb_uri: String,
    pub database_name: String,
    pub collection_prefix: String,
}

impl MongoConfig {
    /// Reads `MONGODB_URI` (required), `JOBFORGE_DB_NAME` (default
    /// `jobforge`), and `JOBFORGE_COLLECTION_PREFIX` (default empty).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            mongodb_uri: env::var("MONGODB_URI").context("MONGODB_URI must be set")?,
            database_name: env::var("JOBFORGE_DB_NAME").unwrap_or_else(|_| "jobforge".into()),
            collection_prefix: env::var("JOBFORGE_COLLECTION_PREFIX").unwrap_or_default(),
        })
    }
}
