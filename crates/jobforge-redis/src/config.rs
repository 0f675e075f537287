//! Environment-driven configuration for the Redis backend.

use std::env;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub redis_url: String,
    pub key_prefix: String,
    pub pool_size: usize,
}

impl RedisConfig {
    /// Reads `REDIS_URL` (default `redis://localhost:6379`),
    /// `JOBFORGE_KEY_PREFIX` (default `jobforge`), and
    /// `JOBFORGE_REDIS_POOL_SIZE` (default 10).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: env::var("JOBFORGE_KEY_PREFIX").unwrap_or_else(|_| "jobforge".into()),
            pool_size: env::var("JOBFORGE_REDIS_POOL_SIZE")
                .unwrap_or_else(|_| "10".into())
                .parse()
                .context("JOBFORGE_REDIS_POOL_SIZE must be a valid number")?,
        })
    }
}
