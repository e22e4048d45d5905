use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::db::DEFAULT_MAX_POOL_SIZE;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// The single trusted identity. Identity-based, not flag-based: the
    /// admin is treated as approved no matter what the catalog says.
    pub admin_id: i64,
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub storage_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let admin_id = env::var("ADMIN_ID")
            .context("ADMIN_ID must be set")?
            .parse()
            .context("ADMIN_ID must be an integer")?;
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let storage_dir = env::var("STORAGE_DIR")
            .unwrap_or_else(|_| "storage".to_string())
            .into();

        Ok(Self {
            admin_id,
            database_url,
            database_max_pool_size,
            storage_dir,
        })
    }
}
