use std::sync::Arc;

use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::sqlite::SqliteConnection;
use tracing::info;

use crate::{
    catalog,
    config::AppConfig,
    db::{self, SqlitePool},
    error::{AppError, AppResult},
    session::UploadSessions,
    storage::{FileStore, LocalStore},
};

type SqlitePooledConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn FileStore>,
    pub sessions: Arc<UploadSessions>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig, store: Arc<dyn FileStore>) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            store,
            sessions: Arc::new(UploadSessions::default()),
        }
    }

    pub fn db(&self) -> AppResult<SqlitePooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(anyhow::anyhow!("database pool error: {err}")))
    }

    pub fn admin_id(&self) -> i64 {
        self.config.admin_id
    }
}

/// Full startup: content directory, pool, migrations, admin seed. Any
/// failure here aborts startup.
pub async fn init(config: AppConfig) -> anyhow::Result<AppState> {
    let store = LocalStore::create(&config.storage_dir).await?;
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;

    let mut conn = pool.get()?;
    db::run_migrations(&mut conn)?;
    catalog::seed_admin(&mut conn, config.admin_id)?;
    drop(conn);

    info!(
        admin_id = config.admin_id,
        storage_dir = %config.storage_dir.display(),
        "catalog ready"
    );

    Ok(AppState::new(pool, config, Arc::new(store)))
}
