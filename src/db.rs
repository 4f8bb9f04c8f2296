pub mod transaction;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::migrator::Migrator;
use metrics::{counter, gauge, histogram};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub use transaction::{TreeLock, UnitOfWork};

/// The categories store. Cheap to clone; every clone shares one pool.
pub type DbPool = DatabaseConnection;

/// Pool settings for the categories store
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl DbConfig {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Every connection to `sqlite::memory:` opens its own empty database.
    pub fn is_in_memory_sqlite(&self) -> bool {
        self.url.starts_with("sqlite") && self.url.contains(":memory:")
    }

    /// `(max, min)` pool size actually used. An in-memory SQLite store is
    /// pinned to one connection so every query sees the same database.
    fn pool_bounds(&self) -> (u32, u32) {
        if self.is_in_memory_sqlite() {
            (1, 1)
        } else {
            (self.max_connections, self.min_connections.min(self.max_connections))
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Connects with default pool settings.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    establish_connection_with_config(&DbConfig::for_url(database_url)).await
}

/// Opens the pool described by `config`.
///
/// # Errors
/// Returns `ServiceError::DatabaseError` if the connection cannot be established
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    let (max_connections, min_connections) = config.pool_bounds();

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(max_connections)
        .min_connections(min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    let pool = Database::connect(opt).await.map_err(|e| {
        error!(error = %e, "Could not open categories store");
        ServiceError::DatabaseError(e)
    })?;

    let backend = pool.get_database_backend();
    if backend == DatabaseBackend::MySql {
        warn!("MySQL has no advisory transaction lock; only in-process writers are serialised");
    }
    gauge!("category_tree.db.max_connections", max_connections as f64);
    info!(
        backend = ?backend,
        max_connections,
        min_connections,
        "Categories store connected"
    );

    Ok(pool)
}

/// Connects using the pool tuning from application config.
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    establish_connection_with_config(&DbConfig::from(cfg)).await
}

/// Applies every pending migration. Already-applied ones are skipped.
///
/// # Errors
/// Returns `ServiceError::DatabaseError` if a migration fails
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    let pending = Migrator::get_pending_migrations(pool)
        .await
        .map_err(ServiceError::DatabaseError)?;
    if pending.is_empty() {
        debug!("Categories schema is up to date");
        return Ok(());
    }

    let started = Instant::now();
    info!(pending = pending.len(), "Applying categories migrations");
    Migrator::up(pool, None).await.map_err(|e| {
        error!(error = %e, elapsed = ?started.elapsed(), "Categories migration failed");
        ServiceError::DatabaseError(e)
    })?;
    info!(elapsed = ?started.elapsed(), "Categories schema migrated");
    Ok(())
}

/// Round-trips a ping to the store.
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    let started = Instant::now();
    match pool.ping().await {
        Ok(()) => {
            histogram!(
                "category_tree.db.ping_ms",
                started.elapsed().as_secs_f64() * 1000.0
            );
            Ok(())
        }
        Err(e) => {
            counter!("category_tree.db.ping_failures", 1);
            error!(error = %e, "Categories store ping failed");
            Err(ServiceError::DatabaseError(e))
        }
    }
}

pub async fn close_pool(pool: DbPool) -> Result<(), ServiceError> {
    debug!("Closing categories store");
    pool.close().await.map_err(ServiceError::DatabaseError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_in_memory_sqlite_urls() {
        assert!(DbConfig::for_url("sqlite::memory:").is_in_memory_sqlite());
        assert!(!DbConfig::for_url("sqlite://categories.db?mode=rwc").is_in_memory_sqlite());
        assert!(!DbConfig::for_url("postgres://localhost/catalog").is_in_memory_sqlite());
    }

    #[test]
    fn in_memory_pool_is_pinned_to_one_connection() {
        let mut config = DbConfig::for_url("sqlite::memory:");
        config.max_connections = 16;
        config.min_connections = 4;
        assert_eq!(config.pool_bounds(), (1, 1));

        let mut config = DbConfig::for_url("postgres://localhost/catalog");
        config.max_connections = 4;
        config.min_connections = 8;
        assert_eq!(config.pool_bounds(), (4, 4));
    }

    #[tokio::test]
    async fn connects_and_migrates_in_memory() {
        let pool = establish_connection("sqlite::memory:")
            .await
            .expect("connect");
        check_connection(&pool).await.expect("ping");
        run_migrations(&pool).await.expect("migrate");
        run_migrations(&pool).await.expect("second run is a no-op");
        assert!(Migrator::get_pending_migrations(&pool)
            .await
            .expect("status")
            .is_empty());
        close_pool(pool).await.expect("close");
    }
}
