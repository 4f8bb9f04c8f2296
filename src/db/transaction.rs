/*!
 * Scoped unit of work for tree mutations.
 *
 * Every create/move/delete/update/rebuild holds the tree write lock and a
 * single database transaction for its whole duration. Boundaries must be read
 * through `UnitOfWork::txn()` after `begin` returns, never before.
 */

use metrics::{counter, histogram};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, Statement,
    TransactionTrait,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, warn};

use crate::errors::ServiceError;

/// Key for `pg_advisory_xact_lock`, shared by every process writing the tree.
pub const TREE_ADVISORY_LOCK_KEY: i64 = 0x6361_7465_676f_7279;

/// Serialises tree-mutating operations within this process.
///
/// Clones share the same mutex. Acquisition gives up after `timeout` with a
/// `StorageError` so callers can retry the whole operation.
#[derive(Debug, Clone)]
pub struct TreeLock {
    inner: Arc<Mutex<()>>,
    timeout: Duration,
}

impl TreeLock {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(())),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn acquire(&self, operation: &str) -> Result<OwnedMutexGuard<()>, ServiceError> {
        match tokio::time::timeout(self.timeout, self.inner.clone().lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                counter!("category_tree.lock.timeout", 1, "operation" => operation.to_string());
                warn!(operation, timeout = ?self.timeout, "Timed out waiting for tree lock");
                Err(ServiceError::StorageError(format!(
                    "timed out after {:?} waiting for the category tree lock",
                    self.timeout
                )))
            }
        }
    }
}

/// A transaction plus the tree lock, released together.
///
/// Dropping a unit of work without calling [`UnitOfWork::commit`] rolls the
/// transaction back.
pub struct UnitOfWork {
    txn: DatabaseTransaction,
    _guard: OwnedMutexGuard<()>,
    operation: &'static str,
    started: Instant,
}

impl UnitOfWork {
    pub async fn begin(
        db: &DatabaseConnection,
        lock: &TreeLock,
        operation: &'static str,
    ) -> Result<Self, ServiceError> {
        let started = Instant::now();
        let guard = lock.acquire(operation).await?;
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        if txn.get_database_backend() == DbBackend::Postgres {
            let timeout_ms = lock.timeout().as_millis();
            txn.execute_unprepared(&format!("SET LOCAL lock_timeout = '{}ms'", timeout_ms))
                .await
                .map_err(ServiceError::DatabaseError)?;
            txn.execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "SELECT pg_advisory_xact_lock($1)",
                [TREE_ADVISORY_LOCK_KEY.into()],
            ))
            .await
            .map_err(|e| {
                counter!("category_tree.lock.timeout", 1, "operation" => operation.to_string());
                ServiceError::StorageError(format!("could not acquire tree advisory lock: {}", e))
            })?;
        }

        debug!(operation, "Unit of work started");
        Ok(Self {
            txn,
            _guard: guard,
            operation,
            started,
        })
    }

    pub fn txn(&self) -> &DatabaseTransaction {
        &self.txn
    }

    pub async fn commit(self) -> Result<(), ServiceError> {
        let operation = self.operation;
        let started = self.started;
        let result = self.txn.commit().await;
        histogram!(
            "category_tree.mutation.duration",
            started.elapsed(),
            "operation" => operation
        );
        match result {
            Ok(()) => {
                counter!("category_tree.mutation.committed", 1, "operation" => operation);
                debug!(operation, elapsed = ?started.elapsed(), "Unit of work committed");
                Ok(())
            }
            Err(e) => {
                counter!("category_tree.mutation.rolled_back", 1, "operation" => operation);
                error!(operation, error = %e, "Commit failed");
                Err(ServiceError::from_write(e))
            }
        }
    }

    pub async fn rollback(self) {
        let operation = self.operation;
        counter!("category_tree.mutation.rolled_back", 1, "operation" => operation);
        if let Err(e) = self.txn.rollback().await {
            error!(operation, error = %e, "Rollback failed");
        } else {
            debug!(operation, "Unit of work rolled back");
        }
    }

    /// Commits on `Ok`, rolls back on `Err`, and hands the result back.
    pub async fn finish<T>(self, result: Result<T, ServiceError>) -> Result<T, ServiceError> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                warn!(operation = self.operation, error = %err, "Tree mutation aborted");
                self.rollback().await;
                Err(err)
            }
        }
    }
}
