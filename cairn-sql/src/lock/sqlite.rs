use cairn_core::{
    Database, DatabaseError, DistributedLockingMechanism, ExistsCheck, LockRequest, LockType,
    ScopeError, SqlDialect, Statement,
};
use tracing::debug;

use super::{has_code, timeout_millis};
use crate::dialect::SqliteDialect;

pub(crate) const LOCK_TABLE: &str = "cairn_lock";

/// Busy timeout sqlx configures on every SQLite connection.
pub(crate) const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

// SQLITE_BUSY, SQLITE_LOCKED, SQLITE_BUSY_SNAPSHOT, SQLITE_LOCKED_SHAREDCACHE
const BUSY_CODES: &[&str] = &["5", "6", "517", "262"];

/// SQLite has a single writer per database file. A write lock is taken by
/// touching the lock's row, which makes the transaction the writer until it
/// ends. A read lock only reads the row.
///
/// The wait is bounded by temporarily setting `busy_timeout` to the
/// request's timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDistributedLocking;

/// Whether SQLite gave up waiting for another connection.
pub(crate) fn is_busy(err: &DatabaseError) -> bool {
    has_code(err, BUSY_CODES)
        || matches!(err, DatabaseError::Statement { message, .. } if message.contains("database is locked"))
}

impl SqliteDistributedLocking {
    async fn take(&self, db: &mut dyn Database, request: &LockRequest) -> Result<(), DatabaseError> {
        match request.lock_type {
            LockType::Write => {
                db.execute(
                    &Statement::new(format!(
                        "INSERT INTO {LOCK_TABLE} (id, value) VALUES (?, 1) \
                         ON CONFLICT (id) DO UPDATE SET value = -{LOCK_TABLE}.value"
                    ))
                    .bind(request.name.as_str()),
                )
                .await?;
            }
            LockType::Read => {
                db.fetch_all(
                    &Statement::new(format!("SELECT value FROM {LOCK_TABLE} WHERE id = ?"))
                        .bind(request.name.as_str()),
                )
                .await?;
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl DistributedLockingMechanism for SqliteDistributedLocking {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn initialize(&self, db: &mut dyn Database) -> Result<(), ScopeError> {
        let check = SqliteDialect.exists(&ExistsCheck::table(LOCK_TABLE))?;
        let found = match db.fetch_all(&check).await?.first() {
            Some(row) => row.try_i64(0)?,
            None => 0,
        };
        if found > 0 {
            return Ok(());
        }

        debug!(table = LOCK_TABLE, "creating lock table");
        db.execute(&Statement::new(format!(
            "CREATE TABLE IF NOT EXISTS {LOCK_TABLE} (id TEXT NOT NULL PRIMARY KEY, value INTEGER NOT NULL)"
        )))
        .await?;

        Ok(())
    }

    async fn acquire(&self, db: &mut dyn Database, request: &LockRequest) -> Result<(), ScopeError> {
        db.execute(&Statement::new(format!(
            "PRAGMA busy_timeout = {}",
            timeout_millis(request.timeout)
        )))
        .await?;

        let taken = self.take(db, request).await;

        db.execute(&Statement::new(format!(
            "PRAGMA busy_timeout = {DEFAULT_BUSY_TIMEOUT_MS}"
        )))
        .await?;

        match taken {
            Ok(()) => Ok(()),
            Err(err) if is_busy(&err) => {
                debug!(lock = %request.name, error = %err, "sqlite lock timed out");
                Err(request.timed_out())
            }
            Err(err) => Err(err.into()),
        }
    }
}
