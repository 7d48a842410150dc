//! Engine locks.
//!
//! Both mechanisms take the lock inside the caller's transaction, so the
//! engine releases it when the scope chain commits or rolls back.

mod postgres;
mod sqlite;

pub use postgres::PostgresDistributedLocking;
pub use sqlite::SqliteDistributedLocking;

pub(crate) use sqlite::{
    is_busy as is_sqlite_busy, DEFAULT_BUSY_TIMEOUT_MS as SQLITE_BUSY_TIMEOUT_MS,
};

use std::time::Duration;

use cairn_core::DatabaseError;

/// Engines read a zero timeout as "never wait" or "wait forever".
pub(crate) fn timeout_millis(timeout: Duration) -> u128 {
    timeout.as_millis().max(1)
}

pub(crate) fn has_code(err: &DatabaseError, codes: &[&str]) -> bool {
    err.code().is_some_and(|code| codes.contains(&code))
}
