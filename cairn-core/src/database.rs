use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{DatabaseError, DistributedLockingMechanism, Row, SqlDialect, Statement};

/// Transaction isolation, weakest first.
///
/// `Unspecified` lets a scope inherit its parent's level, or the engine's
/// default for an outermost scope.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    #[default]
    Unspecified,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// The SQL spelling, `None` for `Unspecified`.
    pub fn as_sql(self) -> Option<&'static str> {
        match self {
            IsolationLevel::Unspecified => None,
            IsolationLevel::ReadUncommitted => Some("READ UNCOMMITTED"),
            IsolationLevel::ReadCommitted => Some("READ COMMITTED"),
            IsolationLevel::RepeatableRead => Some("REPEATABLE READ"),
            IsolationLevel::Serializable => Some("SERIALIZABLE"),
        }
    }
}

/// How a transaction is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginOptions {
    pub isolation_level: IsolationLevel,
    /// How long the engine may keep the caller waiting before the
    /// transaction is admitted. Engines that never wait ignore it.
    pub wait: Duration,
}

/// One open transaction on one connection.
///
/// Dropping a database without calling [`Database::commit`] must roll the
/// transaction back.
#[async_trait::async_trait]
pub trait Database: Send {
    /// Runs a statement and returns the number of affected rows.
    async fn execute(&mut self, statement: &Statement) -> Result<u64, DatabaseError>;

    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<Row>, DatabaseError>;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}

/// Opens transactions and exposes the engine facts that go with them.
#[async_trait::async_trait]
pub trait DatabaseFactory: Send + Sync {
    fn provider_name(&self) -> &'static str;

    fn dialect(&self) -> Arc<dyn SqlDialect>;

    fn locking(&self) -> Arc<dyn DistributedLockingMechanism>;

    /// Level used by outermost scopes that do not ask for one.
    fn default_isolation_level(&self) -> IsolationLevel {
        IsolationLevel::ReadCommitted
    }

    /// Checks out a connection and begins a transaction on it.
    ///
    /// Fails with [`DatabaseError::Busy`] when the engine did not admit the
    /// transaction within `options.wait`.
    async fn begin(&self, options: BeginOptions) -> Result<Box<dyn Database>, DatabaseError>;
}
