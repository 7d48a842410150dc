use std::{borrow::Cow, sync::Arc};

use cairn_core::{
    BeginOptions, Database, DatabaseError, DatabaseFactory, DistributedLockingMechanism,
    IsolationLevel, Row, SqlDialect, SqlValue, Statement,
};
use sqlx::{
    any::{AnyArguments, AnyPoolOptions, AnyRow},
    query::Query,
    Any, AnyPool, Row as _, Transaction,
};
use tracing::{debug, trace};

use crate::{
    lock::{is_sqlite_busy, timeout_millis, SQLITE_BUSY_TIMEOUT_MS},
    ProviderName,
};

/// Opens transactions on a pooled sqlx connection.
#[derive(Clone)]
pub struct SqlDatabaseFactory {
    pool: AnyPool,
    provider: ProviderName,
}

impl SqlDatabaseFactory {
    pub async fn connect(
        connection_string: &str,
        provider: ProviderName,
        max_connections: u32,
    ) -> Result<Self, DatabaseError> {
        sqlx::any::install_default_drivers();

        debug!(%provider, max_connections, "connecting");
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await
            .map_err(map_err)?;

        Ok(Self::from_pool(pool, provider))
    }

    pub fn from_pool(pool: AnyPool, provider: ProviderName) -> Self {
        Self { pool, provider }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn provider(&self) -> ProviderName {
        self.provider
    }

    /// SQLite transactions take the write lock at `BEGIN`: a deferred
    /// transaction that has already read can never become the writer once
    /// another connection committed. Waiting for `BEGIN IMMEDIATE` is bounded
    /// by `busy_timeout`, restored once the transaction is open.
    async fn begin_sqlite(
        &self,
        options: BeginOptions,
    ) -> Result<Transaction<'static, Any>, DatabaseError> {
        let mut conn = self.pool.acquire().await.map_err(map_err)?;
        let busy_timeout = format!("PRAGMA busy_timeout = {}", timeout_millis(options.wait));
        sqlx::query(&busy_timeout)
            .execute(&mut *conn)
            .await
            .map_err(map_err)?;

        let statement = sqlite_begin_statement(options.isolation_level);
        let mut tx: Transaction<'static, Any> =
            match Transaction::begin(conn, Some(Cow::Borrowed(statement))).await {
                Ok(tx) => tx,
                Err(err) => {
                    let err = map_err(err);
                    if is_sqlite_busy(&err) {
                        debug!(wait = ?options.wait, error = %err, "sqlite writer busy");
                        return Err(DatabaseError::Busy(options.wait));
                    }
                    return Err(err);
                }
            };

        let restore = format!("PRAGMA busy_timeout = {SQLITE_BUSY_TIMEOUT_MS}");
        sqlx::query(&restore)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

        Ok(tx)
    }
}

fn sqlite_begin_statement(level: IsolationLevel) -> &'static str {
    match level {
        IsolationLevel::ReadUncommitted => "BEGIN DEFERRED",
        _ => "BEGIN IMMEDIATE",
    }
}

fn postgres_begin_statement(level: IsolationLevel) -> Cow<'static, str> {
    match level.as_sql() {
        Some(level) => Cow::Owned(format!("BEGIN ISOLATION LEVEL {level}")),
        None => Cow::Borrowed("BEGIN"),
    }
}

#[async_trait::async_trait]
impl DatabaseFactory for SqlDatabaseFactory {
    fn provider_name(&self) -> &'static str {
        self.provider.as_str()
    }

    fn dialect(&self) -> Arc<dyn SqlDialect> {
        self.provider.dialect()
    }

    fn locking(&self) -> Arc<dyn DistributedLockingMechanism> {
        self.provider.locking()
    }

    /// SQLite only runs serializable transactions.
    fn default_isolation_level(&self) -> IsolationLevel {
        match self.provider {
            ProviderName::Sqlite => IsolationLevel::Serializable,
            ProviderName::Postgres => IsolationLevel::ReadCommitted,
        }
    }

    async fn begin(&self, options: BeginOptions) -> Result<Box<dyn Database>, DatabaseError> {
        let tx = match self.provider {
            ProviderName::Sqlite => self.begin_sqlite(options).await?,
            ProviderName::Postgres => self
                .pool
                .begin_with(postgres_begin_statement(options.isolation_level))
                .await
                .map_err(map_err)?,
        };
        Ok(Box::new(SqlDatabase { tx }))
    }
}

/// A sqlx transaction. Dropping it rolls back.
pub struct SqlDatabase {
    tx: Transaction<'static, Any>,
}

fn query(statement: &Statement) -> Query<'_, Any, AnyArguments<'_>> {
    statement
        .params
        .iter()
        .fold(sqlx::query(&statement.sql), |query, param| match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Bytes(v) => query.bind(v.clone()),
        })
}

fn decode(row: &AnyRow) -> Result<Row, DatabaseError> {
    (0..row.columns().len())
        .map(|index| decode_value(row, index))
        .collect::<Result<Vec<_>, _>>()
        .map(Row::new)
}

fn decode_value(row: &AnyRow, index: usize) -> Result<SqlValue, DatabaseError> {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return Ok(v.into());
    }

    row.try_get::<Option<Vec<u8>>, _>(index)
        .map(SqlValue::from)
        .map_err(|err| DatabaseError::Decode(format!("column {index}: {err}")))
}

pub(crate) fn map_err(err: sqlx::Error) -> DatabaseError {
    match err {
        sqlx::Error::Database(err) => DatabaseError::Statement {
            code: err.code().map(|code| code.into_owned()),
            message: err.message().to_owned(),
        },
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Configuration(_) => DatabaseError::Connection(err.to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            DatabaseError::Decode(err.to_string())
        }
        other => DatabaseError::Statement {
            code: None,
            message: other.to_string(),
        },
    }
}

#[async_trait::async_trait]
impl Database for SqlDatabase {
    async fn execute(&mut self, statement: &Statement) -> Result<u64, DatabaseError> {
        trace!(sql = %statement.sql, params = statement.params.len(), "execute");
        let result = query(statement)
            .execute(&mut *self.tx)
            .await
            .map_err(map_err)?;

        Ok(result.rows_affected())
    }

    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<Row>, DatabaseError> {
        trace!(sql = %statement.sql, params = statement.params.len(), "fetch_all");
        let rows = query(statement)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_err)?;

        rows.iter().map(decode).collect()
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx.commit().await.map_err(map_err)
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx.rollback().await.map_err(map_err)
    }
}
