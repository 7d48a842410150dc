//! SQLite and PostgreSQL engines for cairn.
//!
//! [`SqlDatabaseFactory`] opens sqlx transactions for [`cairn_core::ScopeProvider`].
//! Each [`ProviderName`] pairs a dialect rendering definitions through
//! sea-query with a distributed lock mechanism:
//!
//! | Provider | Dialect | Locks |
//! |----------|---------|-------|
//! | `sqlite` | [`SqliteDialect`] | row write on `cairn_lock`, bounded by `busy_timeout` |
//! | `postgres` | [`PostgresDialect`] | `pg_advisory_xact_lock`, bounded by `lock_timeout` |
//!
//! ```rust,ignore
//! use cairn_sql::{ProviderName, SqlDatabaseFactory};
//!
//! let factory = SqlDatabaseFactory::connect("sqlite://cairn.db?mode=rwc", ProviderName::Sqlite, 4).await?;
//! let provider = cairn_core::ScopeProvider::new(std::sync::Arc::new(factory));
//! provider.initialize().await?;
//! ```

mod database;
pub mod dialect;
pub mod lock;
mod provider;

pub use database::{SqlDatabase, SqlDatabaseFactory};
pub use dialect::{PostgresDialect, SqliteDialect};
pub use lock::{PostgresDistributedLocking, SqliteDistributedLocking};
pub use provider::{ProviderName, UnknownProvider};
