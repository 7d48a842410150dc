use std::{fmt, str::FromStr, sync::Arc};

use cairn_core::{DistributedLockingMechanism, SqlDialect};
use serde::{Deserialize, Serialize};

use crate::{
    dialect::{PostgresDialect, SqliteDialect},
    lock::{PostgresDistributedLocking, SqliteDistributedLocking},
};

#[derive(Debug, thiserror::Error)]
#[error("unknown database provider `{0}`, expected sqlite or postgres")]
pub struct UnknownProvider(pub String);

/// The engines cairn can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProviderName {
    Sqlite,
    Postgres,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Sqlite => "sqlite",
            ProviderName::Postgres => "postgres",
        }
    }

    /// Guesses the provider from the URL scheme of a connection string.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, UnknownProvider> {
        let scheme = connection_string
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .unwrap_or(connection_string);

        scheme.parse()
    }

    pub fn dialect(&self) -> Arc<dyn SqlDialect> {
        match self {
            ProviderName::Sqlite => Arc::new(SqliteDialect),
            ProviderName::Postgres => Arc::new(PostgresDialect),
        }
    }

    pub fn locking(&self) -> Arc<dyn DistributedLockingMechanism> {
        match self {
            ProviderName::Sqlite => Arc::new(SqliteDistributedLocking),
            ProviderName::Postgres => Arc::new(PostgresDistributedLocking),
        }
    }
}

impl FromStr for ProviderName {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(ProviderName::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(ProviderName::Postgres),
            _ => Err(UnknownProvider(s.to_owned())),
        }
    }
}

impl TryFrom<String> for ProviderName {
    type Error = UnknownProvider;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProviderName> for String {
    fn from(value: ProviderName) -> Self {
        value.as_str().to_owned()
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
