use std::time::Duration;

use cairn_core::RepositoryCacheMode;
use cairn_sql::ProviderName;
use serde::{Deserialize, Serialize};

use crate::{CairnError, Result};

/// Where and how to reach the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// sqlx connection URL, `sqlite://...` or `postgres://...`.
    pub connection_string: String,

    /// Taken from the connection string scheme when not set.
    pub provider_name: Option<ProviderName>,

    pub max_connections: u32,

    /// How long lock requests without their own timeout wait.
    pub lock_timeout_ms: u64,

    /// Cache mode of scopes created through [`crate::Cairn::create_scope`].
    pub default_cache_mode: RepositoryCacheMode,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            connection_string: "sqlite://cairn.db?mode=rwc".to_owned(),
            provider_name: None,
            max_connections: 10,
            lock_timeout_ms: 20_000,
            default_cache_mode: RepositoryCacheMode::Unspecified,
        }
    }
}

impl DatabaseSettings {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Default::default()
        }
    }

    /// Reads `CAIRN_CONNECTION_STRING` (required), `CAIRN_PROVIDER_NAME`,
    /// `CAIRN_MAX_CONNECTIONS` and `CAIRN_LOCK_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let connection_string = lookup("CAIRN_CONNECTION_STRING")
            .ok_or_else(|| CairnError::Config("CAIRN_CONNECTION_STRING is not set".to_owned()))?;

        let mut settings = Self::new(connection_string);

        if let Some(name) = lookup("CAIRN_PROVIDER_NAME") {
            settings.provider_name = Some(name.parse()?);
        }
        if let Some(value) = lookup("CAIRN_MAX_CONNECTIONS") {
            settings.max_connections = parse("CAIRN_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = lookup("CAIRN_LOCK_TIMEOUT_MS") {
            settings.lock_timeout_ms = parse("CAIRN_LOCK_TIMEOUT_MS", &value)?;
        }

        Ok(settings)
    }

    pub fn provider(&self) -> Result<ProviderName> {
        match self.provider_name {
            Some(provider) => Ok(provider),
            None => Ok(ProviderName::from_connection_string(&self.connection_string)?),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err| CairnError::Config(format!("{name}: {err}")))
}
