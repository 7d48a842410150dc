#![allow(dead_code)]

use std::sync::Arc;

use cairn_core::ScopeProvider;
use cairn_sql::{ProviderName, SqlDatabaseFactory};
use tempfile::TempDir;

/// A scope provider over a fresh SQLite file. Keep the directory alive for
/// as long as the provider is used.
pub async fn sqlite() -> anyhow::Result<(ScopeProvider, TempDir)> {
    let dir = tempfile::tempdir()?;
    let url = format!(
        "sqlite://{}/cairn-{}.db?mode=rwc",
        dir.path().display(),
        uuid::Uuid::new_v4()
    );

    let factory = SqlDatabaseFactory::connect(&url, ProviderName::Sqlite, 4).await?;
    let provider = ScopeProvider::new(Arc::new(factory));
    provider.initialize().await?;

    Ok((provider, dir))
}

/// Only available when `CAIRN_TEST_POSTGRES_URL` points at a database.
pub async fn postgres() -> anyhow::Result<Option<ScopeProvider>> {
    let Ok(url) = std::env::var("CAIRN_TEST_POSTGRES_URL") else {
        return Ok(None);
    };

    let factory = SqlDatabaseFactory::connect(&url, ProviderName::Postgres, 4).await?;
    let provider = ScopeProvider::new(Arc::new(factory));
    provider.initialize().await?;

    Ok(Some(provider))
}
