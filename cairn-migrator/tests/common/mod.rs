#![allow(dead_code)]

use std::sync::Arc;

use cairn_core::{ScopeContext, ScopeOptions, ScopeProvider, SqlValue, Statement};
use cairn_sql::{ProviderName, SqlDatabaseFactory};
use tempfile::TempDir;

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

pub async fn table_exists(provider: &ScopeProvider, table: &str) -> anyhow::Result<bool> {
    let ctx = ScopeContext::new();
    let mut scope = provider.create_scope(&ctx, ScopeOptions::default())?;
    let exists = scope
        .exists(&cairn_core::ExistsCheck::table(table))
        .await?;
    scope.dispose().await?;

    Ok(exists)
}

/// Runs `sql` in its own committed scope.
pub async fn execute(provider: &ScopeProvider, sql: &str, params: Vec<SqlValue>) -> anyhow::Result<()> {
    let ctx = ScopeContext::new();
    let mut scope = provider.create_scope(&ctx, ScopeOptions::default())?;
    scope.execute(&Statement::with_params(sql, params)).await?;
    scope.complete();
    scope.dispose().await?;

    Ok(())
}

pub async fn strings(provider: &ScopeProvider, sql: &str) -> anyhow::Result<Vec<Option<String>>> {
    let ctx = ScopeContext::new();
    let mut scope = provider.create_scope(&ctx, ScopeOptions::default())?;
    let rows = scope.fetch_all(&Statement::new(sql)).await?;
    scope.dispose().await?;

    rows.iter()
        .map(|row| row.try_opt_string(0).map_err(Into::into))
        .collect()
}
