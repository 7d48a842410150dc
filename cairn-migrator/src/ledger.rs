//! The applied-migrations ledger.

use std::collections::HashSet;

use cairn_core::{
    ColumnDefinition, ColumnType, ExistsCheck, InsertDefinition, Scope, ScopeError,
    SelectDefinition, SqlValue, TableDefinition,
};
use chrono::{SecondsFormat, Utc};

pub const LEDGER_TABLE: &str = "cairn_migration";

fn table() -> TableDefinition {
    TableDefinition::new(LEDGER_TABLE)
        .if_not_exists()
        .column(ColumnDefinition::new("plan", ColumnType::Text(Some(255))).primary_key())
        .column(ColumnDefinition::new("name", ColumnType::Text(Some(255))).primary_key())
        .column(ColumnDefinition::new("version", ColumnType::BigInteger))
        .column(ColumnDefinition::new("applied_at", ColumnType::Text(Some(64))))
}

pub(crate) async fn exists(scope: &Scope) -> Result<bool, ScopeError> {
    scope.exists(&ExistsCheck::table(LEDGER_TABLE)).await
}

pub(crate) async fn ensure(scope: &Scope) -> Result<(), ScopeError> {
    if exists(scope).await? {
        return Ok(());
    }

    tracing::debug!(table = LEDGER_TABLE, "creating migration ledger");
    let statements = scope.dialect().create_table(&table())?;
    scope.execute_all(&statements).await?;

    Ok(())
}

/// Names recorded for `plan`. Empty when the ledger does not exist yet.
pub(crate) async fn applied(scope: &Scope, plan: &str) -> Result<HashSet<String>, ScopeError> {
    if !exists(scope).await? {
        return Ok(HashSet::new());
    }

    let statement = scope.dialect().select(
        &SelectDefinition::new(LEDGER_TABLE)
            .columns(["name"])
            .filter("plan", plan),
    )?;

    scope
        .fetch_all(&statement)
        .await?
        .iter()
        .map(|row| row.try_string(0).map_err(ScopeError::from))
        .collect()
}

pub(crate) async fn record(
    scope: &Scope,
    plan: &str,
    name: &str,
    version: i64,
) -> Result<(), ScopeError> {
    let applied_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let statement = scope.dialect().insert(
        &InsertDefinition::new(LEDGER_TABLE, ["plan", "name", "version", "applied_at"])
            .values([
                SqlValue::from(plan),
                SqlValue::from(name),
                SqlValue::from(version),
                SqlValue::from(applied_at),
            ]),
    )?;
    scope.execute(&statement).await?;

    Ok(())
}
