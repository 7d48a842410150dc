//! Installation wide settings in `cairn_key_value`.

use cairn_core::{
    lock_names, DeleteDefinition, ExistsCheck, InsertDefinition, LockType, Scope, ScopeError,
    SelectDefinition, SqlValue,
};
use chrono::{SecondsFormat, Utc};

pub const KEY_VALUE_TABLE: &str = "cairn_key_value";

/// Set once the installer has run to completion.
pub const INSTALLED_KEY: &str = "cairn:installed";

pub async fn get(scope: &Scope, key: &str) -> Result<Option<String>, ScopeError> {
    scope
        .acquire_lock(lock_names::KEY_VALUES, LockType::Read, None)
        .await?;

    let statement = scope.dialect().select(
        &SelectDefinition::new(KEY_VALUE_TABLE)
            .columns(["value"])
            .filter("key", key),
    )?;

    match scope.fetch_all(&statement).await?.first() {
        Some(row) => Ok(row.try_opt_string(0)?),
        None => Ok(None),
    }
}

/// Inserts or replaces `key`.
pub async fn set(scope: &Scope, key: &str, value: Option<&str>) -> Result<(), ScopeError> {
    scope
        .acquire_lock(lock_names::KEY_VALUES, LockType::Write, None)
        .await?;

    let dialect = scope.dialect();
    let updated = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    scope
        .execute(&dialect.delete(&DeleteDefinition::new(KEY_VALUE_TABLE).row([("key", key)]))?)
        .await?;
    scope
        .execute(&dialect.insert(
            &InsertDefinition::new(KEY_VALUE_TABLE, ["key", "value", "updated"]).values([
                SqlValue::from(key),
                SqlValue::from(value),
                SqlValue::from(updated),
            ]),
        )?)
        .await?;

    tracing::debug!(key, "key value set");

    Ok(())
}

pub async fn is_installed(scope: &Scope) -> Result<bool, ScopeError> {
    if !scope.exists(&ExistsCheck::table(KEY_VALUE_TABLE)).await? {
        return Ok(false);
    }

    Ok(get(scope, INSTALLED_KEY).await?.is_some())
}
