use cairn_core::ScopeOptions;

use super::{InstallData, InstallStep, StepContext, UpgradeStep};
use crate::key_value::{self, INSTALLED_KEY};

async fn has_pending(ctx: &StepContext) -> anyhow::Result<bool> {
    Ok(!ctx.migrations().pending(ctx.context()).await?.is_empty())
}

async fn migrate(ctx: &StepContext) -> anyhow::Result<()> {
    let report = ctx.migrations().migrate_all(ctx.context()).await?;
    tracing::info!(plan = %report.plan, applied = ?report.applied, "database migrated");

    Ok(())
}

/// Applies pending migrations of the provider's plan.
pub struct DatabaseUpgradeStep;

#[async_trait::async_trait]
impl UpgradeStep for DatabaseUpgradeStep {
    fn name(&self) -> &str {
        "database-upgrade"
    }

    fn required_for_continuation(&self) -> bool {
        true
    }

    async fn requires_execution(&self, ctx: &StepContext) -> anyhow::Result<bool> {
        has_pending(ctx).await
    }

    async fn execute(&self, ctx: &StepContext) -> anyhow::Result<()> {
        migrate(ctx).await
    }
}

/// Creates the schema of a fresh installation.
pub struct DatabaseInstallStep;

#[async_trait::async_trait]
impl InstallStep for DatabaseInstallStep {
    fn name(&self) -> &str {
        "database-install"
    }

    fn required_for_continuation(&self) -> bool {
        true
    }

    async fn requires_execution(&self, ctx: &StepContext, _data: &InstallData) -> anyhow::Result<bool> {
        has_pending(ctx).await
    }

    async fn execute(&self, ctx: &StepContext, _data: &InstallData) -> anyhow::Result<()> {
        migrate(ctx).await
    }
}

/// Stores the installer's values and marks the installation complete.
pub struct InstallDataStep;

#[async_trait::async_trait]
impl InstallStep for InstallDataStep {
    fn name(&self) -> &str {
        "install-data"
    }

    fn required_for_continuation(&self) -> bool {
        true
    }

    async fn requires_execution(&self, ctx: &StepContext, _data: &InstallData) -> anyhow::Result<bool> {
        let mut scope = ctx.scopes().create_scope(ctx.context(), ScopeOptions::default())?;
        let installed = key_value::is_installed(&scope).await;
        scope.complete();
        scope.dispose().await?;

        Ok(!installed?)
    }

    async fn execute(&self, ctx: &StepContext, data: &InstallData) -> anyhow::Result<()> {
        let mut scope = ctx.scopes().create_scope(ctx.context(), ScopeOptions::default())?;

        let written = async {
            for (key, value) in &data.values {
                key_value::set(&scope, key, Some(value.as_str())).await?;
            }

            let installed_at = chrono::Utc::now().to_rfc3339();
            key_value::set(&scope, INSTALLED_KEY, Some(installed_at.as_str())).await
        }
        .await;

        if written.is_ok() {
            scope.complete();
        }
        scope.dispose().await?;

        Ok(written?)
    }
}
