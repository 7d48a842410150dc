use std::{sync::Arc, time::Duration};

use cairn_core::{lock_names, LockType, Scope, ScopeContext, ScopeOptions, ScopeProvider};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{ledger, MigrationContext, MigrationError, MigrationPlan, PlannedMigration, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateOutcome {
    Applied,
    AlreadyApplied,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub plan: String,
    /// Applied by this run, in order.
    pub applied: Vec<String>,
    /// Found in the ledger and left alone.
    pub already_applied: usize,
}

/// Runs a [`MigrationPlan`] through scopes of a [`ScopeProvider`].
#[derive(Clone)]
pub struct MigrationProvider {
    scopes: ScopeProvider,
    plan: Arc<MigrationPlan>,
    lock_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl MigrationProvider {
    pub fn new(scopes: ScopeProvider, plan: MigrationPlan) -> Self {
        Self {
            scopes,
            plan: Arc::new(plan),
            lock_timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// How long `migrate_all` waits for the plan lock. Defaults to the
    /// provider's lock timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn plan(&self) -> &MigrationPlan {
        &self.plan
    }

    pub fn scopes(&self) -> &ScopeProvider {
        &self.scopes
    }

    /// Names of the migrations the ledger does not list yet, in version order.
    pub async fn pending(&self, ctx: &ScopeContext) -> Result<Vec<&'static str>> {
        let mut scope = self.scopes.create_scope(ctx, ScopeOptions::default())?;
        let applied = match ledger::applied(&scope, self.plan.name()).await {
            Ok(applied) => applied,
            Err(err) => {
                scope.dispose().await?;
                return Err(err.into());
            }
        };

        scope.complete();
        scope.dispose().await?;

        Ok(self.plan.pending(&applied).map(|m| m.name()).collect())
    }

    /// Runs one migration by name in one scope, joining the ambient scope of
    /// `ctx` if there is one.
    pub async fn migrate(&self, ctx: &ScopeContext, name: impl AsRef<str>) -> Result<MigrateOutcome> {
        let name = name.as_ref();
        let planned = self
            .plan
            .get(name)
            .cloned()
            .ok_or_else(|| MigrationError::Unknown(name.to_owned()))?;

        self.check_cancelled()?;

        let mut scope = self.scopes.create_scope(ctx, ScopeOptions::default())?;
        let outcome = self.migrate_in(&scope, &planned).await;

        match outcome {
            Ok(outcome) => {
                scope.complete();
                scope.dispose().await?;
                Ok(outcome)
            }
            Err(err) => {
                scope.dispose().await?;
                Err(err)
            }
        }
    }

    async fn migrate_in(&self, scope: &Scope, planned: &PlannedMigration) -> Result<MigrateOutcome> {
        ledger::ensure(scope).await?;
        if ledger::applied(scope, self.plan.name())
            .await?
            .contains(planned.name())
        {
            debug!(plan = self.plan.name(), migration = planned.name(), "already applied");
            return Ok(MigrateOutcome::AlreadyApplied);
        }

        self.apply(scope, planned).await?;

        Ok(MigrateOutcome::Applied)
    }

    /// Applies every pending migration in version order, in one scope holding
    /// the plan's write lock.
    ///
    /// Refuses to run inside an ambient scope. On failure the whole run is
    /// rolled back, including migrations that succeeded before.
    pub async fn migrate_all(&self, ctx: &ScopeContext) -> Result<MigrationReport> {
        if ctx.has_ambient_scope() {
            return Err(MigrationError::AmbientScope);
        }

        self.check_cancelled()?;

        let mut scope = self.scopes.create_scope(ctx, ScopeOptions::default())?;
        match self.migrate_all_in(&scope).await {
            Ok(report) => {
                scope.complete();
                scope.dispose().await?;

                info!(
                    plan = %report.plan,
                    applied = report.applied.len(),
                    already_applied = report.already_applied,
                    "migration plan complete"
                );
                Ok(report)
            }
            Err(err) => {
                scope.dispose().await?;
                error!(plan = self.plan.name(), error = %err, "migration plan rolled back");
                Err(err)
            }
        }
    }

    async fn migrate_all_in(&self, scope: &Scope) -> Result<MigrationReport> {
        scope
            .acquire_lock(
                lock_names::migration_plan(self.plan.name()),
                LockType::Write,
                self.lock_timeout,
            )
            .await?;

        ledger::ensure(scope).await?;
        let applied = ledger::applied(scope, self.plan.name()).await?;

        let mut report = MigrationReport {
            plan: self.plan.name().to_owned(),
            applied: Vec::new(),
            already_applied: self
                .plan
                .migrations()
                .iter()
                .filter(|m| applied.contains(m.name()))
                .count(),
        };

        for planned in self.plan.pending(&applied) {
            self.check_cancelled()?;
            self.apply(scope, planned).await?;
            report.applied.push(planned.name().to_owned());
        }

        Ok(report)
    }

    async fn apply(&self, scope: &Scope, planned: &PlannedMigration) -> Result<()> {
        let name = planned.name();
        debug!(plan = self.plan.name(), migration = name, version = planned.version, "applying");

        let ctx = MigrationContext::new(scope, name);
        planned
            .migration
            .migrate(&ctx)
            .await
            .map_err(|err| MigrationError::failed(name, err))?;

        ledger::record(scope, self.plan.name(), name, planned.version)
            .await
            .map_err(|err| MigrationError::failed(name, err.into()))?;
        info!(plan = self.plan.name(), migration = name, "migration applied");

        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }

        Ok(())
    }
}
