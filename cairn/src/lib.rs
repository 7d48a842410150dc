//! Scoped units of work, distributed locks and schema migrations over
//! SQLite and PostgreSQL.
//!
//! [`Cairn`] wires the pieces together from [`DatabaseSettings`]:
//!
//! ```rust,ignore
//! use cairn::{Cairn, DatabaseSettings, RuntimeLevel};
//!
//! let cairn = Cairn::connect(DatabaseSettings::from_env()?).await?;
//! match cairn.boot().await? {
//!     RuntimeLevel::Install => { /* serve the installer */ }
//!     RuntimeLevel::Upgrade => { cairn.upgrade().await; }
//!     RuntimeLevel::Run => {}
//! }
//! ```
//!
//! The building blocks are re-exported: [`cairn_core`] (scopes, cache,
//! locks), [`cairn_sql`] (engines) and [`cairn_migrator`] (plans and steps).

mod error;
mod install;
mod settings;

pub use cairn_core;
pub use cairn_migrator;
pub use cairn_sql;

pub use error::{CairnError, Result};
pub use install::{InstallResult, InstallSettings, ProblemDetails};
pub use settings::DatabaseSettings;

use std::sync::Arc;

use cairn_core::{
    Scope, ScopeContext, ScopeError, ScopeOptions, ScopeProvider, ScopeProviderOptions,
};
use cairn_migrator::{
    core_plan, key_value, DatabaseInstallStep, DatabaseUpgradeStep, InstallDataStep, InstallStep,
    InstallStepCollection, MigrationProvider, StepContext, UpgradeStep, UpgradeStepCollection,
};
use cairn_sql::{ProviderName, SqlDatabaseFactory};

/// What the application should do after [`Cairn::boot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeLevel {
    /// Nothing installed yet.
    Install,
    /// Installed, with migrations pending.
    Upgrade,
    Run,
}

pub struct Cairn {
    settings: DatabaseSettings,
    provider: ProviderName,
    scopes: ScopeProvider,
    migrations: MigrationProvider,
    install_steps: InstallStepCollection,
    upgrade_steps: UpgradeStepCollection,
}

impl Cairn {
    /// Opens the pool, prepares distributed locking and the core migration
    /// plan. Leaves the rest of the schema to installation.
    pub async fn connect(settings: DatabaseSettings) -> Result<Self> {
        let provider = settings.provider()?;
        let factory = SqlDatabaseFactory::connect(
            &settings.connection_string,
            provider,
            settings.max_connections,
        )
        .await?;

        let scopes = ScopeProvider::with_options(
            Arc::new(factory),
            ScopeProviderOptions {
                default_lock_timeout: settings.lock_timeout(),
            },
        );
        scopes.initialize().await?;
        let migrations = MigrationProvider::new(scopes.clone(), core_plan()?);

        let mut install_steps = InstallStepCollection::new();
        install_steps.add(DatabaseInstallStep).add(InstallDataStep);

        let mut upgrade_steps = UpgradeStepCollection::new();
        upgrade_steps.add(DatabaseUpgradeStep);

        tracing::info!(%provider, "cairn connected");

        Ok(Self {
            settings,
            provider,
            scopes,
            migrations,
            install_steps,
            upgrade_steps,
        })
    }

    /// Reports the runtime level.
    pub async fn boot(&self) -> Result<RuntimeLevel> {
        let level = if !self.is_installed().await? {
            RuntimeLevel::Install
        } else if self.migrations.pending(&ScopeContext::new()).await?.is_empty() {
            RuntimeLevel::Run
        } else {
            RuntimeLevel::Upgrade
        };

        tracing::info!(?level, "cairn booted");
        Ok(level)
    }

    pub fn add_install_step(&mut self, step: impl InstallStep + 'static) -> &mut Self {
        self.install_steps.add(step);
        self
    }

    pub fn add_upgrade_step(&mut self, step: impl UpgradeStep + 'static) -> &mut Self {
        self.upgrade_steps.add(step);
        self
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    pub fn provider(&self) -> ProviderName {
        self.provider
    }

    pub fn scopes(&self) -> &ScopeProvider {
        &self.scopes
    }

    pub fn migrations(&self) -> &MigrationProvider {
        &self.migrations
    }

    /// Creates a scope using the configured cache mode.
    pub fn create_scope(&self, ctx: &ScopeContext) -> std::result::Result<Scope, ScopeError> {
        self.scopes.create_scope(
            ctx,
            ScopeOptions::default().with_cache_mode(self.settings.default_cache_mode),
        )
    }

    pub async fn is_installed(&self) -> Result<bool> {
        let mut scope = self
            .scopes
            .create_scope(&ScopeContext::new(), ScopeOptions::default())?;
        let installed = key_value::is_installed(&scope).await;
        scope.complete();
        scope.dispose().await?;

        Ok(installed?)
    }

    fn step_context(&self) -> StepContext {
        StepContext::new(
            self.scopes.clone(),
            ScopeContext::new(),
            self.migrations.clone(),
        )
    }
}
