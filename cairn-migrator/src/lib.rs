//! Schema migrations and upgrade/install orchestration for cairn.
//!
//! A [`MigrationPlan`] is an ordered list of named [`Migration`]s. The
//! [`MigrationProvider`] applies it through cairn scopes and records every
//! applied migration in the `cairn_migration` ledger, so running a plan
//! twice is a no-op:
//!
//! ```rust,ignore
//! use cairn_core::ScopeContext;
//! use cairn_migrator::{core_plan, MigrationProvider};
//!
//! let migrations = MigrationProvider::new(scopes, core_plan()?);
//! let report = migrations.migrate_all(&ScopeContext::new()).await?;
//! ```
//!
//! `migrate_all` holds the write lock `cairn:migration-plan:{plan}` for the
//! whole run, so instances sharing a database apply a plan one at a time.
//!
//! # Core migrations
//!
//! | Version | [`CoreMigration`] | Change |
//! |---------|-------------------|--------|
//! | 1 | `initial-schema` | `cairn_key_value`, `cairn_property_type_group` |
//! | 2 | `add-property-type-group-alias` | `cairn_property_type_group.alias`, filled from `text` |
//!
//! # Steps
//!
//! [`UpgradeStepCollection`] and [`InstallStepCollection`] run steps in
//! order and return a [`StepReport`] instead of failing on the first error.

mod context;
mod error;
mod expression;
pub mod key_value;
mod ledger;
mod m0001;
mod m0002;
mod plan;
mod provider;
pub mod step;

pub use context::{DeleteData, MigrationContext};
pub use error::{MigrationError, Result};
pub use expression::Expression;
pub use ledger::LEDGER_TABLE;
pub use m0001::InitialSchema;
pub use m0002::{generate_group_aliases, to_safe_alias, AddPropertyTypeGroupAlias};
pub use plan::{Migration, MigrationPlan, PlannedMigration};
pub use provider::{MigrateOutcome, MigrationProvider, MigrationReport};
pub use step::{
    DatabaseInstallStep, DatabaseUpgradeStep, InstallData, InstallDataStep, InstallStep,
    InstallStepCollection, StepContext, StepOutcome, StepReport, StepResult, UpgradeStep,
    UpgradeStepCollection,
};

/// Name of the built-in plan.
pub const CORE_PLAN: &str = "core";

/// Stable names of the built-in migrations. Append only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreMigration {
    InitialSchema,
    AddPropertyTypeGroupAlias,
}

impl CoreMigration {
    pub const ALL: [CoreMigration; 2] = [
        CoreMigration::InitialSchema,
        CoreMigration::AddPropertyTypeGroupAlias,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            CoreMigration::InitialSchema => "initial-schema",
            CoreMigration::AddPropertyTypeGroupAlias => "add-property-type-group-alias",
        }
    }
}

impl AsRef<str> for CoreMigration {
    fn as_ref(&self) -> &str {
        self.name()
    }
}

impl std::fmt::Display for CoreMigration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The plan every installation runs.
pub fn core_plan() -> Result<MigrationPlan> {
    let mut plan = MigrationPlan::new(CORE_PLAN);
    plan.add_migration(1, Box::new(InitialSchema))?;
    plan.add_migration(2, Box::new(AddPropertyTypeGroupAlias))?;

    Ok(plan)
}
