use std::{collections::HashSet, sync::Arc};

use crate::{MigrationContext, MigrationError};

/// One named, ordered unit of schema or data change.
///
/// The name is the versioning contract: once shipped it must never change,
/// it is what the ledger records.
#[async_trait::async_trait]
pub trait Migration: Send + Sync {
    fn name(&self) -> &'static str;

    async fn migrate(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct PlannedMigration {
    pub version: i64,
    pub migration: Arc<dyn Migration>,
}

impl PlannedMigration {
    pub fn name(&self) -> &'static str {
        self.migration.name()
    }
}

/// Migrations of one feature, in ascending version order.
#[derive(Clone)]
pub struct MigrationPlan {
    name: String,
    migrations: Vec<PlannedMigration>,
}

impl MigrationPlan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            migrations: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a migration. Versions must increase and names must be unique.
    pub fn add_migration(
        &mut self,
        version: i64,
        migration: Box<dyn Migration>,
    ) -> Result<(), MigrationError> {
        if let Some(last) = self.migrations.last() {
            if version <= last.version {
                return Err(MigrationError::InvalidPlan(format!(
                    "`{}` has version {version}, not above `{}` ({})",
                    migration.name(),
                    last.name(),
                    last.version
                )));
            }
        }

        if self.get(migration.name()).is_some() {
            return Err(MigrationError::InvalidPlan(format!(
                "`{}` is already part of plan `{}`",
                migration.name(),
                self.name
            )));
        }

        self.migrations.push(PlannedMigration {
            version,
            migration: Arc::from(migration),
        });

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&PlannedMigration> {
        self.migrations.iter().find(|m| m.name() == name)
    }

    pub fn migrations(&self) -> &[PlannedMigration] {
        &self.migrations
    }

    /// Migrations not in `applied`, in version order.
    pub fn pending<'p>(&'p self, applied: &'p HashSet<String>) -> impl Iterator<Item = &'p PlannedMigration> {
        self.migrations
            .iter()
            .filter(move |m| !applied.contains(m.name()))
    }
}

impl std::fmt::Debug for MigrationPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationPlan")
            .field("name", &self.name)
            .field(
                "migrations",
                &self
                    .migrations
                    .iter()
                    .map(|m| (m.version, m.name()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
