//! Upgrade and install orchestration.
//!
//! A step is asked whether it has anything to do against live state right
//! before it runs. Failures are captured per step and aggregated into a
//! [`StepReport`]; only a failing step marked required for continuation stops
//! the run.

mod builtin;
mod install;
mod upgrade;

pub use builtin::{DatabaseInstallStep, DatabaseUpgradeStep, InstallDataStep};
pub use install::{InstallStep, InstallStepCollection};
pub use upgrade::{UpgradeStep, UpgradeStepCollection};

use std::collections::BTreeMap;

use cairn_core::{ScopeContext, ScopeProvider};
use serde::{Deserialize, Serialize};

use crate::MigrationProvider;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum StepOutcome {
    Skipped,
    Succeeded,
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub results: Vec<StepResult>,
    /// The required step whose failure stopped the run.
    pub halted_at: Option<String>,
}

impl StepReport {
    pub fn success(&self) -> bool {
        !self.results.iter().any(|r| r.outcome.is_failed())
    }

    pub fn outcome(&self, name: &str) -> Option<&StepOutcome> {
        self.results
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.results.iter().filter(|r| r.outcome.is_failed())
    }

    /// Message of the last failure.
    pub fn error_message(&self) -> Option<&str> {
        self.results.iter().rev().find_map(|r| match &r.outcome {
            StepOutcome::Failed(message) => Some(message.as_str()),
            _ => None,
        })
    }

    fn push(&mut self, name: &str, outcome: StepOutcome, required: bool) -> bool {
        let halt = required && outcome.is_failed();
        self.results.push(StepResult {
            name: name.to_owned(),
            outcome,
        });

        if halt {
            tracing::warn!(step = name, "required step failed, stopping");
            self.halted_at = Some(name.to_owned());
        }

        halt
    }
}

/// Captures a step error, keeping its root cause as the message.
fn failed(step: &str, err: anyhow::Error) -> StepOutcome {
    tracing::error!(step, error = ?err, "step failed");
    StepOutcome::Failed(err.root_cause().to_string())
}

/// What steps run against.
#[derive(Clone)]
pub struct StepContext {
    scopes: ScopeProvider,
    context: ScopeContext,
    migrations: MigrationProvider,
}

impl StepContext {
    pub fn new(scopes: ScopeProvider, context: ScopeContext, migrations: MigrationProvider) -> Self {
        Self {
            scopes,
            context,
            migrations,
        }
    }

    pub fn scopes(&self) -> &ScopeProvider {
        &self.scopes
    }

    /// The caller's context. Steps create their scopes on it.
    pub fn context(&self) -> &ScopeContext {
        &self.context
    }

    pub fn migrations(&self) -> &MigrationProvider {
        &self.migrations
    }
}

/// Installer supplied settings, persisted as key values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallData {
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl InstallData {
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}
