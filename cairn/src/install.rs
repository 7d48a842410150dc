//! The install/upgrade API consumed by the host's startup sequence and its
//! installer endpoint.

use cairn_migrator::{InstallData, StepReport, StepResult};
use serde::Serialize;

use crate::{Cairn, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallSettings {
    pub provider_name: String,
    pub installed: bool,
    pub pending_migrations: Vec<String>,
    /// Install steps, in the order they run.
    pub steps: Vec<String>,
}

/// A failure as shown to the installer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemDetails {
    pub title: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallResult {
    pub success: bool,
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<ProblemDetails>,
}

impl InstallResult {
    fn from_report(title: &str, report: StepReport) -> Self {
        let problem = match report.success() {
            true => None,
            false => Some(ProblemDetails {
                title: title.to_owned(),
                detail: report
                    .error_message()
                    .unwrap_or("a step failed")
                    .to_owned(),
            }),
        };

        Self {
            success: problem.is_none(),
            steps: report.results,
            problem,
        }
    }

    fn problem(title: &str, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            steps: Vec::new(),
            problem: Some(ProblemDetails {
                title: title.to_owned(),
                detail: detail.into(),
            }),
        }
    }
}

/// Message of the innermost source of `err`.
fn deepest(err: &(dyn std::error::Error + 'static)) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }

    current.to_string()
}

impl Cairn {
    pub async fn get_install_settings(&self) -> Result<InstallSettings> {
        let ctx = cairn_core::ScopeContext::new();

        Ok(InstallSettings {
            provider_name: self.provider().to_string(),
            installed: self.is_installed().await?,
            pending_migrations: self
                .migrations()
                .pending(&ctx)
                .await?
                .into_iter()
                .map(str::to_owned)
                .collect(),
            steps: self.install_steps.names(),
        })
    }

    /// Runs the install steps against a database that is not installed yet.
    pub async fn install(&self, data: InstallData) -> InstallResult {
        const TITLE: &str = "Install failed";

        match self.is_installed().await {
            Ok(false) => {}
            Ok(true) => {
                return InstallResult::problem("Already installed", "the database is already installed")
            }
            Err(err) => return InstallResult::problem(TITLE, deepest(&err)),
        }

        let report = self.install_steps.run(&self.step_context(), &data).await;
        let result = InstallResult::from_report(TITLE, report);
        tracing::info!(success = result.success, "install finished");

        result
    }

    /// Runs the upgrade steps against an installed database.
    pub async fn upgrade(&self) -> InstallResult {
        const TITLE: &str = "Upgrade failed";

        match self.is_installed().await {
            Ok(true) => {}
            Ok(false) => {
                return InstallResult::problem("Not installed", "install the database before upgrading it")
            }
            Err(err) => return InstallResult::problem(TITLE, deepest(&err)),
        }

        let report = self.upgrade_steps.run(&self.step_context()).await;
        let result = InstallResult::from_report(TITLE, report);
        tracing::info!(success = result.success, "upgrade finished");

        result
    }
}
