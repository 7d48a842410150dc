use super::{failed, InstallData, StepContext, StepOutcome, StepReport};

/// One install step. Sees the data the installer submitted.
#[async_trait::async_trait]
pub trait InstallStep: Send + Sync {
    fn name(&self) -> &str;

    fn required_for_continuation(&self) -> bool {
        false
    }

    async fn requires_execution(&self, ctx: &StepContext, data: &InstallData) -> anyhow::Result<bool>;

    async fn execute(&self, ctx: &StepContext, data: &InstallData) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct InstallStepCollection {
    steps: Vec<Box<dyn InstallStep>>,
}

impl InstallStepCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, step: impl InstallStep + 'static) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name().to_owned()).collect()
    }

    pub async fn run(&self, ctx: &StepContext, data: &InstallData) -> StepReport {
        let mut report = StepReport::default();

        for step in &self.steps {
            let name = step.name();
            let outcome = match step.requires_execution(ctx, data).await {
                Ok(false) => StepOutcome::Skipped,
                Ok(true) => match step.execute(ctx, data).await {
                    Ok(()) => StepOutcome::Succeeded,
                    Err(err) => failed(name, err),
                },
                Err(err) => failed(name, err),
            };

            tracing::debug!(step = name, ?outcome, "install step done");
            if report.push(name, outcome, step.required_for_continuation()) {
                break;
            }
        }

        report
    }
}
