use super::{failed, StepContext, StepOutcome, StepReport};

/// One upgrade step.
#[async_trait::async_trait]
pub trait UpgradeStep: Send + Sync {
    fn name(&self) -> &str;

    /// A failure of this step stops the remaining ones.
    fn required_for_continuation(&self) -> bool {
        false
    }

    /// Checked against live state immediately before [`UpgradeStep::execute`].
    async fn requires_execution(&self, ctx: &StepContext) -> anyhow::Result<bool>;

    async fn execute(&self, ctx: &StepContext) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct UpgradeStepCollection {
    steps: Vec<Box<dyn UpgradeStep>>,
}

impl UpgradeStepCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, step: impl UpgradeStep + 'static) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs the steps in declared order.
    pub async fn run(&self, ctx: &StepContext) -> StepReport {
        let mut report = StepReport::default();

        for step in &self.steps {
            let name = step.name();
            let outcome = match step.requires_execution(ctx).await {
                Ok(false) => StepOutcome::Skipped,
                Ok(true) => match step.execute(ctx).await {
                    Ok(()) => StepOutcome::Succeeded,
                    Err(err) => failed(name, err),
                },
                Err(err) => failed(name, err),
            };

            tracing::debug!(step = name, ?outcome, "upgrade step done");
            if report.push(name, outcome, step.required_for_continuation()) {
                break;
            }
        }

        report
    }
}
