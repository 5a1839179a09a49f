//! Pipeline Executor — runs ordered steps against one shared context.
//!
//! ## Flow
//! ```text
//! seed context
//!   → for each step, in insertion order:
//!       validate(context)   false → StepValidation, chain stops
//!       execute(context)    Err   → on_failure, error returned, chain stops
//!       merge partial into context + accumulated result
//!       on_success(partial)
//! ```
//!
//! Nothing is rolled back on abort: [`PipelineExecutor::result`] still holds
//! what earlier steps produced.

use std::sync::Arc;

use async_trait::async_trait;
use newsdigest_core::error::{DigestError, Result};

use crate::context::PipelineContext;

/// One stage of a pipeline.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    fn name(&self) -> &str;

    /// Precondition over the current context. Must not mutate anything.
    async fn validate(&self, context: &PipelineContext) -> bool;

    /// Do the work and return the entries to merge into the context.
    async fn execute(&self, context: &PipelineContext) -> Result<PipelineContext>;

    async fn on_success(&self, output: &PipelineContext) -> Result<()> {
        tracing::info!("✅ Step completed: {} ({} keys)", self.name(), output.len());
        Ok(())
    }

    async fn on_failure(&self, error: &DigestError) -> Result<()> {
        tracing::error!("❌ Step failed: {}, error: {}", self.name(), error);
        Ok(())
    }
}

#[derive(Default)]
pub struct PipelineExecutor {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
    result: PipelineContext,
}

impl PipelineExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the seed context.
    pub fn with_context(mut self, context: PipelineContext) -> Self {
        self.context = context;
        self
    }

    pub fn add_step(mut self, step: impl PipelineStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn add_shared_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Seed context merged with every completed step's output.
    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Outputs of completed steps only.
    pub fn result(&self) -> &PipelineContext {
        &self.result
    }

    /// Run every step in order. Returns the accumulated step outputs.
    pub async fn execute(&mut self) -> Result<PipelineContext> {
        for step in &self.steps {
            tracing::info!("▶️ Executing step: {}", step.name());

            if !step.validate(&self.context).await {
                tracing::warn!("⛔ Step validation failed: {}", step.name());
                return Err(DigestError::StepValidation {
                    step: step.name().to_string(),
                });
            }

            let output = match step.execute(&self.context).await {
                Ok(output) => output,
                Err(e) => {
                    step.on_failure(&e).await?;
                    return Err(e);
                }
            };

            self.context.merge(output.clone());
            self.result.merge(output.clone());
            step.on_success(&output).await?;
        }

        Ok(self.result.clone())
    }
}
