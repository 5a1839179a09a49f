//! News summary pipeline and the tasks built on it.
//!
//! ## Flow
//! ```text
//! news_summary task
//!   ├── context names a `source`  → that source only
//!   └── otherwise                 → every registered source, in order
//!         └── per source: fetch_articles → process_articles → generate_summaries
//! ```
//!
//! A failing source is logged and skipped. The run fails only when every
//! source failed.

use std::sync::Arc;

use newsdigest_core::config::{DigestConfig, PipelineConfig};
use newsdigest_core::error::{DigestError, Result};
use newsdigest_core::schedule::TaskSchedule;
use newsdigest_scheduler::context::{PipelineContext, keys};
use newsdigest_scheduler::executor::PipelineExecutor;
use newsdigest_scheduler::pipeline_task::PipelineTask;
use newsdigest_scheduler::service::SchedulerService;

use crate::client::PipelineApiClient;
use crate::sources::SourceRegistry;
use crate::steps::{FetchArticlesStep, GenerateSummariesStep, ProcessArticlesStep};

/// Id of the task registered when the configuration lists none.
pub const NEWS_SUMMARY_TASK: &str = "news_summary";

/// Shared handles every news pipeline run needs.
pub struct NewsPipeline {
    client: Arc<PipelineApiClient>,
    defaults: PipelineConfig,
    sources: SourceRegistry,
}

impl NewsPipeline {
    pub fn new(client: Arc<PipelineApiClient>, defaults: PipelineConfig) -> Self {
        Self {
            client,
            defaults,
            sources: SourceRegistry::builtin(),
        }
    }

    pub fn with_sources(mut self, sources: SourceRegistry) -> Self {
        self.sources = sources;
        self
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    /// Fetch, process and summarize one source. Returns the step outputs.
    pub async fn process_single_source(&self, context: PipelineContext) -> Result<PipelineContext> {
        let mut executor = PipelineExecutor::new()
            .with_context(context)
            .add_step(FetchArticlesStep::new(self.client.clone()))
            .add_step(ProcessArticlesStep::new(
                self.client.clone(),
                self.defaults.batch_size,
            ))
            .add_step(GenerateSummariesStep::new(
                self.client.clone(),
                self.defaults.summary_limit,
            ));
        executor.execute().await
    }

    /// Entry point of the `news_summary` task.
    pub async fn news_summary_pipeline(&self, context: PipelineContext) -> Result<()> {
        if let Some(source) = context.get(&keys::SOURCE) {
            let seed = self.seed_for(&source, context)?;
            tracing::info!("📰 Processing single source: {}", source);
            self.process_single_source(seed).await?;
            tracing::info!("✅ Completed processing source: {}", source);
            return Ok(());
        }

        tracing::info!(
            "📰 Starting news summary pipeline for {} sources",
            self.sources.len()
        );
        let limit = context.get(&keys::LIMIT);
        let mut failures = Vec::new();
        for spec in self.sources.all() {
            let mut seed = spec.to_context()?;
            if let Some(limit) = limit {
                seed.insert(&keys::LIMIT, limit)?;
            }

            tracing::info!("Processing source: {}", spec.source_id);
            match self.process_single_source(seed).await {
                Ok(_) => tracing::info!("✅ Completed processing source: {}", spec.source_id),
                Err(e) => {
                    tracing::error!("❌ Error processing source {}: {}", spec.source_id, e);
                    failures.push(format!("{}: {}", spec.source_id, e));
                }
            }
        }

        if !self.sources.is_empty() && failures.len() == self.sources.len() {
            return Err(DigestError::step(
                NEWS_SUMMARY_TASK,
                format!("all sources failed ({})", failures.join("; ")),
            ));
        }
        Ok(())
    }

    /// Registry defaults for `source`, overridden by whatever the task context sets.
    fn seed_for(&self, source: &str, context: PipelineContext) -> Result<PipelineContext> {
        match self.sources.get(source) {
            Ok(spec) => {
                let mut seed = spec.to_context()?;
                seed.merge(context);
                Ok(seed)
            }
            // Unknown categories still run when the context carries a source_type.
            Err(_) => Ok(context),
        }
    }
}

/// Wrap the news pipeline into a schedulable task.
pub fn news_summary_task(
    name: impl Into<String>,
    pipeline: Arc<NewsPipeline>,
    context: PipelineContext,
) -> PipelineTask {
    PipelineTask::from_fn(name, context, move |ctx| {
        let pipeline = pipeline.clone();
        async move { pipeline.news_summary_pipeline(ctx).await }
    })
}

/// Register the configured `[[tasks]]`, or the built-in `news_summary` task
/// (all day, every 15 minutes) when none are configured.
pub fn register_default_tasks(
    service: &SchedulerService,
    config: &DigestConfig,
    pipeline: Arc<NewsPipeline>,
) -> Result<Vec<String>> {
    let mut ids = Vec::new();

    if config.tasks.is_empty() {
        let task = news_summary_task(NEWS_SUMMARY_TASK, pipeline, PipelineContext::new());
        service.register_task(
            NEWS_SUMMARY_TASK,
            Arc::new(task),
            Some(TaskSchedule::all_day(15.0)),
        )?;
        ids.push(NEWS_SUMMARY_TASK.to_string());
        return Ok(ids);
    }

    for entry in &config.tasks {
        let context = PipelineContext::from(entry.context.clone());
        if let Some(source) = context.get(&keys::SOURCE)
            && pipeline.sources().get(&source).is_err()
            && !context.contains(keys::SOURCE_TYPE.name())
        {
            return Err(DigestError::TaskConfiguration(format!(
                "task '{}' names unknown source '{}' without a source_type",
                entry.id, source
            )));
        }
        let task = news_summary_task(entry.display_name(), pipeline.clone(), context);
        service.register_task(entry.id.clone(), Arc::new(task), Some(entry.schedule.clone()))?;
        ids.push(entry.id.clone());
    }
    Ok(ids)
}
