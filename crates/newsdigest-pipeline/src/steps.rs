//! The three news pipeline steps: fetch → process → summarize.

use std::sync::Arc;

use async_trait::async_trait;
use newsdigest_core::error::Result;
use newsdigest_scheduler::context::{PipelineContext, keys};
use newsdigest_scheduler::executor::PipelineStep;

use crate::client::PipelineApiClient;

/// Scrape new articles for `source_type`.
pub struct FetchArticlesStep {
    client: Arc<PipelineApiClient>,
}

impl FetchArticlesStep {
    pub fn new(client: Arc<PipelineApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PipelineStep for FetchArticlesStep {
    fn name(&self) -> &str {
        "fetch_articles"
    }

    async fn validate(&self, context: &PipelineContext) -> bool {
        context.contains(keys::SOURCE_TYPE.name())
    }

    async fn execute(&self, context: &PipelineContext) -> Result<PipelineContext> {
        let source_type = context.require(&keys::SOURCE_TYPE)?;
        let fetched = self.client.fetch_articles(&source_type).await?;
        PipelineContext::new().with(&keys::FETCHED_ARTICLES, fetched)
    }
}

/// Process pending articles in one batch.
pub struct ProcessArticlesStep {
    client: Arc<PipelineApiClient>,
    default_limit: u32,
}

impl ProcessArticlesStep {
    pub fn new(client: Arc<PipelineApiClient>, default_limit: u32) -> Self {
        Self {
            client,
            default_limit,
        }
    }
}

#[async_trait]
impl PipelineStep for ProcessArticlesStep {
    fn name(&self) -> &str {
        "process_articles"
    }

    async fn validate(&self, _context: &PipelineContext) -> bool {
        true
    }

    async fn execute(&self, context: &PipelineContext) -> Result<PipelineContext> {
        let limit = context.get(&keys::LIMIT).unwrap_or(self.default_limit);
        let processed = self.client.process_articles(Some(limit)).await?;
        PipelineContext::new().with(&keys::PROCESSED_ARTICLES, processed)
    }
}

/// Produce the latest summaries for `source`.
pub struct GenerateSummariesStep {
    client: Arc<PipelineApiClient>,
    default_limit: u32,
}

impl GenerateSummariesStep {
    pub fn new(client: Arc<PipelineApiClient>, default_limit: u32) -> Self {
        Self {
            client,
            default_limit,
        }
    }
}

#[async_trait]
impl PipelineStep for GenerateSummariesStep {
    fn name(&self) -> &str {
        "generate_summaries"
    }

    async fn validate(&self, context: &PipelineContext) -> bool {
        context.contains(keys::SOURCE.name())
    }

    async fn execute(&self, context: &PipelineContext) -> Result<PipelineContext> {
        let source = context.require(&keys::SOURCE)?;
        let limit = context.get(&keys::LIMIT).unwrap_or(self.default_limit);
        let summaries = self.client.get_summaries(&source, Some(limit)).await?;
        PipelineContext::new().with(&keys::SUMMARIES, summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{api_config, serve};
    use axum::Router;
    use axum::extract::Query;
    use axum::routing::post;
    use std::collections::HashMap;

    async fn echo_client() -> Arc<PipelineApiClient> {
        let echo = |Query(q): Query<HashMap<String, String>>| async move {
            axum::Json(serde_json::json!({ "query": q }))
        };
        let router = Router::new()
            .route("/api/v1/scrapers/scrapers/cnyes/fetch-articles", post(echo))
            .route("/api/v1/articles/process-pending", post(echo))
            .route("/api/v1/articles/latest-summaries", post(echo));
        Arc::new(PipelineApiClient::new(&api_config(serve(router).await)).unwrap())
    }

    #[tokio::test]
    async fn test_fetch_requires_source_type() {
        let step = FetchArticlesStep::new(echo_client().await);
        assert!(!step.validate(&PipelineContext::new()).await);

        let ctx = PipelineContext::new()
            .with(&keys::SOURCE_TYPE, "tw".to_string())
            .unwrap();
        assert!(step.validate(&ctx).await);
        let out = step.execute(&ctx).await.unwrap();
        let fetched = out.get(&keys::FETCHED_ARTICLES).unwrap();
        assert_eq!(fetched["query"]["source_type"], "tw");
    }

    #[tokio::test]
    async fn test_process_uses_default_limit() {
        let step = ProcessArticlesStep::new(echo_client().await, 150);
        assert!(step.validate(&PipelineContext::new()).await);

        let out = step.execute(&PipelineContext::new()).await.unwrap();
        assert_eq!(out.get(&keys::PROCESSED_ARTICLES).unwrap()["query"]["limit"], "150");

        let ctx = PipelineContext::new().with(&keys::LIMIT, 20).unwrap();
        let out = step.execute(&ctx).await.unwrap();
        assert_eq!(out.get(&keys::PROCESSED_ARTICLES).unwrap()["query"]["limit"], "20");
    }

    #[tokio::test]
    async fn test_summaries_require_source() {
        let step = GenerateSummariesStep::new(echo_client().await, 30);
        let ctx = PipelineContext::new()
            .with(&keys::SOURCE_TYPE, "us".to_string())
            .unwrap();
        assert!(!step.validate(&ctx).await);

        let ctx = ctx.with(&keys::SOURCE, "US_Stock_Summary".to_string()).unwrap();
        let out = step.execute(&ctx).await.unwrap();
        let summaries = out.get(&keys::SUMMARIES).unwrap();
        assert_eq!(summaries["query"]["source"], "US_Stock_Summary");
        assert_eq!(summaries["query"]["limit"], "30");
    }
}
