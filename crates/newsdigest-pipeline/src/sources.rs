//! Source Registry — the summary categories the news pipeline knows about.

use newsdigest_core::error::{DigestError, Result};
use newsdigest_scheduler::context::{PipelineContext, keys};
use serde::{Deserialize, Serialize};

/// One summary category and the scraper feeding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Summary category id, e.g. `TW_Stock_Summary`.
    pub source_id: String,
    pub name: String,
    /// Scraper family passed to the fetch endpoint.
    pub source_type: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 { 150 }

impl SourceSpec {
    pub fn new(source_id: &str, name: &str, source_type: &str) -> Self {
        Self {
            source_id: source_id.into(),
            name: name.into(),
            source_type: source_type.into(),
            limit: default_limit(),
        }
    }

    /// Seed context for one pipeline run over this source.
    pub fn to_context(&self) -> Result<PipelineContext> {
        PipelineContext::new()
            .with(&keys::SOURCE_TYPE, self.source_type.clone())?
            .with(&keys::SOURCE, self.source_id.clone())?
            .with(&keys::LIMIT, self.limit)
    }
}

/// Ordered catalogue of sources. Runs visit sources in registration order.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<SourceSpec>,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SourceRegistry {
    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Taiwan stocks, US stocks and headline news.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(SourceSpec::new("TW_Stock_Summary", "Taiwan stock market", "tw"));
        registry.register(SourceSpec::new("US_Stock_Summary", "US stock market", "us"));
        registry.register(SourceSpec::new("Hot_News_Summary", "Hot financial news", "headline"));
        registry
    }

    /// Add or replace a source, keeping its original position on replace.
    pub fn register(&mut self, spec: SourceSpec) {
        match self.sources.iter_mut().find(|s| s.source_id == spec.source_id) {
            Some(existing) => *existing = spec,
            None => self.sources.push(spec),
        }
    }

    pub fn get(&self, source_id: &str) -> Result<&SourceSpec> {
        self.sources
            .iter()
            .find(|s| s.source_id == source_id)
            .ok_or_else(|| DigestError::TaskConfiguration(format!("Invalid source: {source_id}")))
    }

    pub fn all(&self) -> &[SourceSpec] {
        &self.sources
    }

    pub fn ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.source_id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
