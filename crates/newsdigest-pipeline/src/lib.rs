//! # NewsDigest Pipeline
//!
//! News fetch → process → summarize steps against the content backend,
//! plus the `news_summary` task that drives them for every source.
//!
//! ## Architecture
//! ```text
//! NewsPipeline
//!   ├── PipelineApiClient (reqwest, retry with back-off)
//!   ├── SourceRegistry
//!   │     ├── TW_Stock_Summary  (tw)
//!   │     ├── US_Stock_Summary  (us)
//!   │     └── Hot_News_Summary  (headline)
//!   └── per source: FetchArticlesStep → ProcessArticlesStep → GenerateSummariesStep
//! ```

pub mod client;
pub mod news;
pub mod sources;
pub mod steps;

pub use client::PipelineApiClient;
pub use news::{NEWS_SUMMARY_TASK, NewsPipeline, news_summary_task, register_default_tasks};
pub use sources::{SourceRegistry, SourceSpec};
pub use steps::{FetchArticlesStep, GenerateSummariesStep, ProcessArticlesStep};
