//! Execution context threaded through the ordered steps of one pipeline run.
//!
//! The context is a JSON object underneath so it can be seeded straight from
//! configuration, but every well-known entry is read and written through a
//! typed [`ContextKey`], which pins both the key name and the value type in
//! one place.

use std::marker::PhantomData;

use newsdigest_core::error::{DigestError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named context entry holding values of type `T`.
pub struct ContextKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextKey<T> {}

impl<T> std::fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ContextKey").field(&self.name).finish()
    }
}

/// Keys shared by the news pipeline steps.
pub mod keys {
    use super::ContextKey;

    /// Scraper family to fetch from (`tw`, `us`, `headline`). Seeded by the caller.
    pub const SOURCE_TYPE: ContextKey<String> = ContextKey::new("source_type");
    /// Summary category id, e.g. `TW_Stock_Summary`. Seeded by the caller.
    pub const SOURCE: ContextKey<String> = ContextKey::new("source");
    /// Batch size for processing and summarizing.
    pub const LIMIT: ContextKey<u32> = ContextKey::new("limit");
    /// Written by the fetch step.
    pub const FETCHED_ARTICLES: ContextKey<serde_json::Value> = ContextKey::new("fetched_articles");
    /// Written by the process step.
    pub const PROCESSED_ARTICLES: ContextKey<serde_json::Value> =
        ContextKey::new("processed_articles");
    /// Written by the summarize step.
    pub const SUMMARIES: ContextKey<serde_json::Value> = ContextKey::new("summaries");
}

/// Append-only key/value accumulator. Entries can be overwritten but never removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineContext {
    entries: Map<String, Value>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed read. Returns `None` when the key is absent or holds a value of another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &ContextKey<T>) -> Option<T> {
        self.entries
            .get(key.name())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Typed read that fails with a step error naming the missing key.
    pub fn require<T: DeserializeOwned>(&self, key: &ContextKey<T>) -> Result<T> {
        let raw = self.entries.get(key.name()).ok_or_else(|| {
            DigestError::step("context", format!("missing key '{}'", key.name()))
        })?;
        serde_json::from_value(raw.clone()).map_err(|e| {
            DigestError::step("context", format!("key '{}' has wrong type: {e}", key.name()))
        })
    }

    pub fn insert<T: Serialize>(&mut self, key: &ContextKey<T>, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.entries.insert(key.name().to_string(), value);
        Ok(())
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with<T: Serialize>(mut self, key: &ContextKey<T>, value: T) -> Result<Self> {
        self.insert(key, value)?;
        Ok(self)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get_raw(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// Merge `other` in; its entries win on conflicts.
    pub fn merge(&mut self, other: PipelineContext) {
        self.entries.extend(other.entries);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.entries
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.entries)
    }
}

impl From<Map<String, Value>> for PipelineContext {
    fn from(entries: Map<String, Value>) -> Self {
        Self { entries }
    }
}

impl TryFrom<Value> for PipelineContext {
    type Error = DigestError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(entries) => Ok(Self { entries }),
            other => Err(DigestError::TaskConfiguration(format!(
                "pipeline context must be an object, got {other}"
            ))),
        }
    }
}
