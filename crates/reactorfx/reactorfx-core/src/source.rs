//! Strategy sources: where the initial strategy list comes from.
//!
//! A source is awaited once at startup with the resolved [`RuntimeConfig`].
//! Failures are handed back to the caller as they are; the core neither retries
//! nor substitutes defaults.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::RuntimeConfig;
use crate::error::SourceError;
use crate::strategy::AnimationStrategy;

/// Asynchronous producer of the initial strategies.
#[async_trait(?Send)]
pub trait StrategySource {
    async fn load(&self, config: &RuntimeConfig) -> Result<Vec<AnimationStrategy>, SourceError>;
}

/// Source backed by an in-memory list.
#[derive(Clone, Debug, Default)]
pub struct StaticSource {
    strategies: Vec<AnimationStrategy>,
}

impl StaticSource {
    pub fn new(strategies: Vec<AnimationStrategy>) -> Self {
        Self { strategies }
    }
}

#[async_trait(?Send)]
impl StrategySource for StaticSource {
    async fn load(&self, _config: &RuntimeConfig) -> Result<Vec<AnimationStrategy>, SourceError> {
        Ok(self.strategies.clone())
    }
}

/// Source backed by a JSON document (see [`parse_strategies_json`]).
#[derive(Clone, Debug)]
pub struct JsonSource {
    json: String,
}

impl JsonSource {
    pub fn new(json: impl Into<String>) -> Self {
        Self { json: json.into() }
    }
}

#[async_trait(?Send)]
impl StrategySource for JsonSource {
    async fn load(&self, _config: &RuntimeConfig) -> Result<Vec<AnimationStrategy>, SourceError> {
        parse_strategies_json(&self.json)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StrategyDocument {
    List(Vec<AnimationStrategy>),
    Wrapped { strategies: Vec<AnimationStrategy> },
}

/// Parse either a bare array of strategies or `{ "strategies": [...] }`.
///
/// Structural validation is left to the nexus so the error names the offending field.
pub fn parse_strategies_json(s: &str) -> Result<Vec<AnimationStrategy>, SourceError> {
    let doc: StrategyDocument = serde_json::from_str(s)?;
    Ok(match doc {
        StrategyDocument::List(list) => list,
        StrategyDocument::Wrapped { strategies } => strategies,
    })
}
