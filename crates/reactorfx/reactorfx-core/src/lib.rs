//! ReactorFX Core (host-agnostic)
//!
//! Viewport-driven class animations. A [`RuntimeNexus`] owns a set of
//! [`AnimationStrategy`] rules and a pool of sentinels, one per distinct
//! threshold signature, each multiplexing a single host visibility watcher
//! across every element bound to it. Hosts (the wasm/DOM adapter, test fakes)
//! supply the watcher, selector matching and class-list effects through the
//! traits in [`host`].

pub mod config;
pub mod error;
pub mod host;
pub mod ids;
pub mod nexus;
pub mod scope;
mod sentinel;
pub mod source;
pub mod strategy;
pub mod threshold;

// Re-exports for consumers (adapters)
pub use config::{ConfigPaths, NexusConfig, RuntimeConfig};
pub use error::{BootstrapError, HostError, NexusError, Result, SourceError, ValidationError};
pub use host::{
    ClassEffects, Host, SelectorMatcher, VisibilityEntry, VisibilityWatcher, WatchCallback,
    WatcherFactory,
};
pub use ids::{ElementId, ElementIdAllocator, StrategyId};
pub use nexus::{BindingState, RuntimeNexus};
pub use scope::Scope;
pub use source::{parse_strategies_json, JsonSource, StaticSource, StrategySource};
pub use strategy::{AnimationStrategy, ElementHook, StrategyPatch};
pub use threshold::ThresholdSignature;
