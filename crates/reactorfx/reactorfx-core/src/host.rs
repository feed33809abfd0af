//! Host capabilities consumed by the core.
//!
//! Adapters (wasm/DOM, test fakes) implement these traits. The core only ever
//! talks to the host through them, so it can run against a fake watcher that
//! delivers deterministic batches.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::ids::ElementId;

/// Visibility state of one element within a notification batch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisibilityEntry {
    pub element: ElementId,
    pub ratio: f32,
    pub is_intersecting: bool,
}

impl VisibilityEntry {
    pub fn new(element: ElementId, ratio: f32, is_intersecting: bool) -> Self {
        Self {
            element,
            ratio,
            is_intersecting,
        }
    }

    /// Whether this entry counts as "entered" for a threshold set whose smallest
    /// value is `min_threshold`.
    pub fn is_visible(&self, min_threshold: f32) -> bool {
        if min_threshold <= 0.0 {
            self.is_intersecting
        } else {
            self.ratio >= min_threshold
        }
    }
}

/// Batch callback handed to a watcher at construction.
pub type WatchCallback = Rc<dyn Fn(&[VisibilityEntry])>;

/// One visibility-watcher instance bound to a fixed threshold set.
///
/// Implementations must deliver batches asynchronously, never from inside
/// `observe`/`unobserve`.
pub trait VisibilityWatcher {
    fn observe(&mut self, element: ElementId);
    fn unobserve(&mut self, element: ElementId);
    fn disconnect(&mut self);
}

/// Builds watchers for a threshold set.
pub trait WatcherFactory {
    fn create(
        &self,
        thresholds: &[f32],
        callback: WatchCallback,
    ) -> Result<Box<dyn VisibilityWatcher>, HostError>;
}

/// Selector matching supplied by the document.
pub trait SelectorMatcher {
    fn matches(&self, element: ElementId, selector: &str) -> bool;
}

/// Class-list mutation on host elements.
pub trait ClassEffects {
    fn add_class(&self, element: ElementId, class: &str);
    fn remove_class(&self, element: ElementId, class: &str);
}

/// Bundle of host capabilities injected into the nexus.
#[derive(Clone)]
pub struct Host {
    pub watchers: Rc<dyn WatcherFactory>,
    pub matcher: Rc<dyn SelectorMatcher>,
    pub effects: Rc<dyn ClassEffects>,
}

impl Host {
    pub fn new(
        watchers: Rc<dyn WatcherFactory>,
        matcher: Rc<dyn SelectorMatcher>,
        effects: Rc<dyn ClassEffects>,
    ) -> Self {
        Self {
            watchers,
            matcher,
            effects,
        }
    }

    /// Convenience for hosts implementing all three capabilities on one type.
    pub fn from_shared<T>(host: Rc<T>) -> Self
    where
        T: WatcherFactory + SelectorMatcher + ClassEffects + 'static,
    {
        Self {
            watchers: host.clone(),
            matcher: host.clone(),
            effects: host,
        }
    }
}
