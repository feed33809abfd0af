//! Animation strategy contract.
//!
//! A strategy is plain data plus two optional effect hooks. The nexus applies
//! `main_class` when an element is bound, toggles `active_class` on enter/exit
//! and then calls the matching hook with the affected element.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::ElementId;

/// Effect hook receiving the affected element.
pub type ElementHook = Rc<dyn Fn(ElementId)>;

fn default_thresholds() -> Vec<f32> {
    vec![0.0]
}

/// One animation rule.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationStrategy {
    /// Optional display name, also usable for lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Selector used to find candidate elements.
    pub selector: String,
    /// Class applied once when an element is bound.
    pub main_class: String,
    /// Class toggled on enter/exit. Empty disables toggling.
    #[serde(default)]
    pub active_class: String,
    /// Visibility ratios in [0, 1].
    #[serde(default = "default_thresholds", alias = "threshold")]
    pub thresholds: Vec<f32>,
    /// Trigger only on the first entry until restarted.
    #[serde(default)]
    pub once: bool,
    #[serde(skip)]
    pub on_enter: Option<ElementHook>,
    #[serde(skip)]
    pub on_exit: Option<ElementHook>,
}

impl fmt::Debug for AnimationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationStrategy")
            .field("name", &self.name)
            .field("selector", &self.selector)
            .field("main_class", &self.main_class)
            .field("active_class", &self.active_class)
            .field("thresholds", &self.thresholds)
            .field("once", &self.once)
            .field("on_enter", &self.on_enter.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}

impl AnimationStrategy {
    pub fn new(
        selector: impl Into<String>,
        main_class: impl Into<String>,
        active_class: impl Into<String>,
        thresholds: Vec<f32>,
    ) -> Self {
        Self {
            name: None,
            selector: selector.into(),
            main_class: main_class.into(),
            active_class: active_class.into(),
            thresholds,
            once: false,
            on_enter: None,
            on_exit: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    pub fn on_enter(mut self, hook: impl Fn(ElementId) + 'static) -> Self {
        self.on_enter = Some(Rc::new(hook));
        self
    }

    pub fn on_exit(mut self, hook: impl Fn(ElementId) + 'static) -> Self {
        self.on_exit = Some(Rc::new(hook));
        self
    }

    /// Structural check performed by the nexus before anything is registered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.selector.trim().is_empty() {
            return Err(ValidationError::EmptySelector);
        }
        if self.main_class.trim().is_empty() {
            return Err(ValidationError::EmptyMainClass);
        }
        if self.thresholds.is_empty() {
            return Err(ValidationError::EmptyThresholds);
        }
        if let Some(bad) = self
            .thresholds
            .iter()
            .find(|t| !t.is_finite() || **t < 0.0 || **t > 1.0)
        {
            return Err(ValidationError::ThresholdOutOfRange { value: *bad });
        }
        Ok(())
    }

    /// Apply a partial update, returning the merged strategy.
    pub fn patched(&self, patch: StrategyPatch) -> Self {
        let mut next = self.clone();
        if let Some(name) = patch.name {
            next.name = name;
        }
        if let Some(selector) = patch.selector {
            next.selector = selector;
        }
        if let Some(main) = patch.main_class {
            next.main_class = main;
        }
        if let Some(active) = patch.active_class {
            next.active_class = active;
        }
        if let Some(thresholds) = patch.thresholds {
            next.thresholds = thresholds;
        }
        if let Some(once) = patch.once {
            next.once = once;
        }
        if let Some(hook) = patch.on_enter {
            next.on_enter = hook;
        }
        if let Some(hook) = patch.on_exit {
            next.on_exit = hook;
        }
        next
    }
}

/// Partial update for [`RuntimeNexus::update_strategy`](crate::RuntimeNexus::update_strategy).
///
/// `None` leaves a field untouched. Hooks use a nested option so they can be
/// cleared (`Some(None)`).
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrategyPatch {
    pub name: Option<Option<String>>,
    pub selector: Option<String>,
    pub main_class: Option<String>,
    pub active_class: Option<String>,
    #[serde(alias = "threshold")]
    pub thresholds: Option<Vec<f32>>,
    pub once: Option<bool>,
    #[serde(skip)]
    pub on_enter: Option<Option<ElementHook>>,
    #[serde(skip)]
    pub on_exit: Option<Option<ElementHook>>,
}

impl StrategyPatch {
    pub fn thresholds(values: Vec<f32>) -> Self {
        Self {
            thresholds: Some(values),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.selector.is_none()
            && self.main_class.is_none()
            && self.active_class.is_none()
            && self.thresholds.is_none()
            && self.once.is_none()
            && self.on_enter.is_none()
            && self.on_exit.is_none()
    }
}
