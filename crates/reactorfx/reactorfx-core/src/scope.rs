//! Lifecycle scopes for pause/resume/restart.

use crate::ids::{ElementId, StrategyId};

/// Selects element x strategy bindings. `None` on either axis means "all".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scope {
    pub strategies: Option<Vec<StrategyId>>,
    pub elements: Option<Vec<ElementId>>,
}

impl Scope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn strategies(ids: impl IntoIterator<Item = StrategyId>) -> Self {
        Self {
            strategies: Some(ids.into_iter().collect()),
            elements: None,
        }
    }

    pub fn elements(ids: impl IntoIterator<Item = ElementId>) -> Self {
        Self {
            strategies: None,
            elements: Some(ids.into_iter().collect()),
        }
    }

    pub fn and_elements(mut self, ids: impl IntoIterator<Item = ElementId>) -> Self {
        self.elements = Some(ids.into_iter().collect());
        self
    }

    pub fn and_strategies(mut self, ids: impl IntoIterator<Item = StrategyId>) -> Self {
        self.strategies = Some(ids.into_iter().collect());
        self
    }

    pub fn is_all(&self) -> bool {
        self.strategies.is_none() && self.elements.is_none()
    }

    pub fn contains(&self, element: ElementId, strategy: StrategyId) -> bool {
        let strategy_ok = self
            .strategies
            .as_ref()
            .map_or(true, |ids| ids.contains(&strategy));
        let element_ok = self
            .elements
            .as_ref()
            .map_or(true, |ids| ids.contains(&element));
        strategy_ok && element_ok
    }
}
