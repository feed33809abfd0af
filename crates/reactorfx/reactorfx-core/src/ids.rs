//! Identifiers and simple allocators for core entities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Registry handle for a strategy held by the nexus.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct StrategyId(pub u32);

/// Opaque element handle. Hosts allocate these; the core never dereferences them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ElementId(pub u32);

/// Identity of one sentinel within a nexus. Survives threshold re-keying.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub(crate) struct SentinelId(pub u32);

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "strategy#{}", self.0)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

/// Monotonic allocator for StrategyId and SentinelId.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_strategy: u32,
    next_sentinel: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_strategy(&mut self) -> StrategyId {
        let id = StrategyId(self.next_strategy);
        self.next_strategy = self.next_strategy.wrapping_add(1);
        id
    }

    #[inline]
    pub(crate) fn alloc_sentinel(&mut self) -> SentinelId {
        let id = SentinelId(self.next_sentinel);
        self.next_sentinel = self.next_sentinel.wrapping_add(1);
        id
    }
}

/// Monotonic allocator for ElementId, for hosts that do not have their own handles.
#[derive(Default, Debug)]
pub struct ElementIdAllocator {
    next: u32,
}

impl ElementIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc(&mut self) -> ElementId {
        let id = ElementId(self.next);
        self.next = self.next.wrapping_add(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_monotonic() {
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.alloc_strategy(), StrategyId(0));
        assert_eq!(alloc.alloc_strategy(), StrategyId(1));
        assert_eq!(alloc.alloc_sentinel(), SentinelId(0));

        let mut elements = ElementIdAllocator::new();
        assert_eq!(elements.alloc(), ElementId(0));
        assert_eq!(elements.alloc(), ElementId(1));
    }

    #[test]
    fn display_is_tagged() {
        assert_eq!(StrategyId(3).to_string(), "strategy#3");
        assert_eq!(ElementId(7).to_string(), "element#7");
    }
}
