//! Deterministic in-memory host for exercising the nexus without a browser.
//!
//! Elements carry a tag and a class list; selectors support `*`, `tag`,
//! `.class`, `#id`, compounds of those (`section.slide`) and comma lists.
//! Watchers never fire on their own: tests push batches with [`FakeHost::emit`].

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use reactorfx_core::{
    ClassEffects, ElementId, ElementIdAllocator, Host, HostError, SelectorMatcher,
    VisibilityEntry, VisibilityWatcher, WatchCallback, WatcherFactory,
};

#[derive(Debug, Default)]
struct FakeElement {
    tag: String,
    id: Option<String>,
    classes: BTreeSet<String>,
}

struct WatcherRecord {
    thresholds: Vec<f32>,
    callback: WatchCallback,
    observed: BTreeSet<ElementId>,
    connected: bool,
}

#[derive(Default)]
struct FakeDom {
    ids: ElementIdAllocator,
    elements: BTreeMap<ElementId, FakeElement>,
    watchers: Vec<WatcherRecord>,
    fail_watchers: bool,
}

#[derive(Default)]
pub struct FakeHost {
    dom: Rc<RefCell<FakeDom>>,
}

struct FakeWatcher {
    dom: Rc<RefCell<FakeDom>>,
    index: usize,
}

impl VisibilityWatcher for FakeWatcher {
    fn observe(&mut self, element: ElementId) {
        if let Some(w) = self.dom.borrow_mut().watchers.get_mut(self.index) {
            if w.connected {
                w.observed.insert(element);
            }
        }
    }

    fn unobserve(&mut self, element: ElementId) {
        if let Some(w) = self.dom.borrow_mut().watchers.get_mut(self.index) {
            w.observed.remove(&element);
        }
    }

    fn disconnect(&mut self) {
        if let Some(w) = self.dom.borrow_mut().watchers.get_mut(self.index) {
            w.connected = false;
            w.observed.clear();
        }
    }
}

fn matches_compound(el: &FakeElement, compound: &str) -> bool {
    if compound == "*" {
        return true;
    }
    let mut rest = compound;
    let tag_end = rest.find(['.', '#']).unwrap_or(rest.len());
    let tag = &rest[..tag_end];
    if !tag.is_empty() && tag != "*" && !tag.eq_ignore_ascii_case(&el.tag) {
        return false;
    }
    rest = &rest[tag_end..];
    while !rest.is_empty() {
        let marker = &rest[..1];
        let body = &rest[1..];
        let end = body.find(['.', '#']).unwrap_or(body.len());
        let name = &body[..end];
        if name.is_empty() {
            return false;
        }
        let ok = match marker {
            "." => el.classes.contains(name),
            _ => el.id.as_deref() == Some(name),
        };
        if !ok {
            return false;
        }
        rest = &body[end..];
    }
    true
}

impl FakeHost {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Capability bundle for a nexus backed by this host.
    pub fn host(self: &Rc<Self>) -> Host {
        Host::from_shared(self.clone())
    }

    /// Create an element with a tag and initial classes.
    pub fn element(&self, tag: &str, classes: &[&str]) -> ElementId {
        let mut dom = self.dom.borrow_mut();
        let id = dom.ids.alloc();
        dom.elements.insert(
            id,
            FakeElement {
                tag: tag.to_string(),
                id: None,
                classes: classes.iter().map(|c| c.to_string()).collect(),
            },
        );
        id
    }

    /// Create an element with an `id` attribute.
    pub fn element_with_id(&self, tag: &str, dom_id: &str, classes: &[&str]) -> ElementId {
        let el = self.element(tag, classes);
        if let Some(e) = self.dom.borrow_mut().elements.get_mut(&el) {
            e.id = Some(dom_id.to_string());
        }
        el
    }

    pub fn classes(&self, element: ElementId) -> Vec<String> {
        self.dom
            .borrow()
            .elements
            .get(&element)
            .map(|e| e.classes.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, element: ElementId, class: &str) -> bool {
        self.dom
            .borrow()
            .elements
            .get(&element)
            .is_some_and(|e| e.classes.contains(class))
    }

    /// Make subsequent watcher construction fail.
    pub fn fail_watchers(&self, fail: bool) {
        self.dom.borrow_mut().fail_watchers = fail;
    }

    /// Deliver one entry for `element` to every live watcher observing it.
    pub fn emit(&self, element: ElementId, ratio: f32) {
        self.emit_batch(&[(element, ratio)]);
    }

    /// Deliver a batch; each live watcher receives the entries it observes, in order.
    pub fn emit_batch(&self, entries: &[(ElementId, f32)]) {
        let deliveries: Vec<(WatchCallback, Vec<VisibilityEntry>)> = {
            let dom = self.dom.borrow();
            dom.watchers
                .iter()
                .filter(|w| w.connected)
                .filter_map(|w| {
                    let batch: Vec<VisibilityEntry> = entries
                        .iter()
                        .filter(|(el, _)| w.observed.contains(el))
                        .map(|(el, ratio)| VisibilityEntry::new(*el, *ratio, *ratio > 0.0))
                        .collect();
                    (!batch.is_empty()).then(|| (w.callback.clone(), batch))
                })
                .collect()
        };
        for (callback, batch) in deliveries {
            callback(&batch);
        }
    }

    /// Deliver straight to watcher `index` regardless of its state, the way a
    /// notification queued before unobserve/disconnect would arrive.
    pub fn emit_late(&self, index: usize, element: ElementId, ratio: f32) {
        let callback = self
            .dom
            .borrow()
            .watchers
            .get(index)
            .map(|w| w.callback.clone());
        if let Some(callback) = callback {
            callback(&[VisibilityEntry::new(element, ratio, ratio > 0.0)]);
        }
    }

    /// Watchers ever created.
    pub fn created_watchers(&self) -> usize {
        self.dom.borrow().watchers.len()
    }

    pub fn live_watchers(&self) -> usize {
        self.dom
            .borrow()
            .watchers
            .iter()
            .filter(|w| w.connected)
            .count()
    }

    /// Threshold lists of the live watchers, in creation order.
    pub fn live_thresholds(&self) -> Vec<Vec<f32>> {
        self.dom
            .borrow()
            .watchers
            .iter()
            .filter(|w| w.connected)
            .map(|w| w.thresholds.clone())
            .collect()
    }

    /// Number of live watchers currently observing `element`.
    pub fn watchers_observing(&self, element: ElementId) -> usize {
        self.dom
            .borrow()
            .watchers
            .iter()
            .filter(|w| w.connected && w.observed.contains(&element))
            .count()
    }
}

impl WatcherFactory for FakeHost {
    fn create(
        &self,
        thresholds: &[f32],
        callback: WatchCallback,
    ) -> Result<Box<dyn VisibilityWatcher>, HostError> {
        let mut dom = self.dom.borrow_mut();
        if dom.fail_watchers {
            return Err(HostError::new("watcher construction refused"));
        }
        dom.watchers.push(WatcherRecord {
            thresholds: thresholds.to_vec(),
            callback,
            observed: BTreeSet::new(),
            connected: true,
        });
        Ok(Box::new(FakeWatcher {
            dom: self.dom.clone(),
            index: dom.watchers.len() - 1,
        }))
    }
}

impl SelectorMatcher for FakeHost {
    fn matches(&self, element: ElementId, selector: &str) -> bool {
        let dom = self.dom.borrow();
        let Some(el) = dom.elements.get(&element) else {
            return false;
        };
        selector
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .any(|compound| matches_compound(el, compound))
    }
}

impl ClassEffects for FakeHost {
    fn add_class(&self, element: ElementId, class: &str) {
        if let Some(e) = self.dom.borrow_mut().elements.get_mut(&element) {
            e.classes.insert(class.to_string());
        }
    }

    fn remove_class(&self, element: ElementId, class: &str) {
        if let Some(e) = self.dom.borrow_mut().elements.get_mut(&element) {
            e.classes.remove(class);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_selectors() {
        let host = FakeHost::new();
        let a = host.element("section", &["slide", "wide"]);
        let b = host.element_with_id("div", "hero", &[]);
        assert!(host.matches(a, "section.slide"));
        assert!(host.matches(a, ".wide.slide"));
        assert!(!host.matches(a, "div.slide"));
        assert!(host.matches(b, "#hero, .hero"));
        assert!(host.matches(b, "*"));
        assert!(!host.matches(b, ".hero"));
    }
}
