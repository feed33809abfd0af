//! Browser host: `IntersectionObserver` watchers, `Element::matches` and `classList`.
//!
//! Elements cross into the core as [`ElementId`]s. The registry keeps the
//! `Element` alive for as long as some binding refers to it and tags the node with
//! its id so observer entries map back without a scan.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use js_sys::{Array, Reflect};
use log::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Element, IntersectionObserver, IntersectionObserverEntry, IntersectionObserverInit,
    MutationObserver, MutationObserverInit, MutationRecord, Node, NodeList,
};

use reactorfx_core::{
    ClassEffects, ElementId, ElementIdAllocator, HostError, SelectorMatcher, VisibilityEntry,
    VisibilityWatcher, WatchCallback, WatcherFactory,
};

use crate::convert::jsvalue_is_undefined_or_null;

const ID_PROP: &str = "__reactorfxId";

/// Describe a thrown JS value for an error message.
pub(crate) fn js_message(v: &JsValue) -> String {
    if let Some(s) = v.as_string() {
        return s;
    }
    Reflect::get(v, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_else(|| format!("{v:?}"))
}

pub(crate) fn node_elements(nodes: &NodeList) -> Vec<Element> {
    (0..nodes.length())
        .filter_map(|i| nodes.item(i))
        .filter_map(|n| n.dyn_into::<Element>().ok())
        .collect()
}

/// `querySelectorAll` on `root`, or on the window's document when `root` is absent.
pub(crate) fn query_all(root: &JsValue, selector: &str) -> Result<Vec<Element>, String> {
    let found = if jsvalue_is_undefined_or_null(root) {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| "no document available".to_string())?;
        document.query_selector_all(selector)
    } else if let Some(el) = root.dyn_ref::<Element>() {
        el.query_selector_all(selector)
    } else if let Some(doc) = root.dyn_ref::<Document>() {
        doc.query_selector_all(selector)
    } else {
        return Err("scan root must be an Element or a Document".into());
    };
    found
        .map(|nodes| node_elements(&nodes))
        .map_err(|e| format!("selector '{selector}': {}", js_message(&e)))
}

/// Node a mutation watch is rooted at: `root`, or the window's document.
pub(crate) fn mutation_root(root: &JsValue) -> Result<Node, String> {
    if jsvalue_is_undefined_or_null(root) {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| "no document available".to_string())?;
        Ok(document.into())
    } else {
        root.dyn_ref::<Node>()
            .cloned()
            .ok_or_else(|| "mutation root must be a Node".to_string())
    }
}

/// `MutationObserver` over a subtree's child lists. Class changes are attribute
/// mutations, so our own effects never come back through it.
pub(crate) struct MutationWatch {
    observer: MutationObserver,
    _callback: Closure<dyn FnMut(Array, MutationObserver)>,
}

impl MutationWatch {
    /// `on_batch` receives the element nodes added and removed by one batch.
    pub fn new(
        root: &Node,
        mut on_batch: impl FnMut(Vec<Element>, Vec<Element>) + 'static,
    ) -> Result<Self, String> {
        let callback = Closure::<dyn FnMut(Array, MutationObserver)>::new(
            move |records: Array, _: MutationObserver| {
                let mut added = Vec::new();
                let mut removed = Vec::new();
                for record in records
                    .iter()
                    .filter_map(|r| r.dyn_into::<MutationRecord>().ok())
                {
                    added.extend(node_elements(&record.added_nodes()));
                    removed.extend(node_elements(&record.removed_nodes()));
                }
                if !added.is_empty() || !removed.is_empty() {
                    on_batch(added, removed);
                }
            },
        );
        let observer = MutationObserver::new(callback.as_ref().unchecked_ref())
            .map_err(|e| format!("MutationObserver: {}", js_message(&e)))?;
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        observer
            .observe_with_options(root, &init)
            .map_err(|e| format!("MutationObserver.observe: {}", js_message(&e)))?;
        Ok(Self {
            observer,
            _callback: callback,
        })
    }
}

impl Drop for MutationWatch {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

#[derive(Default)]
struct ElementRegistry {
    ids: ElementIdAllocator,
    elements: HashMap<ElementId, Element>,
}

impl ElementRegistry {
    fn tagged(&self, element: &Element) -> Option<ElementId> {
        let raw = Reflect::get(element, &JsValue::from_str(ID_PROP)).ok()?;
        let id = ElementId(raw.as_f64()? as u32);
        match self.elements.get(&id) {
            Some(known) if known == element => Some(id),
            _ => None,
        }
    }

    fn lookup(&self, element: &Element) -> Option<ElementId> {
        self.tagged(element).or_else(|| {
            self.elements
                .iter()
                .find(|(_, e)| *e == element)
                .map(|(id, _)| *id)
        })
    }

    fn intern(&mut self, element: &Element) -> ElementId {
        if let Some(id) = self.lookup(element) {
            return id;
        }
        let id = self.ids.alloc();
        if Reflect::set(element, &JsValue::from_str(ID_PROP), &JsValue::from(id.0)).is_err() {
            warn!("could not tag {id}; falling back to identity scans");
        }
        self.elements.insert(id, element.clone());
        id
    }

    fn forget(&mut self, id: ElementId) {
        if let Some(el) = self.elements.remove(&id) {
            let _ = Reflect::delete_property(&el, &JsValue::from_str(ID_PROP));
        }
    }
}

/// Host capabilities backed by the live document.
#[derive(Default)]
pub struct DomHost {
    registry: Rc<RefCell<ElementRegistry>>,
}

impl DomHost {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Handle for `element`, allocating one on first sight.
    pub fn intern(&self, element: &Element) -> ElementId {
        self.registry.borrow_mut().intern(element)
    }

    pub fn lookup(&self, element: &Element) -> Option<ElementId> {
        self.registry.borrow().lookup(element)
    }

    pub fn element(&self, id: ElementId) -> Option<Element> {
        self.registry.borrow().elements.get(&id).cloned()
    }

    /// Drop every handle not in `live`.
    pub fn retain(&self, live: &[ElementId]) {
        let mut reg = self.registry.borrow_mut();
        let stale: Vec<ElementId> = reg
            .elements
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();
        for id in stale {
            reg.forget(id);
        }
    }

    /// Bound elements that are `root` or one of its descendants.
    pub fn bound_within(&self, root: &Element) -> Vec<ElementId> {
        self.registry
            .borrow()
            .elements
            .iter()
            .filter(|(_, el)| {
                let node: &Node = el;
                root.contains(Some(node))
            })
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct DomWatcher {
    observer: IntersectionObserver,
    registry: Rc<RefCell<ElementRegistry>>,
    // Dropped after the observer is disconnected.
    _callback: Closure<dyn FnMut(Array)>,
}

impl DomWatcher {
    fn target(&self, id: ElementId) -> Option<Element> {
        self.registry.borrow().elements.get(&id).cloned()
    }
}

impl VisibilityWatcher for DomWatcher {
    fn observe(&mut self, element: ElementId) {
        if let Some(el) = self.target(element) {
            self.observer.observe(&el);
        }
    }

    fn unobserve(&mut self, element: ElementId) {
        if let Some(el) = self.target(element) {
            self.observer.unobserve(&el);
        }
    }

    fn disconnect(&mut self) {
        self.observer.disconnect();
    }
}

impl Drop for DomWatcher {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

impl WatcherFactory for DomHost {
    fn create(
        &self,
        thresholds: &[f32],
        callback: WatchCallback,
    ) -> Result<Box<dyn VisibilityWatcher>, HostError> {
        let registry = self.registry.clone();
        let closure = Closure::<dyn FnMut(Array)>::new(move |entries: Array| {
            let batch: Vec<VisibilityEntry> = entries
                .iter()
                .filter_map(|v| v.dyn_into::<IntersectionObserverEntry>().ok())
                .filter_map(|e| {
                    let id = registry.borrow().lookup(&e.target())?;
                    Some(VisibilityEntry::new(
                        id,
                        e.intersection_ratio() as f32,
                        e.is_intersecting(),
                    ))
                })
                .collect();
            if !batch.is_empty() {
                callback(&batch);
            }
        });

        let list = Array::new();
        for t in thresholds {
            list.push(&JsValue::from_f64(f64::from(*t)));
        }
        let init = IntersectionObserverInit::new();
        init.set_threshold(&list);
        let observer =
            IntersectionObserver::new_with_options(closure.as_ref().unchecked_ref(), &init)
                .map_err(|e| HostError::new(format!("IntersectionObserver: {}", js_message(&e))))?;

        Ok(Box::new(DomWatcher {
            observer,
            registry: self.registry.clone(),
            _callback: closure,
        }))
    }
}

impl SelectorMatcher for DomHost {
    fn matches(&self, element: ElementId, selector: &str) -> bool {
        let Some(el) = self.element(element) else {
            return false;
        };
        el.matches(selector).unwrap_or_else(|e| {
            warn!("selector '{selector}' rejected: {}", js_message(&e));
            false
        })
    }
}

impl ClassEffects for DomHost {
    fn add_class(&self, element: ElementId, class: &str) {
        if let Some(el) = self.element(element) {
            if let Err(e) = el.class_list().add_1(class) {
                warn!("classList.add('{class}') failed: {}", js_message(&e));
            }
        }
    }

    fn remove_class(&self, element: ElementId, class: &str) {
        if let Some(el) = self.element(element) {
            if let Err(e) = el.class_list().remove_1(class) {
                warn!("classList.remove('{class}') failed: {}", js_message(&e));
            }
        }
    }
}
