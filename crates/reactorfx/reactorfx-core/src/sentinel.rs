//! Sentinel: one visibility watcher multiplexed across many elements.
//!
//! The sentinel owns its watcher and the set of observed elements. Every batch
//! the watcher delivers is classified per element (visible or not against the
//! smallest threshold) and forwarded to exactly one of the enter/exit handlers,
//! unless the classification is unchanged since the last report.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use hashbrown::HashMap;
use log::{debug, warn};

use crate::error::HostError;
use crate::host::{VisibilityEntry, VisibilityWatcher, WatchCallback, WatcherFactory};
use crate::ids::ElementId;
use crate::threshold::ThresholdSignature;

/// Handler invoked for an enter or exit transition.
pub(crate) type EntryHandler = Rc<dyn Fn(&VisibilityEntry)>;

fn noop_handler() -> EntryHandler {
    Rc::new(|_: &VisibilityEntry| {})
}

struct SentinelState {
    signature: ThresholdSignature,
    watcher: Option<Box<dyn VisibilityWatcher>>,
    /// Bumped whenever the watcher is torn down; batches from older watchers are dropped.
    generation: u64,
    observed: BTreeSet<ElementId>,
    last_visible: HashMap<ElementId, bool>,
    on_enter: EntryHandler,
    on_exit: EntryHandler,
}

pub(crate) struct Sentinel {
    state: Rc<RefCell<SentinelState>>,
    factory: Rc<dyn WatcherFactory>,
}

impl Sentinel {
    /// Build a sentinel and its watcher. Handlers start as no-ops; compose real
    /// ones with [`Sentinel::set_on_enter`] / [`Sentinel::set_on_exit`].
    pub fn new(
        signature: ThresholdSignature,
        factory: Rc<dyn WatcherFactory>,
    ) -> Result<Self, HostError> {
        let state = Rc::new(RefCell::new(SentinelState {
            signature,
            watcher: None,
            generation: 0,
            observed: BTreeSet::new(),
            last_visible: HashMap::new(),
            on_enter: noop_handler(),
            on_exit: noop_handler(),
        }));
        let sentinel = Self { state, factory };
        let watcher = {
            let st = sentinel.state.borrow();
            sentinel.build_watcher(&st.signature, st.generation)?
        };
        sentinel.state.borrow_mut().watcher = Some(watcher);
        Ok(sentinel)
    }

    /// Create a watcher for `signature` whose batches are tagged with
    /// `generation`, already observing every element in the observed set.
    fn build_watcher(
        &self,
        signature: &ThresholdSignature,
        generation: u64,
    ) -> Result<Box<dyn VisibilityWatcher>, HostError> {
        let weak = Rc::downgrade(&self.state);
        let callback: WatchCallback =
            Rc::new(move |entries: &[VisibilityEntry]| deliver(&weak, generation, entries));
        let mut watcher = self.factory.create(&signature.values(), callback)?;
        for el in &self.state.borrow().observed {
            watcher.observe(*el);
        }
        Ok(watcher)
    }

    /// Start watching `elements`; already observed elements are ignored.
    pub fn observe(&self, elements: impl IntoIterator<Item = ElementId>) {
        let mut st = self.state.borrow_mut();
        let st = &mut *st;
        for el in elements {
            if st.observed.insert(el) {
                if let Some(w) = st.watcher.as_mut() {
                    w.observe(el);
                }
            }
        }
    }

    /// Stop watching `elements`; elements not observed are ignored.
    pub fn unobserve(&self, elements: impl IntoIterator<Item = ElementId>) {
        let mut st = self.state.borrow_mut();
        let st = &mut *st;
        for el in elements {
            if st.observed.remove(&el) {
                st.last_visible.remove(&el);
                if let Some(w) = st.watcher.as_mut() {
                    w.unobserve(el);
                }
            }
        }
    }

    /// Re-observe an element so the watcher reports its current geometry again.
    pub fn refresh(&self, element: ElementId) {
        if self.is_observing(element) {
            self.unobserve([element]);
            self.observe([element]);
        }
    }

    /// Replace the threshold set. A new watcher is built and handed every
    /// observed element before the old one is torn down; if the host refuses
    /// the new watcher the sentinel keeps its current threshold and watcher.
    pub fn set_threshold(&self, signature: ThresholdSignature) -> Result<(), HostError> {
        let generation = self.state.borrow().generation.wrapping_add(1);
        let watcher = self.build_watcher(&signature, generation)?;

        let mut st = self.state.borrow_mut();
        if let Some(mut old) = st.watcher.replace(watcher) {
            old.disconnect();
        }
        st.generation = generation;
        st.last_visible.clear();
        debug!(
            "sentinel threshold {} -> {} ({} elements)",
            st.signature,
            signature,
            st.observed.len()
        );
        st.signature = signature;
        Ok(())
    }

    /// Wrap the enter handler: `transform` receives the previous handler.
    pub fn set_on_enter(&self, transform: impl FnOnce(EntryHandler) -> EntryHandler) {
        let mut st = self.state.borrow_mut();
        let prev = st.on_enter.clone();
        st.on_enter = transform(prev);
    }

    /// Wrap the exit handler: `transform` receives the previous handler.
    pub fn set_on_exit(&self, transform: impl FnOnce(EntryHandler) -> EntryHandler) {
        let mut st = self.state.borrow_mut();
        let prev = st.on_exit.clone();
        st.on_exit = transform(prev);
    }

    pub fn threshold(&self) -> ThresholdSignature {
        self.state.borrow().signature.clone()
    }

    pub fn is_observing(&self, element: ElementId) -> bool {
        self.state.borrow().observed.contains(&element)
    }

    #[cfg(test)]
    pub fn observed(&self) -> Vec<ElementId> {
        self.state.borrow().observed.iter().copied().collect()
    }

    /// Last classification reported for `element`, if any since it was observed.
    pub fn last_visibility(&self, element: ElementId) -> Option<bool> {
        self.state.borrow().last_visible.get(&element).copied()
    }

    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        self.state.borrow().watcher.is_some()
    }

    /// Tear down the watcher and forget every observed element.
    pub fn disconnect(&self) {
        let mut st = self.state.borrow_mut();
        if let Some(mut w) = st.watcher.take() {
            w.disconnect();
        }
        st.generation = st.generation.wrapping_add(1);
        st.observed.clear();
        st.last_visible.clear();
    }
}

impl Drop for Sentinel {
    fn drop(&mut self) {
        if let Ok(mut st) = self.state.try_borrow_mut() {
            if let Some(mut w) = st.watcher.take() {
                w.disconnect();
            }
        }
    }
}

fn deliver(weak: &Weak<RefCell<SentinelState>>, generation: u64, entries: &[VisibilityEntry]) {
    let Some(state) = weak.upgrade() else {
        return;
    };
    for entry in entries {
        // Re-check per entry: a handler may have unobserved later elements.
        let handler = {
            let Ok(mut st) = state.try_borrow_mut() else {
                warn!("sentinel busy, dropping notification for {}", entry.element);
                continue;
            };
            if st.generation != generation {
                debug!("dropping batch from a torn-down watcher");
                return;
            }
            if !st.observed.contains(&entry.element) {
                continue;
            }
            let visible = entry.is_visible(st.signature.min());
            if st.last_visible.insert(entry.element, visible) == Some(visible) {
                continue;
            }
            if visible {
                st.on_enter.clone()
            } else {
                st.on_exit.clone()
            }
        };
        handler(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Recorded {
        thresholds: Vec<f32>,
        callback: Option<WatchCallback>,
        observed: BTreeSet<ElementId>,
        connected: bool,
    }

    #[derive(Default)]
    struct FakeFactory {
        watchers: RefCell<Vec<Rc<RefCell<Recorded>>>>,
        refuse: Cell<bool>,
    }

    struct FakeWatcher(Rc<RefCell<Recorded>>);

    impl VisibilityWatcher for FakeWatcher {
        fn observe(&mut self, element: ElementId) {
            self.0.borrow_mut().observed.insert(element);
        }
        fn unobserve(&mut self, element: ElementId) {
            self.0.borrow_mut().observed.remove(&element);
        }
        fn disconnect(&mut self) {
            let mut r = self.0.borrow_mut();
            r.connected = false;
            r.observed.clear();
        }
    }

    impl WatcherFactory for FakeFactory {
        fn create(
            &self,
            thresholds: &[f32],
            callback: WatchCallback,
        ) -> Result<Box<dyn VisibilityWatcher>, HostError> {
            if self.refuse.get() {
                return Err(HostError::new("refused"));
            }
            let rec = Rc::new(RefCell::new(Recorded {
                thresholds: thresholds.to_vec(),
                callback: Some(callback),
                observed: BTreeSet::new(),
                connected: true,
            }));
            self.watchers.borrow_mut().push(rec.clone());
            Ok(Box::new(FakeWatcher(rec)))
        }
    }

    impl FakeFactory {
        fn latest(&self) -> Rc<RefCell<Recorded>> {
            self.watchers.borrow().last().cloned().unwrap()
        }

        fn emit(&self, watcher: &Rc<RefCell<Recorded>>, entries: &[(u32, f32)]) {
            let batch: Vec<VisibilityEntry> = entries
                .iter()
                .map(|(id, ratio)| VisibilityEntry::new(ElementId(*id), *ratio, *ratio > 0.0))
                .collect();
            let cb = watcher.borrow().callback.clone().unwrap();
            cb(&batch);
        }
    }

    fn counting(sentinel: &Sentinel) -> (Rc<RefCell<Vec<u32>>>, Rc<RefCell<Vec<u32>>>) {
        let enters = Rc::new(RefCell::new(Vec::new()));
        let exits = Rc::new(RefCell::new(Vec::new()));
        let e = enters.clone();
        sentinel.set_on_enter(move |_| {
            Rc::new(move |entry: &VisibilityEntry| e.borrow_mut().push(entry.element.0))
        });
        let x = exits.clone();
        sentinel.set_on_exit(move |_| {
            Rc::new(move |entry: &VisibilityEntry| x.borrow_mut().push(entry.element.0))
        });
        (enters, exits)
    }

    fn sig(values: &[f32]) -> ThresholdSignature {
        ThresholdSignature::new(values, 4)
    }

    #[test]
    fn observe_is_idempotent() {
        let factory = Rc::new(FakeFactory::default());
        let s = Sentinel::new(sig(&[0.5]), factory.clone()).unwrap();
        s.observe([ElementId(1), ElementId(1), ElementId(2)]);
        s.observe([ElementId(2)]);
        assert_eq!(s.observed(), vec![ElementId(1), ElementId(2)]);
        assert_eq!(factory.latest().borrow().observed.len(), 2);

        s.unobserve([ElementId(9), ElementId(1)]);
        assert_eq!(s.observed(), vec![ElementId(2)]);
    }

    #[test]
    fn dispatches_only_on_classification_change() {
        let factory = Rc::new(FakeFactory::default());
        let s = Sentinel::new(sig(&[0.5]), factory.clone()).unwrap();
        let (enters, exits) = counting(&s);
        s.observe([ElementId(1)]);
        let w = factory.latest();

        factory.emit(&w, &[(1, 0.6)]);
        factory.emit(&w, &[(1, 0.6)]);
        factory.emit(&w, &[(1, 0.7)]);
        assert_eq!(*enters.borrow(), vec![1]);
        factory.emit(&w, &[(1, 0.1)]);
        factory.emit(&w, &[(1, 0.1)]);
        assert_eq!(*exits.borrow(), vec![1]);
    }

    #[test]
    fn unobserved_elements_are_ignored() {
        let factory = Rc::new(FakeFactory::default());
        let s = Sentinel::new(sig(&[0.5]), factory.clone()).unwrap();
        let (enters, _) = counting(&s);
        s.observe([ElementId(1)]);
        let w = factory.latest();
        s.unobserve([ElementId(1)]);
        factory.emit(&w, &[(1, 0.9)]);
        assert!(enters.borrow().is_empty());
    }

    #[test]
    fn set_threshold_keeps_every_element() {
        let factory = Rc::new(FakeFactory::default());
        let s = Sentinel::new(sig(&[0.5]), factory.clone()).unwrap();
        let (enters, _) = counting(&s);
        s.observe([ElementId(1), ElementId(2), ElementId(3)]);
        let old = factory.latest();
        factory.emit(&old, &[(1, 0.6)]);

        s.set_threshold(sig(&[0.2])).unwrap();
        let new = factory.latest();
        assert!(!old.borrow().connected);
        assert_eq!(new.borrow().thresholds, vec![0.2]);
        assert_eq!(new.borrow().observed.len(), 3);
        assert_eq!(s.threshold(), sig(&[0.2]));

        // Stale watcher is muted; the new one reports fresh state for all three.
        factory.emit(&old, &[(2, 0.9)]);
        factory.emit(&new, &[(1, 0.3), (2, 0.3), (3, 0.3)]);
        assert_eq!(*enters.borrow(), vec![1, 1, 2, 3]);
    }

    #[test]
    fn refused_threshold_change_keeps_current_watcher() {
        let factory = Rc::new(FakeFactory::default());
        let s = Sentinel::new(sig(&[0.5]), factory.clone()).unwrap();
        let (enters, _) = counting(&s);
        s.observe([ElementId(1), ElementId(2)]);
        let current = factory.latest();

        factory.refuse.set(true);
        assert!(s.set_threshold(sig(&[0.2])).is_err());
        assert_eq!(factory.watchers.borrow().len(), 1);
        assert!(current.borrow().connected);
        assert_eq!(current.borrow().observed.len(), 2);
        assert_eq!(s.threshold(), sig(&[0.5]));
        assert_eq!(s.observed(), vec![ElementId(1), ElementId(2)]);

        // Still delivering against the old threshold.
        factory.emit(&current, &[(1, 0.3), (2, 0.6)]);
        assert_eq!(*enters.borrow(), vec![2]);
    }

    #[test]
    fn handlers_compose_with_previous() {
        let factory = Rc::new(FakeFactory::default());
        let s = Sentinel::new(sig(&[0.0]), factory.clone()).unwrap();
        let hits = Rc::new(Cell::new(0));
        let h1 = hits.clone();
        s.set_on_enter(move |_| Rc::new(move |_: &VisibilityEntry| h1.set(h1.get() + 1)));
        let h2 = hits.clone();
        s.set_on_enter(move |prev| {
            Rc::new(move |entry: &VisibilityEntry| {
                prev(entry);
                h2.set(h2.get() + 10);
            })
        });
        s.observe([ElementId(4)]);
        factory.emit(&factory.latest(), &[(4, 0.2)]);
        assert_eq!(hits.get(), 11);
    }

    #[test]
    fn disconnect_tears_down_watcher() {
        let factory = Rc::new(FakeFactory::default());
        let s = Sentinel::new(sig(&[0.5]), factory.clone()).unwrap();
        let (enters, _) = counting(&s);
        s.observe([ElementId(1)]);
        let w = factory.latest();
        s.disconnect();
        assert!(!s.is_connected());
        assert!(s.observed().is_empty());
        assert!(!w.borrow().connected);
        factory.emit(&w, &[(1, 1.0)]);
        assert!(enters.borrow().is_empty());
    }
}
