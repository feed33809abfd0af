//! RuntimeNexus: strategy registry, sentinel pool and element bindings.
//!
//! Strategies with identical threshold signatures share one [`Sentinel`]. Each
//! element x strategy pair is a binding that is either observed or paused; a
//! sentinel watches an element exactly while at least one non-paused binding on
//! that sentinel holds it.
//!
//! Methods:
//! - registry: add_strategy(s), remove_strategy(s), update_strategy, get_strategies
//! - elements: add_elements, remove_elements
//! - lifecycle: pause, resume, restart, destroy

use std::cell::{RefCell, RefMut};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

use hashbrown::HashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::{NexusConfig, RuntimeConfig};
use crate::error::{BootstrapError, NexusError, Result};
use crate::host::{ClassEffects, Host, VisibilityEntry};
use crate::ids::{ElementId, IdAllocator, SentinelId, StrategyId};
use crate::scope::Scope;
use crate::sentinel::Sentinel;
use crate::source::StrategySource;
use crate::strategy::{AnimationStrategy, ElementHook, StrategyPatch};
use crate::threshold::ThresholdSignature;

/// Observable state of one element x strategy binding.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingState {
    Observed,
    Paused,
}

#[derive(Copy, Clone, Debug, Default)]
struct Binding {
    paused: bool,
    entered: bool,
}

struct StrategyEntry {
    strategy: AnimationStrategy,
    sentinel: SentinelId,
}

struct SentinelSlot {
    sentinel: Sentinel,
    strategies: BTreeSet<StrategyId>,
}

/// Effect collected while the state is borrowed and applied once it is released.
struct Dispatch {
    element: ElementId,
    enter: bool,
    active_class: String,
    hook: Option<ElementHook>,
}

/// How an updated strategy ends up backed after a threshold check.
enum Rebind {
    Keep,
    /// The sole owner's sentinel took the new threshold in place.
    Rekeyed,
    Move(SentinelId),
}

fn run(pending: Vec<Dispatch>, effects: &dyn ClassEffects) {
    for d in pending {
        if !d.active_class.is_empty() {
            if d.enter {
                effects.add_class(d.element, &d.active_class);
            } else {
                effects.remove_class(d.element, &d.active_class);
            }
        }
        if let Some(hook) = d.hook {
            hook(d.element);
        }
    }
}

struct NexusState {
    cfg: NexusConfig,
    ids: IdAllocator,
    strategies: BTreeMap<StrategyId, StrategyEntry>,
    slots: HashMap<SentinelId, SentinelSlot>,
    by_signature: HashMap<ThresholdSignature, SentinelId>,
    elements: BTreeMap<ElementId, BTreeMap<StrategyId, Binding>>,
    destroyed: bool,
}

impl NexusState {
    fn new(cfg: NexusConfig) -> Self {
        Self {
            cfg,
            ids: IdAllocator::new(),
            strategies: BTreeMap::new(),
            slots: HashMap::new(),
            by_signature: HashMap::new(),
            elements: BTreeMap::new(),
            destroyed: false,
        }
    }

    fn signature(&self, strategy: &AnimationStrategy) -> ThresholdSignature {
        ThresholdSignature::new(&strategy.thresholds, self.cfg.threshold_precision)
    }

    fn check_strategies(&self, ids: &[StrategyId]) -> Result<()> {
        match ids.iter().find(|id| !self.strategies.contains_key(*id)) {
            Some(id) => Err(NexusError::UnknownStrategy(*id)),
            None => Ok(()),
        }
    }

    fn check_elements(&self, ids: &[ElementId]) -> Result<()> {
        match ids.iter().find(|id| !self.elements.contains_key(*id)) {
            Some(id) => Err(NexusError::UnknownElement(*id)),
            None => Ok(()),
        }
    }

    fn ensure_sentinel(
        &mut self,
        signature: ThresholdSignature,
        host: &Host,
        weak: &Weak<RefCell<NexusState>>,
    ) -> Result<SentinelId> {
        if let Some(id) = self.by_signature.get(&signature) {
            return Ok(*id);
        }
        let sentinel = Sentinel::new(signature.clone(), host.watchers.clone())?;
        let id = self.ids.alloc_sentinel();
        install_router(&sentinel, id, weak.clone(), host.effects.clone());
        debug!("sentinel {:?} created for {}", id, signature);
        self.by_signature.insert(signature, id);
        self.slots.insert(
            id,
            SentinelSlot {
                sentinel,
                strategies: BTreeSet::new(),
            },
        );
        Ok(id)
    }

    fn release_if_idle(&mut self, id: SentinelId) {
        let idle = self
            .slots
            .get(&id)
            .is_some_and(|slot| slot.strategies.is_empty());
        if !idle {
            return;
        }
        if let Some(slot) = self.slots.remove(&id) {
            slot.sentinel.disconnect();
            debug!("sentinel {:?} {} released", id, slot.sentinel.threshold());
        }
        self.by_signature.retain(|_, v| *v != id);
    }

    fn add_one(
        &mut self,
        strategy: AnimationStrategy,
        host: &Host,
        weak: &Weak<RefCell<NexusState>>,
    ) -> Result<StrategyId> {
        let signature = self.signature(&strategy);
        let sentinel = self.ensure_sentinel(signature, host, weak)?;
        let id = self.ids.alloc_strategy();
        if let Some(slot) = self.slots.get_mut(&sentinel) {
            slot.strategies.insert(id);
        }
        debug!("{id} added ({})", strategy.selector);
        self.strategies
            .insert(id, StrategyEntry { strategy, sentinel });
        Ok(id)
    }

    /// Whether any non-paused binding on `sentinel` holds `element`.
    fn wants(&self, sentinel: SentinelId, element: ElementId) -> bool {
        let (Some(slot), Some(bindings)) = (self.slots.get(&sentinel), self.elements.get(&element))
        else {
            return false;
        };
        slot.strategies
            .iter()
            .any(|sid| bindings.get(sid).is_some_and(|b| !b.paused))
    }

    /// Bring the sentinel's membership for `element` in line with its bindings.
    fn sync(&self, sentinel: SentinelId, element: ElementId) {
        if let Some(slot) = self.slots.get(&sentinel) {
            if self.wants(sentinel, element) {
                slot.sentinel.observe([element]);
            } else {
                slot.sentinel.unobserve([element]);
            }
        }
    }

    /// Collect enter/exit effects for the active bindings of `element` on `sentinel`,
    /// optionally restricted to `only`.
    fn collect(
        &mut self,
        sentinel: SentinelId,
        element: ElementId,
        enter: bool,
        only: Option<&[StrategyId]>,
    ) -> Vec<Dispatch> {
        let mut out = Vec::new();
        let (Some(slot), Some(bindings)) =
            (self.slots.get(&sentinel), self.elements.get_mut(&element))
        else {
            return out;
        };
        for sid in &slot.strategies {
            if only.is_some_and(|o| !o.contains(sid)) {
                continue;
            }
            let (Some(binding), Some(entry)) = (bindings.get_mut(sid), self.strategies.get(sid))
            else {
                continue;
            };
            let s = &entry.strategy;
            if binding.paused || (s.once && binding.entered) {
                continue;
            }
            if enter {
                binding.entered = true;
            }
            out.push(Dispatch {
                element,
                enter,
                active_class: s.active_class.clone(),
                hook: if enter {
                    s.on_enter.clone()
                } else {
                    s.on_exit.clone()
                },
            });
        }
        out
    }

    /// A binding of `strategy` just became active. Either start observing the element
    /// (the watcher reports fresh geometry) or replay what the sentinel already knows.
    fn activate(
        &mut self,
        sentinel: SentinelId,
        element: ElementId,
        strategy: StrategyId,
    ) -> Vec<Dispatch> {
        let Some(slot) = self.slots.get(&sentinel) else {
            return Vec::new();
        };
        if !slot.sentinel.is_observing(element) {
            slot.sentinel.observe([element]);
            return Vec::new();
        }
        match slot.sentinel.last_visibility(element) {
            Some(visible) => self.collect(
                sentinel,
                element,
                visible,
                Some(std::slice::from_ref(&strategy)),
            ),
            None => Vec::new(),
        }
    }

    fn strip(&self, element: ElementId, strategy: &AnimationStrategy, effects: &dyn ClassEffects) {
        if !self.cfg.strip_classes_on_unbind {
            return;
        }
        if !strategy.active_class.is_empty() {
            effects.remove_class(element, &strategy.active_class);
        }
        effects.remove_class(element, &strategy.main_class);
    }

    /// Drop one binding and clean up the element entry when it was the last one.
    fn unbind(&mut self, element: ElementId, strategy: StrategyId, effects: &dyn ClassEffects) {
        let removed = self
            .elements
            .get_mut(&element)
            .and_then(|b| b.remove(&strategy))
            .is_some();
        if !removed {
            return;
        }
        if self.elements.get(&element).is_some_and(|b| b.is_empty()) {
            self.elements.remove(&element);
        }
        if let Some(entry) = self.strategies.get(&strategy) {
            self.strip(element, &entry.strategy, effects);
            self.sync(entry.sentinel, element);
        }
    }

    fn bound_elements(&self, strategy: StrategyId) -> Vec<ElementId> {
        self.elements
            .iter()
            .filter(|(_, b)| b.contains_key(&strategy))
            .map(|(el, _)| *el)
            .collect()
    }

    fn detach(&mut self, id: StrategyId, effects: &dyn ClassEffects) {
        for el in self.bound_elements(id) {
            self.unbind(el, id, effects);
        }
        if let Some(entry) = self.strategies.remove(&id) {
            if let Some(slot) = self.slots.get_mut(&entry.sentinel) {
                slot.strategies.remove(&id);
            }
            self.release_if_idle(entry.sentinel);
            debug!("{id} removed");
        }
    }

    fn scoped(&self, scope: &Scope) -> Result<Vec<(ElementId, StrategyId)>> {
        if let Some(ids) = &scope.strategies {
            self.check_strategies(ids)?;
        }
        if let Some(ids) = &scope.elements {
            self.check_elements(ids)?;
        }
        Ok(self
            .elements
            .iter()
            .flat_map(|(el, b)| b.keys().map(move |sid| (*el, *sid)))
            .filter(|(el, sid)| scope.contains(*el, *sid))
            .collect())
    }

    fn sentinel_of(&self, strategy: StrategyId) -> Option<SentinelId> {
        self.strategies.get(&strategy).map(|e| e.sentinel)
    }
}

fn install_router(
    sentinel: &Sentinel,
    id: SentinelId,
    state: Weak<RefCell<NexusState>>,
    effects: Rc<dyn ClassEffects>,
) {
    let (w, fx) = (state.clone(), effects.clone());
    sentinel.set_on_enter(move |prev| {
        Rc::new(move |entry: &VisibilityEntry| {
            prev(entry);
            route(&w, fx.as_ref(), id, entry.element, true);
        })
    });
    sentinel.set_on_exit(move |prev| {
        Rc::new(move |entry: &VisibilityEntry| {
            prev(entry);
            route(&state, effects.as_ref(), id, entry.element, false);
        })
    });
}

fn route(
    state: &Weak<RefCell<NexusState>>,
    effects: &dyn ClassEffects,
    sentinel: SentinelId,
    element: ElementId,
    enter: bool,
) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let pending = match state.try_borrow_mut() {
        Ok(mut st) if !st.destroyed => st.collect(sentinel, element, enter, None),
        Ok(_) => return,
        Err(_) => {
            warn!("notification for {element} arrived during a registry mutation; dropped");
            return;
        }
    };
    run(pending, effects);
}

/// Coordinator owning every strategy, sentinel and element binding.
pub struct RuntimeNexus {
    state: Rc<RefCell<NexusState>>,
    host: Host,
}

impl RuntimeNexus {
    /// Create a nexus seeded with `strategies`. Fails without side effects if any
    /// strategy is malformed.
    pub fn new(strategies: Vec<AnimationStrategy>, host: Host, cfg: NexusConfig) -> Result<Self> {
        let mut nexus = Self {
            state: Rc::new(RefCell::new(NexusState::new(cfg))),
            host,
        };
        nexus.add_strategies(strategies)?;
        Ok(nexus)
    }

    /// Await `source` once and build a nexus from what it returns.
    pub async fn bootstrap<S>(
        source: &S,
        runtime: &RuntimeConfig,
        host: Host,
        cfg: NexusConfig,
    ) -> std::result::Result<Self, BootstrapError>
    where
        S: StrategySource + ?Sized,
    {
        let strategies = source.load(runtime).await?;
        debug!("strategy source returned {} strategies", strategies.len());
        Ok(Self::new(strategies, host, cfg)?)
    }

    fn live(&self) -> Result<RefMut<'_, NexusState>> {
        let st = self.state.borrow_mut();
        if st.destroyed {
            return Err(NexusError::Terminal);
        }
        Ok(st)
    }

    // ----- registry -----

    pub fn add_strategy(&mut self, strategy: AnimationStrategy) -> Result<StrategyId> {
        let mut ids = self.add_strategies(vec![strategy])?;
        ids.pop().ok_or(NexusError::Terminal)
    }

    /// Validate every strategy, then register them all; nothing is registered if
    /// any one of them is invalid.
    pub fn add_strategies(
        &mut self,
        strategies: Vec<AnimationStrategy>,
    ) -> Result<Vec<StrategyId>> {
        let weak = Rc::downgrade(&self.state);
        let mut st = self.live()?;
        for s in &strategies {
            s.validate()?;
        }
        let mut added = Vec::with_capacity(strategies.len());
        for s in strategies {
            match st.add_one(s, &self.host, &weak) {
                Ok(id) => added.push(id),
                Err(e) => {
                    for id in added {
                        st.detach(id, self.host.effects.as_ref());
                    }
                    return Err(e);
                }
            }
        }
        Ok(added)
    }

    pub fn remove_strategy(&mut self, id: StrategyId) -> Result<()> {
        self.remove_strategies(&[id])
    }

    /// Detach strategies. A sentinel left without strategies is disconnected.
    pub fn remove_strategies(&mut self, ids: &[StrategyId]) -> Result<()> {
        let mut st = self.live()?;
        st.check_strategies(ids)?;
        for id in ids {
            st.detach(*id, self.host.effects.as_ref());
        }
        Ok(())
    }

    /// Apply a partial update. Changed thresholds move the strategy to the sentinel
    /// for its new signature without losing any bound element; a changed selector
    /// drops bindings for elements that no longer match.
    pub fn update_strategy(&mut self, id: StrategyId, patch: StrategyPatch) -> Result<()> {
        let weak = Rc::downgrade(&self.state);
        let mut st = self.live()?;
        let (old, old_sentinel) = match st.strategies.get(&id) {
            Some(entry) => (entry.strategy.clone(), entry.sentinel),
            None => return Err(NexusError::UnknownStrategy(id)),
        };
        let next = old.patched(patch);
        next.validate()?;
        let new_sig = st.signature(&next);
        let effects = self.host.effects.clone();

        // Settle the backing sentinel first; nothing after this point can fail.
        let old_sig = st
            .slots
            .get(&old_sentinel)
            .map(|slot| slot.sentinel.threshold());
        let rebind = if old_sig.as_ref() == Some(&new_sig) {
            Rebind::Keep
        } else if st
            .slots
            .get(&old_sentinel)
            .is_some_and(|slot| slot.strategies.len() == 1)
            && !st.by_signature.contains_key(&new_sig)
        {
            if let Some(slot) = st.slots.get(&old_sentinel) {
                slot.sentinel.set_threshold(new_sig.clone())?;
            }
            if let Some(sig) = old_sig {
                st.by_signature.remove(&sig);
            }
            st.by_signature.insert(new_sig, old_sentinel);
            Rebind::Rekeyed
        } else {
            Rebind::Move(st.ensure_sentinel(new_sig, &self.host, &weak)?)
        };

        let mut kept = Vec::new();
        for el in st.bound_elements(id) {
            if next.selector != old.selector && !self.host.matcher.matches(el, &next.selector) {
                st.unbind(el, id, effects.as_ref());
            } else {
                kept.push(el);
            }
        }
        for el in &kept {
            if next.main_class != old.main_class {
                effects.remove_class(*el, &old.main_class);
                effects.add_class(*el, &next.main_class);
            }
            if next.active_class != old.active_class {
                if !old.active_class.is_empty() {
                    effects.remove_class(*el, &old.active_class);
                }
                // A once binding that already entered never dispatches again.
                let settled = next.once
                    && st
                        .elements
                        .get(el)
                        .and_then(|b| b.get(&id))
                        .is_some_and(|b| b.entered);
                if settled && !next.active_class.is_empty() {
                    effects.add_class(*el, &next.active_class);
                }
            }
        }
        if let Some(entry) = st.strategies.get_mut(&id) {
            entry.strategy = next.clone();
        }

        let mut pending = Vec::new();
        match rebind {
            Rebind::Move(target) => {
                if let Some(slot) = st.slots.get_mut(&old_sentinel) {
                    slot.strategies.remove(&id);
                }
                if let Some(slot) = st.slots.get_mut(&target) {
                    slot.strategies.insert(id);
                }
                if let Some(entry) = st.strategies.get_mut(&id) {
                    entry.sentinel = target;
                }
                for el in &kept {
                    st.sync(old_sentinel, *el);
                    let active = st
                        .elements
                        .get(el)
                        .and_then(|b| b.get(&id))
                        .is_some_and(|b| !b.paused);
                    if active {
                        pending.extend(st.activate(target, *el, id));
                    }
                }
                st.release_if_idle(old_sentinel);
            }
            Rebind::Keep if next.active_class != old.active_class || next.once != old.once => {
                for el in &kept {
                    pending.extend(st.activate(old_sentinel, *el, id));
                }
            }
            Rebind::Keep | Rebind::Rekeyed => {}
        }
        debug!("{id} updated");
        drop(st);
        run(pending, effects.as_ref());
        Ok(())
    }

    /// Snapshot of the registered strategies in registration order.
    pub fn get_strategies(&self) -> Vec<(StrategyId, AnimationStrategy)> {
        self.state
            .borrow()
            .strategies
            .iter()
            .map(|(id, e)| (*id, e.strategy.clone()))
            .collect()
    }

    pub fn get_strategy(&self, id: StrategyId) -> Option<AnimationStrategy> {
        self.state
            .borrow()
            .strategies
            .get(&id)
            .map(|e| e.strategy.clone())
    }

    /// Look a strategy up by its `name`.
    pub fn strategy_id(&self, name: &str) -> Option<StrategyId> {
        self.state
            .borrow()
            .strategies
            .iter()
            .find(|(_, e)| e.strategy.name.as_deref() == Some(name))
            .map(|(id, _)| *id)
    }

    // ----- elements -----

    /// Bind `elements` to `strategy_ids`, or to every strategy whose selector
    /// matches when `None`. Returns the number of new bindings.
    pub fn add_elements(
        &mut self,
        elements: &[ElementId],
        strategy_ids: Option<&[StrategyId]>,
    ) -> Result<usize> {
        let mut st = self.live()?;
        let (targets, explicit) = match strategy_ids {
            Some(ids) => {
                st.check_strategies(ids)?;
                (ids.to_vec(), true)
            }
            None => (st.strategies.keys().copied().collect::<Vec<_>>(), false),
        };
        let mut pending = Vec::new();
        let mut added = 0;
        for &el in elements {
            for &sid in &targets {
                let Some(entry) = st.strategies.get(&sid) else {
                    continue;
                };
                if st.elements.get(&el).is_some_and(|b| b.contains_key(&sid)) {
                    continue;
                }
                if !explicit && !self.host.matcher.matches(el, &entry.strategy.selector) {
                    continue;
                }
                let sentinel = entry.sentinel;
                self.host.effects.add_class(el, &entry.strategy.main_class);
                st.elements
                    .entry(el)
                    .or_default()
                    .insert(sid, Binding::default());
                pending.extend(st.activate(sentinel, el, sid));
                added += 1;
            }
        }
        debug!("bound {added} element/strategy pairs");
        drop(st);
        run(pending, self.host.effects.as_ref());
        Ok(added)
    }

    /// Unbind `elements` from `strategy_ids` (all of their strategies when `None`).
    /// Returns the number of bindings removed.
    pub fn remove_elements(
        &mut self,
        elements: &[ElementId],
        strategy_ids: Option<&[StrategyId]>,
    ) -> Result<usize> {
        let mut st = self.live()?;
        st.check_elements(elements)?;
        if let Some(ids) = strategy_ids {
            st.check_strategies(ids)?;
        }
        let mut removed = 0;
        for &el in elements {
            let sids: Vec<StrategyId> = st
                .elements
                .get(&el)
                .map(|b| {
                    b.keys()
                        .copied()
                        .filter(|sid| strategy_ids.map_or(true, |ids| ids.contains(sid)))
                        .collect()
                })
                .unwrap_or_default();
            for sid in sids {
                st.unbind(el, sid, self.host.effects.as_ref());
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Registered element handles.
    pub fn elements(&self) -> Vec<ElementId> {
        self.state.borrow().elements.keys().copied().collect()
    }

    /// Strategies currently bound to `element`.
    pub fn strategies_for(&self, element: ElementId) -> Vec<StrategyId> {
        self.state
            .borrow()
            .elements
            .get(&element)
            .map(|b| b.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn binding_state(&self, element: ElementId, strategy: StrategyId) -> Option<BindingState> {
        self.state
            .borrow()
            .elements
            .get(&element)
            .and_then(|b| b.get(&strategy))
            .map(|b| {
                if b.paused {
                    BindingState::Paused
                } else {
                    BindingState::Observed
                }
            })
    }

    /// Elements the strategy's sentinel is watching on its behalf.
    pub fn observed_elements(&self, strategy: StrategyId) -> Vec<ElementId> {
        let st = self.state.borrow();
        let Some(slot) = st.sentinel_of(strategy).and_then(|id| st.slots.get(&id)) else {
            return Vec::new();
        };
        st.bound_elements(strategy)
            .into_iter()
            .filter(|el| {
                st.elements
                    .get(el)
                    .and_then(|b| b.get(&strategy))
                    .is_some_and(|b| !b.paused)
                    && slot.sentinel.is_observing(*el)
            })
            .collect()
    }

    // ----- lifecycle -----

    /// Stop observing the scoped bindings while remembering them.
    pub fn pause(&mut self, scope: &Scope) -> Result<()> {
        let mut st = self.live()?;
        let pairs = st.scoped(scope)?;
        let mut touched = BTreeSet::new();
        for (el, sid) in pairs {
            if let Some(b) = st.elements.get_mut(&el).and_then(|b| b.get_mut(&sid)) {
                b.paused = true;
            }
            if let Some(sentinel) = st.sentinel_of(sid) {
                touched.insert((sentinel, el));
            }
        }
        for (sentinel, el) in touched {
            st.sync(sentinel, el);
        }
        debug!("paused {scope:?}");
        Ok(())
    }

    /// Observe the scoped paused bindings again.
    pub fn resume(&mut self, scope: &Scope) -> Result<()> {
        let mut st = self.live()?;
        let pairs = st.scoped(scope)?;
        let mut pending = Vec::new();
        for (el, sid) in pairs {
            let was_paused = match st.elements.get_mut(&el).and_then(|b| b.get_mut(&sid)) {
                Some(b) if b.paused => {
                    b.paused = false;
                    true
                }
                _ => false,
            };
            if let (true, Some(sentinel)) = (was_paused, st.sentinel_of(sid)) {
                pending.extend(st.activate(sentinel, el, sid));
            }
        }
        debug!("resumed {scope:?}");
        drop(st);
        run(pending, self.host.effects.as_ref());
        Ok(())
    }

    /// Reset first-entry bookkeeping for the scoped bindings, clear their active
    /// class and have them re-observed. Paused bindings stay paused.
    pub fn restart(&mut self, scope: &Scope) -> Result<()> {
        let mut st = self.live()?;
        let pairs = st.scoped(scope)?;
        let mut groups: BTreeMap<(SentinelId, ElementId), Vec<StrategyId>> = BTreeMap::new();
        for (el, sid) in pairs {
            let active = match st.elements.get_mut(&el).and_then(|b| b.get_mut(&sid)) {
                Some(b) => {
                    b.entered = false;
                    !b.paused
                }
                None => continue,
            };
            let Some(entry) = st.strategies.get(&sid) else {
                continue;
            };
            if !entry.strategy.active_class.is_empty() {
                self.host
                    .effects
                    .remove_class(el, &entry.strategy.active_class);
            }
            if active {
                groups.entry((entry.sentinel, el)).or_default().push(sid);
            }
        }

        let mut pending = Vec::new();
        for ((sentinel, el), sids) in groups {
            let everyone_in_scope = match (st.slots.get(&sentinel), st.elements.get(&el)) {
                (Some(slot), Some(bindings)) => slot
                    .strategies
                    .iter()
                    .filter(|sid| bindings.get(*sid).is_some_and(|b| !b.paused))
                    .all(|sid| sids.contains(sid)),
                _ => continue,
            };
            let Some(slot) = st.slots.get(&sentinel) else {
                continue;
            };
            if everyone_in_scope {
                slot.sentinel.refresh(el);
            } else if let Some(visible) = slot.sentinel.last_visibility(el) {
                pending.extend(st.collect(sentinel, el, visible, Some(sids.as_slice())));
            }
        }
        debug!("restarted {scope:?}");
        drop(st);
        run(pending, self.host.effects.as_ref());
        Ok(())
    }

    /// Disconnect every sentinel and clear all state. The nexus rejects further
    /// mutations afterwards; calling this again is a no-op.
    pub fn destroy(&mut self) {
        let mut st = self.state.borrow_mut();
        if st.destroyed {
            return;
        }
        let st = &mut *st;
        for (el, bindings) in &st.elements {
            for sid in bindings.keys() {
                if let Some(entry) = st.strategies.get(sid) {
                    st.strip(*el, &entry.strategy, self.host.effects.as_ref());
                }
            }
        }
        for slot in st.slots.values() {
            slot.sentinel.disconnect();
        }
        st.slots.clear();
        st.by_signature.clear();
        st.elements.clear();
        st.strategies.clear();
        st.destroyed = true;
        debug!("nexus destroyed");
    }

    // ----- introspection -----

    pub fn is_destroyed(&self) -> bool {
        self.state.borrow().destroyed
    }

    pub fn config(&self) -> NexusConfig {
        self.state.borrow().cfg.clone()
    }

    /// Number of live sentinels (one per distinct threshold signature in use).
    pub fn sentinel_count(&self) -> usize {
        self.state.borrow().slots.len()
    }

    /// Threshold signature of the sentinel backing `strategy`.
    pub fn sentinel_signature(&self, strategy: StrategyId) -> Option<ThresholdSignature> {
        let st = self.state.borrow();
        st.sentinel_of(strategy)
            .and_then(|id| st.slots.get(&id))
            .map(|slot| slot.sentinel.threshold())
    }

    /// Whether two strategies are backed by the same sentinel instance.
    pub fn shares_sentinel(&self, a: StrategyId, b: StrategyId) -> bool {
        let st = self.state.borrow();
        match (st.sentinel_of(a), st.sentinel_of(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }
}

impl std::fmt::Debug for RuntimeNexus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.borrow();
        f.debug_struct("RuntimeNexus")
            .field("strategies", &st.strategies.len())
            .field("sentinels", &st.slots.len())
            .field("elements", &st.elements.len())
            .field("destroyed", &st.destroyed)
            .finish()
    }
}
