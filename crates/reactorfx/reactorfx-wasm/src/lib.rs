//! ReactorFX wasm adapter.
//!
//! Binds [`reactorfx_core::RuntimeNexus`] to the browser: elements are real DOM
//! nodes, watchers are `IntersectionObserver`s and effects go through `classList`.

use std::cell::{RefCell, RefMut};
use std::rc::Rc;

use js_sys::Function;
use log::warn;
use serde_wasm_bindgen as swb;
use wasm_bindgen::prelude::*;
use web_sys::Element;

use reactorfx_core::{Host, NexusConfig, RuntimeConfig, RuntimeNexus, StrategyId};

mod convert;
pub mod dom;
pub mod source;

use convert::{
    elements_from_js, jsvalue_is_undefined_or_null, patch_from_js, scope_from_js,
    strategies_from_js, strategies_to_js, strategy_from_js, strategy_ids_from_js,
};
use dom::{DomHost, MutationWatch};
use source::JsStrategySource;

fn init_runtime() {
    console_error_panic_hook::set_once();
    // Already installed when a second instance is created.
    let _ = console_log::init_with_level(log::Level::Warn);
}

fn nexus_config(config: JsValue) -> Result<NexusConfig, JsError> {
    if jsvalue_is_undefined_or_null(&config) {
        Ok(NexusConfig::default())
    } else {
        swb::from_value(config).map_err(|e| JsError::new(&format!("config error: {e}")))
    }
}

fn js_err(e: impl std::fmt::Display) -> JsError {
    JsError::new(&e.to_string())
}

#[wasm_bindgen]
pub struct ReactorFx {
    nexus: Rc<RefCell<RuntimeNexus>>,
    dom: Rc<DomHost>,
    mutations: Option<MutationWatch>,
}

/// Release handles for elements no longer bound to any strategy.
fn prune(dom: &DomHost, nexus: &RuntimeNexus) {
    dom.retain(&nexus.elements());
}

/// Bind what an added subtree brings in, then unbind bound elements inside
/// subtrees that left the document. Moved nodes stay bound.
fn apply_mutations(
    nexus: &mut RuntimeNexus,
    dom: &DomHost,
    added: &[Element],
    removed: &[Element],
) -> Result<(), String> {
    for (id, strategy) in nexus.get_strategies() {
        let mut found = Vec::new();
        for root in added.iter().filter(|el| el.is_connected()) {
            if root.matches(&strategy.selector).unwrap_or(false) {
                found.push(dom.intern(root));
            }
            for el in dom::query_all(root.as_ref(), &strategy.selector)? {
                found.push(dom.intern(&el));
            }
        }
        if !found.is_empty() {
            nexus
                .add_elements(&found, Some(&[id][..]))
                .map_err(|e| e.to_string())?;
        }
    }
    let gone: Vec<_> = removed
        .iter()
        .filter(|el| !el.is_connected())
        .flat_map(|el| dom.bound_within(el))
        .collect();
    if !gone.is_empty() {
        nexus.remove_elements(&gone, None).map_err(|e| e.to_string())?;
    }
    Ok(())
}

impl ReactorFx {
    fn from_parts(nexus: RuntimeNexus, dom: Rc<DomHost>) -> Self {
        Self {
            nexus: Rc::new(RefCell::new(nexus)),
            dom,
            mutations: None,
        }
    }

    fn elements(&self, value: &JsValue) -> Result<Vec<Element>, JsError> {
        elements_from_js(value).map_err(|e| JsError::new(&e))
    }

    /// A hook fired while DOM mutations are being applied may call back in.
    fn nexus(&self) -> Result<RefMut<'_, RuntimeNexus>, JsError> {
        self.nexus
            .try_borrow_mut()
            .map_err(|_| JsError::new("reactorfx is busy applying a DOM mutation batch"))
    }
}

#[wasm_bindgen]
impl ReactorFx {
    /// Create a nexus from an array of strategies (or `{ strategies }`) and an
    /// optional engine config `{ threshold_precision, strip_classes_on_unbind }`.
    #[wasm_bindgen(constructor)]
    pub fn new(strategies: JsValue, config: JsValue) -> Result<ReactorFx, JsError> {
        init_runtime();
        let cfg = nexus_config(config)?;
        let dom = DomHost::new();
        let strategies = strategies_from_js(strategies, &dom).map_err(|e| JsError::new(&e))?;
        let nexus = RuntimeNexus::new(strategies, Host::from_shared(dom.clone()), cfg)
            .map_err(js_err)?;
        Ok(ReactorFx::from_parts(nexus, dom))
    }

    /// Register a strategy and return its id.
    #[wasm_bindgen(js_name = addStrategy)]
    pub fn add_strategy(&mut self, strategy: JsValue) -> Result<u32, JsError> {
        let strategy = strategy_from_js(strategy, &self.dom).map_err(|e| JsError::new(&e))?;
        let id = self.nexus()?.add_strategy(strategy).map_err(js_err)?;
        Ok(id.0)
    }

    #[wasm_bindgen(js_name = removeStrategy)]
    pub fn remove_strategy(&mut self, id: u32) -> Result<(), JsError> {
        let mut nexus = self.nexus()?;
        nexus.remove_strategy(StrategyId(id)).map_err(js_err)?;
        prune(&self.dom, &nexus);
        Ok(())
    }

    /// Apply a partial update; `onEnter: null` clears a hook.
    #[wasm_bindgen(js_name = updateStrategy)]
    pub fn update_strategy(&mut self, id: u32, patch: JsValue) -> Result<(), JsError> {
        let patch = patch_from_js(patch, &self.dom).map_err(|e| JsError::new(&e))?;
        let mut nexus = self.nexus()?;
        nexus
            .update_strategy(StrategyId(id), patch)
            .map_err(js_err)?;
        prune(&self.dom, &nexus);
        Ok(())
    }

    /// Registered strategies as plain objects with their `id`.
    #[wasm_bindgen(js_name = getStrategies)]
    pub fn get_strategies(&self) -> Result<JsValue, JsError> {
        let strategies = self.nexus()?.get_strategies();
        strategies_to_js(&strategies).map_err(|e| JsError::new(&e))
    }

    /// Bind elements to every matching strategy, or to `ids` when given.
    /// Returns the number of new bindings.
    #[wasm_bindgen(js_name = addElements)]
    pub fn add_elements(&mut self, elements: JsValue, ids: JsValue) -> Result<u32, JsError> {
        let targets = strategy_ids_from_js(&ids).map_err(|e| JsError::new(&e))?;
        let handles: Vec<_> = self
            .elements(&elements)?
            .iter()
            .map(|el| self.dom.intern(el))
            .collect();
        let mut nexus = self.nexus()?;
        let result = nexus.add_elements(&handles, targets.as_deref());
        prune(&self.dom, &nexus);
        Ok(result.map_err(js_err)? as u32)
    }

    /// Query `root` (default: the document) for every strategy selector and bind
    /// what it finds. Returns the number of new bindings.
    #[wasm_bindgen]
    pub fn scan(&mut self, root: JsValue) -> Result<u32, JsError> {
        let mut nexus = self.nexus()?;
        let mut added = 0;
        for (id, strategy) in nexus.get_strategies() {
            let found = dom::query_all(&root, &strategy.selector).map_err(|e| JsError::new(&e))?;
            let handles: Vec<_> = found.iter().map(|el| self.dom.intern(el)).collect();
            added += nexus
                .add_elements(&handles, Some(&[id][..]))
                .map_err(js_err)?;
        }
        prune(&self.dom, &nexus);
        Ok(added as u32)
    }

    /// Keep bindings in step with the DOM under `root` (default: the document):
    /// inserted elements matching a selector are bound and removed ones are
    /// unbound. Replaces any previous watch.
    #[wasm_bindgen(js_name = watchMutations)]
    pub fn watch_mutations(&mut self, root: JsValue) -> Result<(), JsError> {
        if self.nexus()?.is_destroyed() {
            return Err(js_err(reactorfx_core::NexusError::Terminal));
        }
        let target = dom::mutation_root(&root).map_err(|e| JsError::new(&e))?;
        let nexus = Rc::downgrade(&self.nexus);
        let host = self.dom.clone();
        let watch = MutationWatch::new(&target, move |added, removed| {
            let Some(nexus) = nexus.upgrade() else {
                return;
            };
            let Ok(mut nexus) = nexus.try_borrow_mut() else {
                warn!("nexus busy, dropping a DOM mutation batch");
                return;
            };
            if nexus.is_destroyed() {
                return;
            }
            if let Err(e) = apply_mutations(&mut nexus, &host, &added, &removed) {
                warn!("DOM mutation batch not applied: {e}");
            }
            prune(&host, &nexus);
        })
        .map_err(|e| JsError::new(&e))?;
        self.mutations = Some(watch);
        Ok(())
    }

    /// Stop following DOM mutations. Existing bindings are kept.
    #[wasm_bindgen(js_name = unwatchMutations)]
    pub fn unwatch_mutations(&mut self) {
        self.mutations = None;
    }

    /// Unbind elements from `ids` (all of their strategies when omitted).
    #[wasm_bindgen(js_name = removeElements)]
    pub fn remove_elements(&mut self, elements: JsValue, ids: JsValue) -> Result<u32, JsError> {
        let targets = strategy_ids_from_js(&ids).map_err(|e| JsError::new(&e))?;
        let handles = self
            .elements(&elements)?
            .iter()
            .map(|el| {
                self.dom
                    .lookup(el)
                    .ok_or_else(|| JsError::new("element is not bound to any strategy"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut nexus = self.nexus()?;
        let removed = nexus
            .remove_elements(&handles, targets.as_deref())
            .map_err(js_err)?;
        prune(&self.dom, &nexus);
        Ok(removed as u32)
    }

    #[wasm_bindgen]
    pub fn pause(&mut self, scope: JsValue) -> Result<(), JsError> {
        let scope = scope_from_js(&scope, &self.dom).map_err(|e| JsError::new(&e))?;
        self.nexus()?.pause(&scope).map_err(js_err)
    }

    #[wasm_bindgen]
    pub fn resume(&mut self, scope: JsValue) -> Result<(), JsError> {
        let scope = scope_from_js(&scope, &self.dom).map_err(|e| JsError::new(&e))?;
        self.nexus()?.resume(&scope).map_err(js_err)
    }

    #[wasm_bindgen]
    pub fn restart(&mut self, scope: JsValue) -> Result<(), JsError> {
        let scope = scope_from_js(&scope, &self.dom).map_err(|e| JsError::new(&e))?;
        self.nexus()?.restart(&scope).map_err(js_err)
    }

    /// Disconnect every observer and strip applied classes. Safe to call twice.
    #[wasm_bindgen]
    pub fn destroy(&mut self) -> Result<(), JsError> {
        self.mutations = None;
        let mut nexus = self.nexus()?;
        nexus.destroy();
        prune(&self.dom, &nexus);
        Ok(())
    }

    #[wasm_bindgen(getter, js_name = isDestroyed)]
    pub fn is_destroyed(&self) -> bool {
        self.nexus.try_borrow().map_or(false, |n| n.is_destroyed())
    }

    /// Number of live observers (one per distinct threshold set).
    #[wasm_bindgen(getter, js_name = observerCount)]
    pub fn observer_count(&self) -> u32 {
        self.nexus.try_borrow().map_or(0, |n| n.sentinel_count() as u32)
    }

    /// Number of elements currently bound.
    #[wasm_bindgen(getter, js_name = elementCount)]
    pub fn element_count(&self) -> u32 {
        self.dom.len() as u32
    }

    /// Whether a `watchMutations` observer is active.
    #[wasm_bindgen(getter, js_name = isWatchingMutations)]
    pub fn is_watching_mutations(&self) -> bool {
        self.mutations.is_some()
    }
}

/// Await `loader(runtimeConfig)` once and build a [`ReactorFx`] from its strategies.
#[wasm_bindgen]
pub async fn bootstrap(
    loader: Function,
    runtime_config: JsValue,
    config: JsValue,
) -> Result<ReactorFx, JsError> {
    init_runtime();
    let runtime: RuntimeConfig = if jsvalue_is_undefined_or_null(&runtime_config) {
        RuntimeConfig::default()
    } else {
        swb::from_value(runtime_config)
            .map_err(|e| JsError::new(&format!("runtime config error: {e}")))?
    };
    if !runtime.is_valid() {
        return Err(JsError::new("runtime config has no animations path"));
    }
    let cfg = nexus_config(config)?;
    let dom = DomHost::new();
    let source = JsStrategySource::new(loader, dom.clone());
    let nexus = RuntimeNexus::bootstrap(&source, &runtime, Host::from_shared(dom.clone()), cfg)
        .await
        .map_err(js_err)?;
    Ok(ReactorFx::from_parts(nexus, dom))
}

/// Numeric ABI version for compatibility checks at init.
#[wasm_bindgen]
pub fn abi_version() -> u32 {
    1
}
