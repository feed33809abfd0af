//! JS value <-> core type conversions.

use std::rc::Rc;

use js_sys::{Array, Function, Reflect};
use log::warn;
use serde::Serialize;
use serde_wasm_bindgen as swb;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Element, NodeList};

use reactorfx_core::{AnimationStrategy, ElementHook, Scope, StrategyId, StrategyPatch};

use crate::dom::{js_message, node_elements, DomHost};

pub(crate) fn jsvalue_is_undefined_or_null(v: &JsValue) -> bool {
    v.is_undefined() || v.is_null()
}

fn hook(f: Function, dom: &Rc<DomHost>) -> ElementHook {
    let dom = dom.clone();
    Rc::new(move |id| {
        let Some(el) = dom.element(id) else {
            return;
        };
        if let Err(e) = f.call1(&JsValue::UNDEFINED, &el) {
            warn!("strategy hook threw for {id}: {}", js_message(&e));
        }
    })
}

/// `Some(Some(f))` for a function, `Some(None)` for an explicit null, `None` when absent.
fn hook_field(
    obj: &JsValue,
    key: &str,
    dom: &Rc<DomHost>,
) -> Result<Option<Option<ElementHook>>, String> {
    let key = JsValue::from_str(key);
    if !Reflect::has(obj, &key).unwrap_or(false) {
        return Ok(None);
    }
    let value = Reflect::get(obj, &key).map_err(|e| js_message(&e))?;
    if jsvalue_is_undefined_or_null(&value) {
        return Ok(Some(None));
    }
    match value.dyn_into::<Function>() {
        Ok(f) => Ok(Some(Some(hook(f, dom)))),
        Err(_) => Err(format!("{} must be a function", key.as_string().unwrap_or_default())),
    }
}

pub(crate) fn strategy_from_js(
    value: JsValue,
    dom: &Rc<DomHost>,
) -> Result<AnimationStrategy, String> {
    let on_enter = hook_field(&value, "onEnter", dom)?.flatten();
    let on_exit = hook_field(&value, "onExit", dom)?.flatten();
    let mut strategy: AnimationStrategy =
        swb::from_value(value).map_err(|e| format!("strategy parse error: {e}"))?;
    strategy.on_enter = on_enter;
    strategy.on_exit = on_exit;
    Ok(strategy)
}

/// Accept an array of strategies or `{ strategies: [...] }`.
pub(crate) fn strategies_from_js(
    value: JsValue,
    dom: &Rc<DomHost>,
) -> Result<Vec<AnimationStrategy>, String> {
    if jsvalue_is_undefined_or_null(&value) {
        return Ok(Vec::new());
    }
    let list = if Array::is_array(&value) {
        value
    } else {
        Reflect::get(&value, &JsValue::from_str("strategies")).map_err(|e| js_message(&e))?
    };
    if !Array::is_array(&list) {
        return Err("expected an array of strategies".into());
    }
    Array::from(&list)
        .iter()
        .map(|s| strategy_from_js(s, dom))
        .collect()
}

pub(crate) fn patch_from_js(value: JsValue, dom: &Rc<DomHost>) -> Result<StrategyPatch, String> {
    if jsvalue_is_undefined_or_null(&value) {
        return Ok(StrategyPatch::default());
    }
    let on_enter = hook_field(&value, "onEnter", dom)?;
    let on_exit = hook_field(&value, "onExit", dom)?;
    let mut patch: StrategyPatch =
        swb::from_value(value).map_err(|e| format!("patch parse error: {e}"))?;
    patch.on_enter = on_enter;
    patch.on_exit = on_exit;
    Ok(patch)
}

/// Elements from an `Element`, an array of elements or a `NodeList`.
pub(crate) fn elements_from_js(value: &JsValue) -> Result<Vec<Element>, String> {
    if let Some(el) = value.dyn_ref::<Element>() {
        return Ok(vec![el.clone()]);
    }
    if let Some(list) = value.dyn_ref::<NodeList>() {
        return Ok(node_elements(list));
    }
    if Array::is_array(value) {
        return Array::from(value)
            .iter()
            .map(|v| {
                v.dyn_into::<Element>()
                    .map_err(|_| "expected an array of elements".to_string())
            })
            .collect();
    }
    Err("expected an Element, an array of elements or a NodeList".into())
}

pub(crate) fn strategy_ids_from_js(value: &JsValue) -> Result<Option<Vec<StrategyId>>, String> {
    if jsvalue_is_undefined_or_null(value) {
        return Ok(None);
    }
    let ids: Vec<u32> =
        swb::from_value(value.clone()).map_err(|e| format!("strategy ids: {e}"))?;
    Ok(Some(ids.into_iter().map(StrategyId).collect()))
}

/// `{ strategies?: number[], elements?: Element[] }`; absent means every binding.
/// Elements the nexus has never seen are reported, not registered.
pub(crate) fn scope_from_js(value: &JsValue, dom: &DomHost) -> Result<Scope, String> {
    if jsvalue_is_undefined_or_null(value) {
        return Ok(Scope::all());
    }
    let field =
        |key: &str| Reflect::get(value, &JsValue::from_str(key)).map_err(|e| js_message(&e));
    let mut scope = Scope::all();
    scope.strategies = strategy_ids_from_js(&field("strategies")?)?;
    let elements = field("elements")?;
    if !jsvalue_is_undefined_or_null(&elements) {
        let ids = elements_from_js(&elements)?
            .iter()
            .map(|el| {
                dom.lookup(el)
                    .ok_or_else(|| "scope names an unregistered element".to_string())
            })
            .collect::<Result<Vec<_>, _>>()?;
        scope.elements = Some(ids);
    }
    Ok(scope)
}

#[derive(Serialize)]
struct StrategyView<'a> {
    id: u32,
    #[serde(flatten)]
    strategy: &'a AnimationStrategy,
}

pub(crate) fn strategies_to_js(
    list: &[(StrategyId, AnimationStrategy)],
) -> Result<JsValue, String> {
    let views: Vec<StrategyView<'_>> = list
        .iter()
        .map(|(id, strategy)| StrategyView { id: id.0, strategy })
        .collect();
    views
        .serialize(&swb::Serializer::json_compatible())
        .map_err(|e| format!("strategies serialize error: {e}"))
}
