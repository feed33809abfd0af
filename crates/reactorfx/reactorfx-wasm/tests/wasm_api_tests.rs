#![cfg(target_arch = "wasm32")]
use js_sys::{Array, Function, Promise, Reflect};
use serde::Serialize;
use serde_json::json;
use serde_wasm_bindgen as swb;
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_test::*;
use web_sys::Element;

use reactorfx_wasm::{abi_version, bootstrap, ReactorFx};

wasm_bindgen_test_configure!(run_in_browser);

fn js(value: serde_json::Value) -> JsValue {
    value
        .serialize(&swb::Serializer::json_compatible())
        .unwrap()
}

fn card_strategy() -> JsValue {
    js(json!({
        "name": "cards",
        "selector": ".card",
        "mainClass": "rfx",
        "activeClass": "rfx-in",
        "threshold": [0.5]
    }))
}

fn attach(classes: &str) -> Element {
    let document = web_sys::window().unwrap().document().unwrap();
    let el = document.create_element("div").unwrap();
    el.set_class_name(classes);
    document.body().unwrap().append_child(&el).unwrap();
    el
}

fn list(el: &Element) -> JsValue {
    Array::of1(el).into()
}

fn detached(tag: &str, classes: &str) -> Element {
    let document = web_sys::window().unwrap().document().unwrap();
    let el = document.create_element(tag).unwrap();
    el.set_class_name(classes);
    el
}

/// Wait one macrotask so pending observer callbacks have run.
async fn next_tick() {
    let promise = Promise::new(&mut |resolve, _| {
        web_sys::window()
            .unwrap()
            .set_timeout_with_callback(&resolve)
            .unwrap();
    });
    JsFuture::from(promise).await.unwrap();
}

#[wasm_bindgen_test]
fn abi_is_1() {
    assert_eq!(abi_version(), 1);
}

#[wasm_bindgen_test]
fn construct_with_defaults() {
    let fx = ReactorFx::new(JsValue::UNDEFINED, JsValue::UNDEFINED).unwrap();
    assert_eq!(fx.observer_count(), 0);
    assert!(!fx.is_destroyed());
}

#[wasm_bindgen_test]
fn add_strategy_and_list() {
    let mut fx = ReactorFx::new(JsValue::NULL, JsValue::NULL).unwrap();
    let id = fx.add_strategy(card_strategy()).unwrap();
    let listed = Array::from(&fx.get_strategies().unwrap());
    assert_eq!(listed.length(), 1);
    let first = listed.get(0);
    let got_id = Reflect::get(&first, &JsValue::from_str("id")).unwrap();
    assert_eq!(got_id.as_f64(), Some(f64::from(id)));
    let main = Reflect::get(&first, &JsValue::from_str("mainClass")).unwrap();
    assert_eq!(main.as_string().as_deref(), Some("rfx"));
    assert_eq!(fx.observer_count(), 1);
}

#[wasm_bindgen_test]
fn invalid_strategy_is_rejected() {
    let mut fx = ReactorFx::new(JsValue::NULL, JsValue::NULL).unwrap();
    let bad = js(json!({
        "selector": ".x",
        "mainClass": "m",
        "threshold": [2.0]
    }));
    assert!(fx.add_strategy(bad).is_err());
    assert_eq!(fx.observer_count(), 0);
}

#[wasm_bindgen_test]
fn binding_applies_and_strips_main_class() {
    let mut fx = ReactorFx::new(JsValue::NULL, JsValue::NULL).unwrap();
    fx.add_strategy(card_strategy()).unwrap();
    let card = attach("card");
    let plain = attach("plain");

    assert_eq!(fx.add_elements(list(&card), JsValue::UNDEFINED).unwrap(), 1);
    assert_eq!(fx.add_elements(list(&plain), JsValue::UNDEFINED).unwrap(), 0);
    assert!(card.class_list().contains("rfx"));
    assert!(!plain.class_list().contains("rfx"));
    assert_eq!(fx.element_count(), 1);

    assert_eq!(
        fx.remove_elements(list(&card), JsValue::UNDEFINED).unwrap(),
        1
    );
    assert!(!card.class_list().contains("rfx"));
    assert_eq!(fx.element_count(), 0);
    card.remove();
    plain.remove();
}

#[wasm_bindgen_test]
fn scan_binds_matching_elements() {
    let mut fx = ReactorFx::new(JsValue::NULL, JsValue::NULL).unwrap();
    fx.add_strategy(card_strategy()).unwrap();
    let a = attach("card");
    let b = attach("card wide");

    assert_eq!(fx.scan(JsValue::UNDEFINED).unwrap(), 2);
    assert_eq!(fx.scan(JsValue::UNDEFINED).unwrap(), 0);
    assert!(a.class_list().contains("rfx"));
    assert!(b.class_list().contains("rfx"));

    fx.pause(JsValue::UNDEFINED).unwrap();
    fx.resume(JsValue::UNDEFINED).unwrap();
    fx.restart(JsValue::UNDEFINED).unwrap();

    fx.destroy().unwrap();
    fx.destroy().unwrap();
    assert!(fx.is_destroyed());
    assert!(!a.class_list().contains("rfx"));
    assert!(fx.add_strategy(card_strategy()).is_err());
    a.remove();
    b.remove();
}

#[wasm_bindgen_test]
fn update_strategy_swaps_main_class() {
    let mut fx = ReactorFx::new(JsValue::NULL, JsValue::NULL).unwrap();
    let id = fx.add_strategy(card_strategy()).unwrap();
    let card = attach("card");
    fx.add_elements(list(&card), JsValue::UNDEFINED).unwrap();

    let patch = js(json!({ "mainClass": "fx" }));
    fx.update_strategy(id, patch).unwrap();
    assert!(card.class_list().contains("fx"));
    assert!(!card.class_list().contains("rfx"));
    fx.destroy().unwrap();
    card.remove();
}

#[wasm_bindgen_test]
fn non_function_hook_is_rejected() {
    let mut fx = ReactorFx::new(JsValue::NULL, JsValue::NULL).unwrap();
    let strategy = card_strategy();
    Reflect::set(&strategy, &JsValue::from_str("onEnter"), &JsValue::from(3)).unwrap();
    assert!(fx.add_strategy(strategy).is_err());
}

#[wasm_bindgen_test]
async fn bootstrap_awaits_loader() {
    let loader = Function::new_with_args(
        "config",
        "return Promise.resolve([{ selector: '.boot', mainClass: config.paths.animations.length ? 'b' : 'x', threshold: [0.25, 0.5] }]);",
    );
    let fx = bootstrap(loader, JsValue::UNDEFINED, JsValue::UNDEFINED)
        .await
        .unwrap();
    let listed = Array::from(&fx.get_strategies().unwrap());
    assert_eq!(listed.length(), 1);
    assert_eq!(fx.observer_count(), 1);
}

#[wasm_bindgen_test]
async fn bootstrap_surfaces_loader_rejection() {
    let loader = Function::new_no_args("return Promise.reject(new Error('offline'));");
    let result = bootstrap(loader, JsValue::UNDEFINED, JsValue::UNDEFINED).await;
    assert!(result.is_err());
}

#[wasm_bindgen_test]
async fn watched_subtree_binds_inserted_and_unbinds_removed() {
    let mut fx = ReactorFx::new(JsValue::NULL, JsValue::NULL).unwrap();
    fx.add_strategy(card_strategy()).unwrap();
    let root = attach("feed");
    fx.watch_mutations(root.clone().into()).unwrap();
    assert!(fx.is_watching_mutations());

    let wrapper = detached("section", "");
    let card = detached("div", "card");
    wrapper.append_child(&card).unwrap();
    root.append_child(&wrapper).unwrap();
    root.append_child(&detached("div", "plain")).unwrap();
    next_tick().await;
    assert!(card.class_list().contains("rfx"));
    assert_eq!(fx.element_count(), 1);

    wrapper.remove();
    next_tick().await;
    assert_eq!(fx.element_count(), 0);
    assert!(!card.class_list().contains("rfx"));

    fx.unwatch_mutations();
    let late = detached("div", "card");
    root.append_child(&late).unwrap();
    next_tick().await;
    assert!(!late.class_list().contains("rfx"));
    fx.destroy().unwrap();
    root.remove();
}

#[wasm_bindgen_test]
async fn destroy_ends_the_mutation_watch() {
    let mut fx = ReactorFx::new(JsValue::NULL, JsValue::NULL).unwrap();
    fx.add_strategy(card_strategy()).unwrap();
    let root = attach("feed");
    fx.watch_mutations(root.clone().into()).unwrap();
    fx.destroy().unwrap();
    assert!(!fx.is_watching_mutations());
    assert!(fx.watch_mutations(JsValue::UNDEFINED).is_err());

    let card = detached("div", "card");
    root.append_child(&card).unwrap();
    next_tick().await;
    assert!(!card.class_list().contains("rfx"));
    root.remove();
}
