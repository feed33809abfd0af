use std::rc::Rc;

use async_trait::async_trait;
use js_sys::{Function, Promise};
use serde_wasm_bindgen as swb;
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;

use reactorfx_core::{AnimationStrategy, RuntimeConfig, SourceError, StrategySource};

use crate::convert::strategies_from_js;
use crate::dom::{js_message, DomHost};

/// Strategy source backed by a JS loader `(config) => Strategy[] | Promise<Strategy[]>`.
pub struct JsStrategySource {
    loader: Function,
    dom: Rc<DomHost>,
}

impl JsStrategySource {
    pub fn new(loader: Function, dom: Rc<DomHost>) -> Self {
        Self { loader, dom }
    }
}

#[async_trait(?Send)]
impl StrategySource for JsStrategySource {
    async fn load(&self, config: &RuntimeConfig) -> Result<Vec<AnimationStrategy>, SourceError> {
        let arg = swb::to_value(config).map_err(|e| SourceError::Load(e.to_string()))?;
        let returned = self
            .loader
            .call1(&JsValue::UNDEFINED, &arg)
            .map_err(|e| SourceError::Load(js_message(&e)))?;
        let value = JsFuture::from(Promise::resolve(&returned))
            .await
            .map_err(|e| SourceError::Load(js_message(&e)))?;
        strategies_from_js(value, &self.dom).map_err(SourceError::Load)
    }
}
