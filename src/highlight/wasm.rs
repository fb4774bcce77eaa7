//! Stateless WASM bindings for the matcher and compositor

use wasm_bindgen::prelude::*;

use crate::config::EngineConfig;
use crate::highlight::{composite, TextMatcher};
use crate::model::{Annotation, Document, Match};
use crate::to_js;

/// Search a document without a review engine.
///
/// # Arguments
/// * `document` - `{ id, text, annotations }`
/// * `config` - optional `EngineConfig` object (`null` for defaults)
#[wasm_bindgen(js_name = findMatches)]
pub fn find_matches_js(document: JsValue, query_text: &str, caret_offset: usize, config: JsValue) -> Result<JsValue, JsValue> {
    let document: Document = serde_wasm_bindgen::from_value(document)
        .map_err(|e| JsValue::from_str(&format!("Invalid document: {}", e)))?;
    let config: EngineConfig = if config.is_null() || config.is_undefined() {
        EngineConfig::default()
    } else {
        serde_wasm_bindgen::from_value(config)
            .map_err(|e| JsValue::from_str(&format!("Invalid config: {}", e)))?
    };

    let result = TextMatcher::new(&config)
        .find_matches(&document, query_text, caret_offset)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    to_js(&result)
}

/// Render sequence for `text` with the given annotations and matches overlaid
#[wasm_bindgen(js_name = compositeSegments)]
pub fn composite_js(text: &str, annotations: JsValue, matches: JsValue, include_annotations: bool) -> Result<JsValue, JsValue> {
    let annotations: Vec<Annotation> = if annotations.is_null() || annotations.is_undefined() {
        Vec::new()
    } else {
        serde_wasm_bindgen::from_value(annotations)
            .map_err(|e| JsValue::from_str(&format!("Invalid annotations: {}", e)))?
    };
    let matches: Vec<Match> = if matches.is_null() || matches.is_undefined() {
        Vec::new()
    } else {
        serde_wasm_bindgen::from_value(matches)
            .map_err(|e| JsValue::from_str(&format!("Invalid matches: {}", e)))?
    };

    let segments = composite(text, &annotations, &matches, include_annotations);
    to_js(&segments)
}
