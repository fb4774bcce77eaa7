//! WASM bindings for the document list

use wasm_bindgen::prelude::*;

use crate::model::{human_file_size, Library, LibrarySort};
use crate::to_js;

/// Sort a document list for the library table.
///
/// # Arguments
/// * `documents` - array of `{ id, filename, state, file_size?, datetime_created? }`
/// * `key` - `"state"`, `"filename"` or `"created"`
#[wasm_bindgen(js_name = sortLibrary)]
pub fn sort_library(documents: JsValue, key: JsValue, descending: bool) -> Result<JsValue, JsValue> {
    let mut library = Library::new(
        serde_wasm_bindgen::from_value(documents)
            .map_err(|e| JsValue::from_str(&format!("Invalid documents: {}", e)))?,
    );
    let key: LibrarySort = serde_wasm_bindgen::from_value(key)
        .map_err(|e| JsValue::from_str(&format!("Invalid sort key: {}", e)))?;

    library.sort_by(key, descending);
    to_js(&library.documents)
}

/// Drop a deleted document from a list; returns the remaining documents
#[wasm_bindgen(js_name = removeFromLibrary)]
pub fn remove_from_library(documents: JsValue, id: &str) -> Result<JsValue, JsValue> {
    let mut library = Library::new(
        serde_wasm_bindgen::from_value(documents)
            .map_err(|e| JsValue::from_str(&format!("Invalid documents: {}", e)))?,
    );
    library.remove(id);
    to_js(&library.documents)
}

/// "1.5kB"-style size label
#[wasm_bindgen(js_name = humanFileSize)]
pub fn human_file_size_js(size_in_bytes: f64) -> String {
    human_file_size(size_in_bytes.max(0.0) as u64)
}
