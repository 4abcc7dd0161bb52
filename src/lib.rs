pub mod codec;
pub mod error;
pub mod graph;
pub mod preset;
pub mod share;
pub mod tone;
pub mod web;

use crate::error::DecodeError;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the tonescape-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// Decode a shared token, or the query string of a shared link.
///
/// Accepts either a bare token or anything containing a `config=` parameter.
pub fn decode_shared(input: &str) -> Result<codec::SharedConfig, DecodeError> {
    let input = input.split_once('#').map_or(input, |(before, _)| before);
    let query = input.split_once('?').map_or(input, |(_, q)| q);
    match share::query_param(query, share::CONFIG_PARAM) {
        Some(token) => codec::decode(token),
        None => codec::decode(input),
    }
}

/// WASM-exposed: list the built-in presets (`id`, `name`, `description`).
#[wasm_bindgen]
pub fn preset_list() -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(&preset::list()).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: a preset as `{ masterVolume, tones }` with fresh tone ids.
#[wasm_bindgen]
pub fn preset_config(id: &str) -> Result<JsValue, JsValue> {
    let preset = preset::find(id).ok_or_else(|| JsValue::from_str(&format!("Unknown preset '{id}'")))?;
    serde_wasm_bindgen::to_value(&preset.to_config()).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: decode a token (or shared link) into `{ masterVolume, tones }`.
#[wasm_bindgen]
pub fn decode_config(input: &str) -> Result<JsValue, JsValue> {
    let config = decode_shared(input).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    serde_wasm_bindgen::to_value(&config).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: remove every configuration parameter from a URL.
#[wasm_bindgen]
pub fn strip_config(url: &str) -> String {
    share::strip_config(url)
}
