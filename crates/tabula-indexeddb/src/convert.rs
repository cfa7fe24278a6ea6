//! JS <-> Rust conversion for records, keys and key ranges

use serde_json::Value;
use tabula_core::{Key, KeyRange};
use wasm_bindgen::JsValue;
use web_sys::IdbKeyRange;

use crate::error::{IndexedDbError, Result};

/// Convert a JSON record into a structured-clonable JS value.
pub fn value_to_js(value: &Value) -> Result<JsValue> {
    let text = serde_json::to_string(value)?;
    js_sys::JSON::parse(&text).map_err(|e| IndexedDbError::from_js("JSON.parse", &e))
}

/// Convert a JS value read from the store back into JSON.
///
/// `undefined` and `null` (the store's "no record") become `None`.
pub fn js_to_value(val: &JsValue) -> Result<Option<Value>> {
    if val.is_undefined() || val.is_null() {
        return Ok(None);
    }
    let text: String = js_sys::JSON::stringify(val)
        .map_err(|e| IndexedDbError::from_js("JSON.stringify", &e))?
        .into();
    Ok(Some(serde_json::from_str(&text)?))
}

pub fn key_to_js(key: &Key) -> JsValue {
    match key {
        Key::Number(n) => JsValue::from_f64(*n),
        Key::String(s) => JsValue::from_str(s),
        Key::Array(items) => items
            .iter()
            .map(key_to_js)
            .collect::<js_sys::Array>()
            .into(),
    }
}

/// Read a key returned by `add`/`put`.
pub fn js_to_key(val: &JsValue) -> Result<Key> {
    if let Some(n) = val.as_f64() {
        return Ok(Key::Number(n));
    }
    if let Some(s) = val.as_string() {
        return Ok(Key::String(s));
    }
    if js_sys::Array::is_array(val) {
        let array = js_sys::Array::from(val);
        let mut items = Vec::with_capacity(array.length() as usize);
        for item in array.iter() {
            items.push(js_to_key(&item)?);
        }
        return Ok(Key::Array(items));
    }
    Err(IndexedDbError::JsValue(format!(
        "unsupported key type: {:?}",
        val
    )))
}

/// Build the native key range for `range`.
pub fn key_range_to_js(range: &KeyRange) -> Result<IdbKeyRange> {
    let built = match (&range.lower, &range.upper) {
        (Some(lower), Some(upper)) if lower == upper && !range.lower_open && !range.upper_open => {
            IdbKeyRange::only(&key_to_js(lower))
        }
        (Some(lower), Some(upper)) => IdbKeyRange::bound_with_lower_open_and_upper_open(
            &key_to_js(lower),
            &key_to_js(upper),
            range.lower_open,
            range.upper_open,
        ),
        (Some(lower), None) => IdbKeyRange::lower_bound_with_open(&key_to_js(lower), range.lower_open),
        (None, Some(upper)) => IdbKeyRange::upper_bound_with_open(&key_to_js(upper), range.upper_open),
        (None, None) => {
            return Err(IndexedDbError::JsValue(
                "key range without lower or upper bound".into(),
            ))
        }
    };
    built.map_err(|e| IndexedDbError::from_js("key range", &e))
}
