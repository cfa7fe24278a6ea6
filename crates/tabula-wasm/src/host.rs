//! Bridging JS functions into core callbacks and the host update cycle

use std::cell::RefCell;

use serde_json::Value;
use tabula_core::{Callbacks, Error, HostScheduler, Key};
use tabula_indexeddb::convert::{key_to_js, value_to_js};
use tracing::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

thread_local! {
    /// Host-provided `apply(fn)` wrapping each callback in its update cycle
    static APPLY: RefCell<Option<js_sys::Function>> = const { RefCell::new(None) };
}

pub(crate) fn set_apply(apply: Option<js_sys::Function>) {
    APPLY.with(|slot| *slot.borrow_mut() = apply);
}

/// Runs callbacks through the registered `apply` function, or immediately
/// when the host never registered one.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsScheduler;

impl HostScheduler for JsScheduler {
    fn apply(&self, task: Box<dyn FnOnce()>) {
        let apply = APPLY.with(|slot| slot.borrow().clone());
        match apply {
            Some(apply) => {
                let task = Closure::once_into_js(move || task());
                if let Err(e) = apply.call1(&JsValue::NULL, &task) {
                    warn!("host apply threw: {:?}", e);
                }
            }
            None => task(),
        }
    }
}

/// Map a core error onto a JS `Error` whose `name` identifies the kind.
pub fn error_to_js(err: &Error) -> JsValue {
    let name = match err {
        Error::Schema(_) => "SchemaError",
        Error::Config(_) => "ConfigError",
        Error::Connection(_) => "ConnectionError",
        Error::Argument(_) => "ArgumentError",
        Error::CallbackType(_) => "TypeError",
        Error::Operation(_) => "OperationError",
        Error::Serialization(_) => "SerializationError",
    };
    let message = match err {
        Error::Schema(m)
        | Error::Config(m)
        | Error::Connection(m)
        | Error::Argument(m)
        | Error::CallbackType(m) => m.clone(),
        other => other.to_string(),
    };
    let js = js_sys::Error::new(&message);
    js.set_name(name);
    js.into()
}

pub(crate) fn to_js(err: Error) -> JsValue {
    error_to_js(&err)
}

/// Accept `undefined`/`null` as "no callback"; anything else must be callable.
pub(crate) fn optional_function(val: &JsValue, which: &str) -> Result<Option<js_sys::Function>, Error> {
    if val.is_undefined() || val.is_null() {
        return Ok(None);
    }
    val.dyn_ref::<js_sys::Function>()
        .cloned()
        .map(Some)
        .ok_or_else(|| Error::CallbackType(format!("{} callback must be a type of function", which)))
}

fn invoke(f: &js_sys::Function, args: &[JsValue]) {
    let result = match args {
        [] => f.call0(&JsValue::NULL),
        [a] => f.call1(&JsValue::NULL, a),
        [a, b] => f.call2(&JsValue::NULL, a, b),
        _ => f.apply(&JsValue::NULL, &args.iter().collect::<js_sys::Array>()),
    };
    if let Err(e) = result {
        warn!("callback threw: {:?}", e);
    }
}

fn record_to_js(record: &Value) -> JsValue {
    value_to_js(record).unwrap_or_else(|e| {
        warn!("record conversion failed: {}", e);
        JsValue::UNDEFINED
    })
}

/// Validated pair of JS callbacks for one operation.
pub(crate) struct JsCallbacks {
    success: Option<js_sys::Function>,
    error: Option<js_sys::Function>,
}

impl JsCallbacks {
    /// Check both callbacks independently.
    pub(crate) fn parse(success: &JsValue, error: &JsValue) -> Result<Self, Error> {
        Ok(Self {
            success: optional_function(success, "Success")?,
            error: optional_function(error, "Error")?,
        })
    }

    fn build<T: 'static>(self, on_success: impl FnOnce(&js_sys::Function, T) + 'static) -> Callbacks<T> {
        let mut callbacks = Callbacks::new();
        if let Some(f) = self.success {
            callbacks = callbacks.on_success(move |value| on_success(&f, value));
        }
        if let Some(f) = self.error {
            callbacks = callbacks.on_error(move |err| invoke(&f, &[error_to_js(&err)]));
        }
        callbacks
    }

    /// Success receives the stored record.
    pub(crate) fn record(self) -> Callbacks<Value> {
        self.build(|f, record: Value| invoke(f, &[record_to_js(&record)]))
    }

    /// Success receives the record (or `null`) and the key that was looked up.
    pub(crate) fn lookup(self) -> Callbacks<(Option<Value>, Key)> {
        self.build(|f, (record, key): (Option<Value>, Key)| {
            let record = record.as_ref().map_or(JsValue::NULL, record_to_js);
            invoke(f, &[record, key_to_js(&key)]);
        })
    }

    /// Success receives an array of records.
    pub(crate) fn records(self) -> Callbacks<Vec<Value>> {
        self.build(|f, records: Vec<Value>| {
            let array: js_sys::Array = records.iter().map(record_to_js).collect();
            invoke(f, &[array.into()]);
        })
    }

    /// Success receives the stored key.
    pub(crate) fn key(self) -> Callbacks<Key> {
        self.build(|f, key: Key| invoke(f, &[key_to_js(&key)]))
    }

    /// Success receives no arguments.
    pub(crate) fn unit(self) -> Callbacks<()> {
        self.build(|f, _: ()| invoke(f, &[]))
    }
}
