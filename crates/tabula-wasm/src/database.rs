//! Runtime surface: the opened database and its per-table handles
//!
//! Table operations validate their arguments synchronously (callbacks first,
//! then keys, index names and bounds), then run on the browser event loop and
//! report through the optional `success` / `error` callbacks.

use std::rc::Rc;

use serde_json::Value;
use tabula_core::{BoundDescriptor, Database, Error, Key, RecordHandle};
use tabula_indexeddb::convert::{js_to_key, js_to_value, value_to_js};
use tabula_indexeddb::idb::idb_factory;
use tabula_indexeddb::IndexedDbBackend;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};
use web_sys::IdbFactory;

use crate::host::{to_js, JsCallbacks};

/// An initialized database.
#[wasm_bindgen]
pub struct JsDatabase {
    db: Rc<Database<IndexedDbBackend>>,
}

impl JsDatabase {
    pub(crate) fn new(db: Database<IndexedDbBackend>) -> Self {
        Self { db: Rc::new(db) }
    }
}

#[wasm_bindgen]
impl JsDatabase {
    #[wasm_bindgen(getter)]
    pub fn name(&self) -> String {
        self.db.name().to_string()
    }

    #[wasm_bindgen(getter)]
    pub fn version(&self) -> u32 {
        self.db.version()
    }

    /// Normalized table definitions: `[{name, fields: {other, keyPathField}}]`.
    #[wasm_bindgen(getter)]
    pub fn tables(&self) -> Result<JsValue, JsValue> {
        let json = serde_json::to_value(self.db.tables()).map_err(|e| to_js(e.into()))?;
        value_to_js(&json).map_err(|e| to_js(Error::Argument(e.to_string())))
    }

    /// Handle for a declared table, or `undefined`.
    pub fn handle(&self, table: &str) -> Option<JsTable> {
        self.db.handle(table).map(|handle| JsTable { handle })
    }

    /// Every table handle keyed by table name.
    #[wasm_bindgen(getter)]
    pub fn handles(&self) -> Result<js_sys::Object, JsValue> {
        let handles = js_sys::Object::new();
        for (name, handle) in self.db.handles() {
            js_sys::Reflect::set(&handles, &name.into(), &JsTable { handle }.into())?;
        }
        Ok(handles)
    }

    /// The browser's IndexedDB factory backing this database.
    #[wasm_bindgen(getter, js_name = storeHandle)]
    pub fn store_handle(&self) -> Result<IdbFactory, JsValue> {
        idb_factory().map_err(|e| to_js(Error::Connection(e.to_string())))
    }

    /// Delete the whole database. Resolves once the store confirms.
    #[wasm_bindgen(js_name = deleteDatabase)]
    pub fn delete_database(&self) -> js_sys::Promise {
        let db = Rc::clone(&self.db);
        future_to_promise(async move {
            db.delete_database()
                .await
                .map(|()| JsValue::UNDEFINED)
                .map_err(to_js)
        })
    }
}

/// Record operations for one table.
#[wasm_bindgen]
pub struct JsTable {
    handle: RecordHandle<IndexedDbBackend>,
}

fn required_key(key: &JsValue) -> Result<Key, JsValue> {
    if key.is_undefined() {
        return Err(to_js(Error::Argument("Index value of undefined given".into())));
    }
    js_to_key(key).map_err(|e| to_js(Error::Argument(e.to_string())))
}

fn required_record(data: &JsValue) -> Result<Value, JsValue> {
    js_to_value(data)
        .map_err(|e| to_js(Error::Argument(e.to_string())))?
        .ok_or_else(|| to_js(Error::Argument("Data not given".into())))
}

fn required_index(index: &JsValue) -> Result<String, JsValue> {
    index
        .as_string()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| to_js(Error::Argument("Index must be a non-empty string".into())))
}

fn bounds(val: &JsValue) -> Result<BoundDescriptor, JsValue> {
    if !val.is_object() {
        return Err(to_js(Error::Argument("Bound values value must be type of object.".into())));
    }
    js_to_value(val)
        .map_err(|e| to_js(Error::Argument(e.to_string())))?
        .map_or(Ok(BoundDescriptor::all()), |json| {
            serde_json::from_value(json).map_err(|e| to_js(Error::Argument(e.to_string())))
        })
}

fn callbacks(success: &JsValue, error: &JsValue) -> Result<JsCallbacks, JsValue> {
    JsCallbacks::parse(success, error).map_err(to_js)
}

#[wasm_bindgen]
impl JsTable {
    #[wasm_bindgen(getter)]
    pub fn table(&self) -> String {
        self.handle.table().to_string()
    }

    /// Insert `data`; success receives the stored record.
    pub fn create(&self, data: JsValue, success: JsValue, error: JsValue) -> Result<(), JsValue> {
        let callbacks = callbacks(&success, &error)?.record();
        let data = required_record(&data)?;
        spawn_local(self.handle.create_with(data, callbacks).map_err(to_js)?);
        Ok(())
    }

    /// Look up by primary key; success receives `(record | null, key)`.
    pub fn find(&self, key: JsValue, success: JsValue, error: JsValue) -> Result<(), JsValue> {
        let callbacks = callbacks(&success, &error)?.lookup();
        let key = required_key(&key)?;
        spawn_local(self.handle.find_with(key, callbacks).map_err(to_js)?);
        Ok(())
    }

    /// Look up the first record whose `index` equals `key`.
    #[wasm_bindgen(js_name = findByIndex)]
    pub fn find_by_index(
        &self,
        index: JsValue,
        key: JsValue,
        success: JsValue,
        error: JsValue,
    ) -> Result<(), JsValue> {
        let callbacks = callbacks(&success, &error)?.lookup();
        let index = required_index(&index)?;
        let key = required_key(&key)?;
        spawn_local(
            self.handle
                .find_by_index_with(&index, key, callbacks)
                .map_err(to_js)?,
        );
        Ok(())
    }

    /// Every record in key order.
    #[wasm_bindgen(js_name = getAll)]
    pub fn get_all(&self, success: JsValue, error: JsValue) -> Result<(), JsValue> {
        let callbacks = callbacks(&success, &error)?.records();
        spawn_local(self.handle.get_all_with(callbacks).map_err(to_js)?);
        Ok(())
    }

    /// Records whose `index` value is within `bounds`
    /// (`{only}` | `{lowerBound: {value, notInclude}}` | `{upperBound: {...}}`).
    #[wasm_bindgen(js_name = getByIndex)]
    pub fn get_by_index(
        &self,
        index: JsValue,
        bounds_val: JsValue,
        success: JsValue,
        error: JsValue,
    ) -> Result<(), JsValue> {
        let callbacks = callbacks(&success, &error)?.records();
        let index = required_index(&index)?;
        let bounds = bounds(&bounds_val)?;
        spawn_local(
            self.handle
                .get_by_index_with(&index, &bounds, callbacks)
                .map_err(to_js)?,
        );
        Ok(())
    }

    /// Insert or overwrite; success receives the stored key.
    pub fn update(&self, data: JsValue, success: JsValue, error: JsValue) -> Result<(), JsValue> {
        let callbacks = callbacks(&success, &error)?.key();
        let data = required_record(&data)?;
        spawn_local(self.handle.update_with(data, callbacks).map_err(to_js)?);
        Ok(())
    }

    /// Delete by primary key. Deleting a missing key succeeds.
    #[wasm_bindgen(js_name = deleteId)]
    pub fn delete_id(&self, key: JsValue, success: JsValue, error: JsValue) -> Result<(), JsValue> {
        let callbacks = callbacks(&success, &error)?.unit();
        let key = required_key(&key)?;
        spawn_local(self.handle.delete_id_with(key, callbacks).map_err(to_js)?);
        Ok(())
    }

    /// Number of records, as a promise.
    pub fn count(&self) -> js_sys::Promise {
        let handle = self.handle.clone();
        future_to_promise(async move {
            handle
                .count()
                .await
                .map(|n| JsValue::from_f64(n as f64))
                .map_err(to_js)
        })
    }
}
