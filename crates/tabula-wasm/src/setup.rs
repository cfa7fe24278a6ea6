//! Setup surface: `setDatabaseName`, `setVersion`, `setTables`, `initialize`
//!
//! Setters validate their JS argument types before handing the value to the
//! core configuration builder, and throw on invalid input. Settings take
//! effect at the next `initialize()`.

use std::cell::RefCell;

use tabula_core::{
    BoundMode, ConnectionManager, DatabaseConfig, DatabaseConfigBuilder, Error, IdFieldPolicy,
    TableDefinition,
};
use tabula_indexeddb::convert::js_to_value;
use tabula_indexeddb::IndexedDbBackend;
use wasm_bindgen::prelude::*;

use crate::database::JsDatabase;
use crate::host::{self, to_js, JsScheduler};

thread_local! {
    static SETUP: RefCell<DatabaseConfigBuilder> = RefCell::new(DatabaseConfig::builder());
}

fn update(f: impl FnOnce(DatabaseConfigBuilder) -> Result<DatabaseConfigBuilder, Error>) -> Result<(), JsValue> {
    SETUP.with(|slot| {
        let current = slot.borrow().clone();
        let next = f(current).map_err(to_js)?;
        *slot.borrow_mut() = next;
        Ok(())
    })
}

/// Set the database name.
#[wasm_bindgen(js_name = setDatabaseName)]
pub fn set_database_name(name: JsValue) -> Result<(), JsValue> {
    if name.is_undefined() || name.is_null() {
        return Err(to_js(Error::Config("Database name not given".into())));
    }
    let name = name
        .as_string()
        .ok_or_else(|| to_js(Error::Config("Database name must be a string type".into())))?;
    update(|b| b.database_name(name))
}

/// Set the database version (integer, at least 1).
#[wasm_bindgen(js_name = setVersion)]
pub fn set_version(version: JsValue) -> Result<(), JsValue> {
    if version.is_undefined() || version.is_null() {
        return Err(to_js(Error::Config("Database version not given".into())));
    }
    let version = version
        .as_f64()
        .ok_or_else(|| to_js(Error::Config("Database version must be a number type".into())))?;
    if version.fract() != 0.0 || !version.is_finite() {
        return Err(to_js(Error::Config("Database version must be an integer".into())));
    }
    update(|b| b.version(version as i64))
}

/// Declare the tables: `[{name, fields: [{name, keyPath?}]}]`.
#[wasm_bindgen(js_name = setTables)]
pub fn set_tables(tables: JsValue) -> Result<(), JsValue> {
    if tables.is_undefined() {
        return Err(to_js(Error::Config("Tables parameter given is undefined".into())));
    }
    if !js_sys::Array::is_array(&tables) {
        return Err(to_js(Error::Config("Tables parameter must be a type of array".into())));
    }
    let json = js_to_value(&tables)
        .map_err(|e| to_js(Error::Schema(e.to_string())))?
        .unwrap_or_default();
    let definitions: Vec<TableDefinition> =
        serde_json::from_value(json).map_err(|e| to_js(Error::Schema(e.to_string())))?;
    update(|b| b.tables(&definitions))
}

/// Read upper-bound `notInclude` the historical way (always inclusive).
#[wasm_bindgen(js_name = setLegacyBounds)]
pub fn set_legacy_bounds(legacy: bool) -> Result<(), JsValue> {
    let mode = if legacy {
        BoundMode::Legacy
    } else {
        BoundMode::Independent
    };
    update(|b| Ok(b.bound_mode(mode)))
}

/// Reject plain `id` fields instead of dropping them. Applies to the next
/// `setTables` call.
#[wasm_bindgen(js_name = setStrictIdFields)]
pub fn set_strict_id_fields(strict: bool) -> Result<(), JsValue> {
    let policy = if strict {
        IdFieldPolicy::Reject
    } else {
        IdFieldPolicy::Drop
    };
    update(|b| Ok(b.id_field_policy(policy)))
}

/// Register `apply(fn)`, called with each operation callback so the host can
/// run it inside its own update cycle. Pass `undefined` to clear.
#[wasm_bindgen(js_name = setApply)]
pub fn set_apply(apply: JsValue) -> Result<(), JsValue> {
    let apply = host::optional_function(&apply, "Apply").map_err(to_js)?;
    host::set_apply(apply);
    Ok(())
}

/// Open the configured database and return its runtime surface.
///
/// Rejects with a `ConnectionError` if the database cannot be opened.
#[wasm_bindgen]
pub async fn initialize() -> Result<JsDatabase, JsValue> {
    #[cfg(feature = "panic-hook")]
    console_error_panic_hook::set_once();

    let config = SETUP.with(|slot| slot.borrow().clone()).build();
    let db = ConnectionManager::new(IndexedDbBackend::new(), config)
        .with_scheduler(JsScheduler)
        .initialize()
        .await
        .map_err(to_js)?;
    Ok(JsDatabase::new(db))
}

/// Reset every setting to its default.
#[wasm_bindgen(js_name = resetSetup)]
pub fn reset_setup() {
    SETUP.with(|slot| *slot.borrow_mut() = DatabaseConfig::builder());
    host::set_apply(None);
}
