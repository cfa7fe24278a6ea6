//! tabula WASM bridge
//!
//! Exposes declarative IndexedDB tables to JavaScript hosts through
//! wasm-bindgen.
//!
//! # Usage
//!
//! ```js
//! import init, { setDatabaseName, setVersion, setTables, setApply, initialize } from "tabula_wasm";
//!
//! await init();
//! setDatabaseName("shop");
//! setVersion(1);
//! setTables([{ name: "items", fields: [{ name: "sku" }, { name: "qty" }] }]);
//! setApply((fn) => zone.run(fn));
//!
//! const db = await initialize();
//! db.handles.items.create({ sku: "A1", qty: 3 }, (record) => console.log(record));
//! db.handles.items.getByIndex("qty", { lowerBound: { value: 2, notInclude: true } }, console.log);
//! ```
//!
//! Setters and table operations throw synchronously on invalid arguments.
//! Operation failures go to the `error` callback, or are logged when none is
//! given.

pub mod database;
pub mod host;
pub mod setup;

pub use database::{JsDatabase, JsTable};
pub use host::{error_to_js, JsScheduler};
pub use setup::{
    initialize, reset_setup, set_apply, set_database_name, set_legacy_bounds,
    set_strict_id_fields, set_tables, set_version,
};
