//! Browser tests for the JS surface
//!
//! Run with `wasm-pack test --headless --firefox crates/tabula-wasm`.

#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Array, Function, Promise, Reflect};
use tabula_wasm::{
    initialize, reset_setup, set_apply, set_database_name, set_tables, set_version,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn error_message(err: JsValue) -> String {
    Reflect::get(&err, &"message".into())
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_default()
}

fn tables(json: &str) -> JsValue {
    js_sys::JSON::parse(json).unwrap()
}

#[wasm_bindgen_test]
fn test_set_database_name_validates_type() {
    reset_setup();
    assert_eq!(
        error_message(set_database_name(JsValue::UNDEFINED).unwrap_err()),
        "Database name not given"
    );
    assert_eq!(
        error_message(set_database_name(JsValue::from_f64(3.0)).unwrap_err()),
        "Database name must be a string type"
    );
    set_database_name("shop".into()).unwrap();
}

#[wasm_bindgen_test]
fn test_set_version_validates_type_and_range() {
    reset_setup();
    assert_eq!(
        error_message(set_version(JsValue::UNDEFINED).unwrap_err()),
        "Database version not given"
    );
    assert_eq!(
        error_message(set_version("2".into()).unwrap_err()),
        "Database version must be a number type"
    );
    assert_eq!(
        error_message(set_version(JsValue::from_f64(0.0)).unwrap_err()),
        "Minimum version value must be 1"
    );
    set_version(JsValue::from_f64(2.0)).unwrap();
}

#[wasm_bindgen_test]
fn test_set_tables_validates_shape() {
    reset_setup();
    assert_eq!(
        error_message(set_tables(JsValue::UNDEFINED).unwrap_err()),
        "Tables parameter given is undefined"
    );
    assert_eq!(
        error_message(set_tables(tables(r#"{"name": "items"}"#)).unwrap_err()),
        "Tables parameter must be a type of array"
    );
    assert_eq!(
        error_message(set_tables(tables(r#"[{"name": "a"}, {"name": "a"}]"#)).unwrap_err()),
        "Multiple table name a used"
    );
    set_tables(tables(r#"[{"name": "items", "fields": [{"name": "sku"}]}]"#)).unwrap();
}

#[wasm_bindgen_test]
async fn test_callback_operations_through_apply() {
    reset_setup();
    tabula_indexeddb::idb::delete_database("tabula-wasm-test").await.unwrap();
    set_database_name("tabula-wasm-test".into()).unwrap();
    set_tables(tables(r#"[{"name": "items", "fields": [{"name": "sku"}]}]"#)).unwrap();

    let applied = Rc::new(RefCell::new(0));
    let counter = applied.clone();
    let apply = Closure::<dyn FnMut(Function)>::new(move |f: Function| {
        *counter.borrow_mut() += 1;
        let _ = f.call0(&JsValue::NULL);
    });
    set_apply(apply.as_ref().clone()).unwrap();

    let db = initialize().await.unwrap();
    let items = db.handle("items").unwrap();

    // Bad callbacks throw before any work starts
    let err = items
        .create(tables(r#"{"sku": "A1"}"#), JsValue::from_f64(1.0), JsValue::UNDEFINED)
        .unwrap_err();
    assert_eq!(error_message(err), "Success callback must be a type of function");
    let err = items
        .find(JsValue::UNDEFINED, JsValue::UNDEFINED, JsValue::UNDEFINED)
        .unwrap_err();
    assert_eq!(error_message(err), "Index value of undefined given");

    // Resolve a promise from the success callback
    let mut resolve_fn: Option<Function> = None;
    let created = Promise::new(&mut |resolve, _| resolve_fn = Some(resolve));
    let resolve_fn = resolve_fn.unwrap();
    let on_success = Closure::once_into_js(move |record: JsValue| {
        let _ = resolve_fn.call1(&JsValue::NULL, &record);
    });
    items
        .create(tables(r#"{"sku": "A1"}"#), on_success, JsValue::UNDEFINED)
        .unwrap();
    let record = JsFuture::from(created).await.unwrap();
    assert_eq!(
        Reflect::get(&record, &"id".into()).unwrap().as_f64(),
        Some(1.0)
    );
    assert_eq!(*applied.borrow(), 1);

    let count = JsFuture::from(items.count()).await.unwrap();
    assert_eq!(count.as_f64(), Some(1.0));

    let handles = db.handles().unwrap();
    let keys: Array = js_sys::Object::keys(&handles);
    assert_eq!(keys.length(), 1);
    assert!(Reflect::get(&handles, &"items".into())
        .unwrap()
        .dyn_ref::<js_sys::Object>()
        .is_some());

    reset_setup();
}

#[wasm_bindgen_test]
async fn test_table_argument_validation() {
    reset_setup();
    tabula_indexeddb::idb::delete_database("tabula-wasm-args").await.unwrap();
    set_database_name("tabula-wasm-args".into()).unwrap();
    set_tables(tables(r#"[{"name": "items", "fields": [{"name": "sku"}]}]"#)).unwrap();

    let db = initialize().await.unwrap();
    let items = db.handle("items").unwrap();

    // Callbacks are checked before the key
    let err = items
        .find(JsValue::UNDEFINED, JsValue::from_f64(5.0), JsValue::UNDEFINED)
        .unwrap_err();
    assert_eq!(error_message(err.clone()), "Success callback must be a type of function");
    assert_eq!(Reflect::get(&err, &"name".into()).unwrap(), "TypeError");
    let err = items
        .delete_id(JsValue::UNDEFINED, JsValue::UNDEFINED, JsValue::from_str("nope"))
        .unwrap_err();
    assert_eq!(error_message(err), "Error callback must be a type of function");

    // Bounds must be an object
    for bad in [JsValue::UNDEFINED, JsValue::NULL, JsValue::from_f64(3.0)] {
        let err = items
            .get_by_index("sku".into(), bad, JsValue::UNDEFINED, JsValue::UNDEFINED)
            .unwrap_err();
        assert_eq!(error_message(err), "Bound values value must be type of object.");
    }
    items
        .get_by_index("sku".into(), tables("{}"), JsValue::UNDEFINED, JsValue::UNDEFINED)
        .unwrap();

    let factory = db.store_handle().unwrap();
    assert_eq!(
        JsValue::from(factory),
        Reflect::get(&js_sys::global(), &"indexedDB".into()).unwrap()
    );

    reset_setup();
}
