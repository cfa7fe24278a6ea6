//! Low-level IndexedDB helpers using web-sys
//!
//! Wraps the callback-based IndexedDB API into Rust futures using
//! `wasm_bindgen_futures::JsFuture` and `js_sys::Promise`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use js_sys::Promise;
use tabula_core::storage::{SchemaUpgrade, StoreError, StoreResult, UpgradeFn};
use tracing::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{IdbDatabase, IdbFactory, IdbOpenDbRequest, IdbRequest, IdbTransaction};

use crate::error::{IndexedDbError, Result};

type EventClosure = Closure<dyn FnMut(web_sys::Event)>;
type UpgradeClosure = Closure<dyn FnMut(web_sys::IdbVersionChangeEvent)>;

/// Globals probed for the factory, standard name first.
const FACTORY_GLOBALS: [&str; 4] = ["indexedDB", "mozIndexedDB", "webkitIndexedDB", "msIndexedDB"];

/// Get the global IndexedDB factory, falling back to vendor-prefixed globals.
pub fn idb_factory() -> Result<IdbFactory> {
    let global = js_sys::global();

    let idb = FACTORY_GLOBALS
        .iter()
        .filter_map(|name| js_sys::Reflect::get(&global, &JsValue::from_str(name)).ok())
        .find(|idb| !idb.is_undefined() && !idb.is_null())
        .ok_or_else(|| IndexedDbError::NotAvailable("no indexedDB on global".into()))?;

    idb.dyn_into::<IdbFactory>()
        .map_err(|_| IndexedDbError::NotAvailable("indexedDB is not IdbFactory".into()))
}

/// Convert an IdbRequest into a JS Promise that resolves with the request's
/// result.
///
/// The request's handlers are replaced on every call, so a cursor request
/// can be awaited again after each `continue()`. Rejections carry
/// `"<DOMException name>: <message>"`.
fn request_to_promise(req: &IdbRequest) -> Promise {
    let req_success = req.clone();
    let req_error = req.clone();

    Promise::new(&mut move |resolve, reject| {
        let closures: Rc<RefCell<Option<(EventClosure, EventClosure)>>> =
            Rc::new(RefCell::new(None));

        let req_s = req_success.clone();
        let closures_for_success = closures.clone();
        let on_success = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let result = req_s.result().unwrap_or(JsValue::UNDEFINED);
            let _ = resolve.call1(&JsValue::UNDEFINED, &result);
            *closures_for_success.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let req_e = req_error.clone();
        let closures_for_error = closures.clone();
        let on_error = Closure::wrap(Box::new(move |event: web_sys::Event| {
            let msg = match req_e.error() {
                Ok(Some(e)) => format!("{}: {}", e.name(), e.message()),
                _ => "UnknownError: unknown IDB error".to_string(),
            };
            // Keep the error from also aborting the whole transaction
            event.prevent_default();
            let _ = reject.call1(&JsValue::UNDEFINED, &JsValue::from_str(&msg));
            *closures_for_error.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        req_success.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
        req_error.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        *closures.borrow_mut() = Some((on_success, on_error));
    })
}

/// Convert an IdbTransaction completion into a JS Promise.
///
/// A failed transaction always ends in `abort`, so that event alone carries
/// the rejection.
fn transaction_to_promise(tx: &IdbTransaction) -> Promise {
    let tx_complete = tx.clone();
    let tx_abort = tx.clone();

    Promise::new(&mut move |resolve, reject| {
        let closures: Rc<RefCell<Option<(EventClosure, EventClosure)>>> =
            Rc::new(RefCell::new(None));

        let closures_for_complete = closures.clone();
        let on_complete = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let _ = resolve.call0(&JsValue::UNDEFINED);
            *closures_for_complete.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let tx_a = tx_abort.clone();
        let closures_for_abort = closures.clone();
        let on_abort = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let msg = tx_a
                .error()
                .map(|e| format!("{}: {}", e.name(), e.message()))
                .unwrap_or_else(|| "AbortError: transaction aborted".to_string());
            let _ = reject.call1(&JsValue::UNDEFINED, &JsValue::from_str(&msg));
            *closures_for_abort.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        tx_complete.set_oncomplete(Some(on_complete.as_ref().unchecked_ref()));
        tx_abort.set_onabort(Some(on_abort.as_ref().unchecked_ref()));

        *closures.borrow_mut() = Some((on_complete, on_abort));
    })
}

/// Schema access inside a `versionchange` transaction.
struct IdbUpgrade {
    db: IdbDatabase,
    tx: IdbTransaction,
}

impl SchemaUpgrade for IdbUpgrade {
    fn has_table(&self, name: &str) -> bool {
        self.db.object_store_names().contains(name)
    }

    fn create_table(&mut self, name: &str, key_path: &str, auto_increment: bool) -> StoreResult<()> {
        let params = web_sys::IdbObjectStoreParameters::new();
        js_sys::Reflect::set(&params, &"keyPath".into(), &key_path.into())
            .map_err(|e| StoreError::from(IndexedDbError::from_js("set keyPath", &e)))?;
        js_sys::Reflect::set(
            &params,
            &"autoIncrement".into(),
            &JsValue::from_bool(auto_increment),
        )
        .map_err(|e| StoreError::from(IndexedDbError::from_js("set autoIncrement", &e)))?;

        self.db
            .create_object_store_with_optional_parameters(name, &params)
            .map_err(|e| {
                StoreError::from(IndexedDbError::from_js(&format!("create table '{}'", name), &e))
            })?;
        Ok(())
    }

    fn create_index(&mut self, table: &str, index: &str, key_path: &str) -> StoreResult<()> {
        let store = self.tx.object_store(table).map_err(|e| {
            StoreError::from(IndexedDbError::from_js(&format!("table '{}'", table), &e))
        })?;
        store.create_index_with_str(index, key_path).map_err(|e| {
            StoreError::from(IndexedDbError::from_js(
                &format!("create index '{}' on '{}'", index, table),
                &e,
            ))
        })?;
        Ok(())
    }
}

fn run_upgrade(req: &IdbOpenDbRequest, upgrade: &UpgradeFn) -> StoreResult<()> {
    let db: IdbDatabase = req
        .result()
        .map_err(|e| StoreError::from(IndexedDbError::from_js("upgrade result", &e)))?
        .dyn_into()
        .map_err(|_| StoreError::Backend("upgrade result is not IdbDatabase".into()))?;
    let tx = req
        .transaction()
        .ok_or_else(|| StoreError::Backend("upgrade has no versionchange transaction".into()))?;

    let mut schema = IdbUpgrade { db, tx };
    upgrade(&mut schema)
}

/// Open (or create) a database at `version`, running `upgrade` inside the
/// `versionchange` transaction when one is needed.
///
/// Returns the connection and whether the upgrade phase ran. If `upgrade`
/// fails the version change is aborted and its error returned.
pub async fn open_database(
    name: &str,
    version: u32,
    upgrade: UpgradeFn,
) -> StoreResult<(IdbDatabase, bool)> {
    let factory = idb_factory()?;

    let open_req: IdbOpenDbRequest = factory
        .open_with_u32(name, version)
        .map_err(|e| IndexedDbError::from_js("open", &e))?;

    let upgraded = Rc::new(Cell::new(false));
    let failure: Rc<RefCell<Option<StoreError>>> = Rc::new(RefCell::new(None));

    let req = open_req.clone();
    let upgraded_flag = upgraded.clone();
    let failure_slot = failure.clone();
    let on_upgrade = Closure::wrap(Box::new(move |_event: web_sys::IdbVersionChangeEvent| {
        upgraded_flag.set(true);
        if let Err(err) = run_upgrade(&req, &upgrade) {
            if let Some(tx) = req.transaction() {
                let _ = tx.abort();
            }
            *failure_slot.borrow_mut() = Some(err);
        }
    }) as Box<dyn FnMut(web_sys::IdbVersionChangeEvent)>);

    let db_name = name.to_string();
    let on_blocked = Closure::wrap(Box::new(move |_event: web_sys::Event| {
        warn!("IndexedDB open of '{}' blocked by another connection", db_name);
    }) as Box<dyn FnMut(web_sys::Event)>);

    open_req.set_onupgradeneeded(Some(on_upgrade.as_ref().unchecked_ref()));
    open_req.set_onblocked(Some(on_blocked.as_ref().unchecked_ref()));
    let closures: (UpgradeClosure, EventClosure) = (on_upgrade, on_blocked);

    let result = wasm_bindgen_futures::JsFuture::from(request_to_promise(open_req.unchecked_ref()))
        .await;

    open_req.set_onupgradeneeded(None);
    open_req.set_onblocked(None);
    drop(closures);

    if let Some(err) = failure.borrow_mut().take() {
        return Err(err);
    }

    let db = result
        .map_err(IndexedDbError::from)?
        .dyn_into::<IdbDatabase>()
        .map_err(|_| IndexedDbError::Open("result is not IdbDatabase".into()))?;

    Ok((db, upgraded.get()))
}

/// Await an IdbRequest, resolving to its result JsValue.
pub async fn await_request(req: &IdbRequest) -> Result<JsValue> {
    let promise = request_to_promise(req);
    wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .map_err(IndexedDbError::from)
}

/// Await an IdbTransaction to complete.
pub async fn await_transaction(tx: &IdbTransaction) -> Result<()> {
    let promise = transaction_to_promise(tx);
    wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .map_err(|e| match IndexedDbError::from(e) {
            IndexedDbError::Request(msg) => IndexedDbError::Transaction(msg),
            other => other,
        })?;
    Ok(())
}

/// Delete an IndexedDB database by name.
pub async fn delete_database(name: &str) -> Result<()> {
    let factory = idb_factory()?;
    let req = factory
        .delete_database(name)
        .map_err(|e| IndexedDbError::from_js("delete database", &e))?;
    await_request(req.unchecked_ref()).await?;
    Ok(())
}
