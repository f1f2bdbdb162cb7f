//! # City Mirror Core
//!
//! On-device core of the CityShare app: an LMDB-backed local mirror of the
//! remote city collection, the synchronizer that keeps it up to date, the
//! client-side search used by the list screens and the chat push payload
//! builder. Exposed both as a Rust library and through C-compatible functions
//! for the Flutter host.
//!
//! ## Data Flow
//!
//! remote change → [`synchronizer::CitiesSynchronizer`] maps and bulk-upserts
//! → [`local_db_state::AppDbState`] publishes the new row set →
//! [`city_filter::CityListBinding`] re-renders.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use city_mirror_core::local_db_state::AppDbState;
//! use city_mirror_core::remote_collection::{InMemoryCollection, RemoteDocument};
//! use city_mirror_core::synchronizer::CitiesSynchronizer;
//! use serde_json::json;
//!
//! let store = Arc::new(AppDbState::init("cityshare_cache".to_string())?);
//! let remote = Arc::new(InMemoryCollection::new("cities", "name"));
//! let sync = CitiesSynchronizer::new(remote.clone(), store.clone());
//! sync.start();
//!
//! remote.set_document(RemoteDocument::from_value("c1", json!({"name": "Paris"})));
//! assert_eq!(store.get_by_id("c1")?.map(|row| row.name), Some("Paris".to_string()));
//! # Ok::<(), city_mirror_core::AppResponse>(())
//! ```
//!
//! ## FFI Functions
//!
//! Every function answers with a JSON-encoded [`AppResponse`] that must be
//! released with [`free_response`]:
//!
//! - [`create_db`] / [`create_db_with_config`] - Open the mirror
//! - [`apply_snapshot`] - Feed a remote snapshot from a host-owned listener
//! - [`get_all`] - All mirrored rows
//! - [`get_by_id`] - One row by id
//! - [`search_cities`] - Sorted, filtered rows for a search query
//! - [`clear_all_records`] - Drop every mirrored row
//! - [`close_database`] - Explicit connection cleanup

pub mod app_response;
pub mod chat_notification;
pub mod city_filter;
pub mod city_mapping;
pub mod local_db_model;
pub mod local_db_state;
pub mod mirror_config;
pub mod remote_collection;
pub mod synchronizer;

pub use crate::app_response::AppResponse;

use crate::city_filter::{filter_cities, sort_by_name};
use crate::local_db_state::AppDbState;
use crate::mirror_config::MirrorConfig;
use crate::remote_collection::RemoteDocument;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use log::{info, warn};
use serde::Serialize;

/// Opens (or creates) the mirror `<name>.lmdb` with default settings.
///
/// # Returns
///
/// A pointer to the [`AppDbState`] instance, or null on failure. Release it
/// with [`close_database`]; the pointer itself stays owned by the caller.
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use city_mirror_core::create_db;
///
/// let name = CString::new("cityshare_cache").unwrap();
/// let db_state = create_db(name.as_ptr());
/// assert!(!db_state.is_null());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_db(name: *const c_char) -> *mut AppDbState {
    let name_str = match c_ptr_to_str(name, "name") {
        Ok(s) => s,
        Err(e) => {
            warn!("create_db rejected its argument: {e}");
            return std::ptr::null_mut();
        }
    };

    open_state(MirrorConfig::named(name_str))
}

/// Opens the mirror from a JSON [`MirrorConfig`]. Missing fields take their
/// defaults.
///
/// ```no_run
/// use std::ffi::CString;
/// use city_mirror_core::create_db_with_config;
///
/// let config = CString::new(r#"{"db_name":"cityshare_cache","map_size":20971520}"#).unwrap();
/// let db_state = create_db_with_config(config.as_ptr());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_db_with_config(config_json: *const c_char) -> *mut AppDbState {
    let json = match c_ptr_to_str(config_json, "config") {
        Ok(s) => s,
        Err(e) => {
            warn!("create_db_with_config rejected its argument: {e}");
            return std::ptr::null_mut();
        }
    };

    match MirrorConfig::from_json(&json) {
        Ok(config) => open_state(config),
        Err(e) => {
            warn!("Rejected mirror configuration: {e}");
            std::ptr::null_mut()
        }
    }
}

fn open_state(config: MirrorConfig) -> *mut AppDbState {
    info!("Opening city mirror at: {}", config.lmdb_dir().display());

    match AppDbState::with_config(&config) {
        Ok(state) => Box::into_raw(Box::new(state)),
        Err(e) => {
            warn!("Failed to open city mirror: {e}");
            warn!("Attempted path: {}", config.lmdb_dir().display());
            std::ptr::null_mut()
        }
    }
}

/// Applies a remote snapshot delivered by the host's listener.
///
/// `json_ptr` is an array of documents:
///
/// ```json
/// [
///   {"id": "c1", "fields": {"name": "Paris", "country": "France"}},
///   {"id": "c2", "fields": {"name": "Gent"}}
/// ]
/// ```
///
/// Answers `Ok` with the [`SnapshotReport`](synchronizer::SnapshotReport) as
/// JSON. Malformed documents are listed in `skipped` and not written.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn apply_snapshot(state: *mut AppDbState, json_ptr: *const c_char) -> *const c_char {
    let state = match state_ref(state, "apply_snapshot") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(err) => return err,
    };

    let documents: Vec<RemoteDocument> = match serde_json::from_str(&json_str) {
        Ok(docs) => docs,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid snapshot JSON: {e}"));
            return response_to_c_string(&error);
        }
    };

    respond_json(synchronizer::apply_snapshot(state, &documents))
}

/// Returns every mirrored row as a JSON array, in key order.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_all(state: *mut AppDbState) -> *const c_char {
    let state = match state_ref(state, "get_all") {
        Ok(s) => s,
        Err(err) => return err,
    };

    respond_json(state.get())
}

/// Returns one row, or `NotFound`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_by_id(state: *mut AppDbState, id: *const c_char) -> *const c_char {
    let state = match state_ref(state, "get_by_id") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let id_str = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    match state.get_by_id(&id_str) {
        Ok(Some(row)) => respond_json(Ok(row)),
        Ok(None) => response_to_c_string(&AppResponse::NotFound(format!(
            "No city found with id: {id_str}"
        ))),
        Err(e) => response_to_c_string(&e),
    }
}

/// Rows sorted by name and filtered by a case-insensitive query over name
/// and country. An empty query returns every row.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn search_cities(state: *mut AppDbState, query: *const c_char) -> *const c_char {
    let state = match state_ref(state, "search_cities") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let query = match c_ptr_to_string(query, "query") {
        Ok(q) => q,
        Err(err) => return err,
    };

    respond_json(state.get().map(|mut rows| {
        sort_by_name(&mut rows);
        filter_cities(&rows, &query)
    }))
}

/// Clears all mirrored rows. The database stays open.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn clear_all_records(state: *mut AppDbState) -> *const c_char {
    let state = match state_ref(state, "clear_all_records") {
        Ok(s) => s,
        Err(err) => return err,
    };

    match state.clear_all_records() {
        Ok(()) => response_to_c_string(&AppResponse::success("All records cleared successfully")),
        Err(e) => response_to_c_string(&e),
    }
}

/// Closes the mirror and frees the state created by [`create_db`]. The
/// pointer must not be used afterwards.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_database(state: *mut AppDbState) -> *const c_char {
    if state.is_null() {
        let error = AppResponse::BadRequest("Null state pointer passed to close_database".to_string());
        return response_to_c_string(&error);
    }

    let mut state = unsafe { Box::from_raw(state) };

    match state.close_database() {
        Ok(()) => response_to_c_string(&AppResponse::success("Database connection closed successfully")),
        Err(e) => response_to_c_string(&e),
    }
}

/// Releases a string returned by any function of this library.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_response(response: *const c_char) {
    if response.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(response as *mut c_char) });
}

fn state_ref<'a>(state: *mut AppDbState, function: &str) -> Result<&'a AppDbState, *const c_char> {
    match unsafe { state.as_ref() } {
        Some(s) => Ok(s),
        None => {
            let error = AppResponse::BadRequest(format!("Null state pointer passed to {function}"));
            Err(response_to_c_string(&error))
        }
    }
}

/// Serializes the `Ok` value as the payload of [`AppResponse::Ok`].
fn respond_json<T: Serialize>(result: Result<T, AppResponse>) -> *const c_char {
    let response = match result {
        Ok(value) => match serde_json::to_string(&value) {
            Ok(json) => AppResponse::Ok(json),
            Err(e) => AppResponse::SerializationError(format!("Failed to serialize result: {e}")),
        },
        Err(e) => e,
    };
    response_to_c_string(&response)
}

/// Converts an [`AppResponse`] to a C string owned by the caller, or null if
/// serialization fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a Rust String with descriptive errors for
/// null pointers and invalid UTF-8.
fn c_ptr_to_str(ptr: *const c_char, field_name: &str) -> Result<String, AppResponse> {
    if ptr.is_null() {
        return Err(AppResponse::BadRequest(format!("Null {field_name} pointer")));
    }

    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(str::to_string)
        .map_err(|e| AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}")))
}

/// Same as [`c_ptr_to_str`], with the error already encoded as a response
/// pointer.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    c_ptr_to_str(ptr, field_name).map_err(|error| response_to_c_string(&error))
}
