//! SQLite-vec extension loader.
//!
//! This module contains the unsafe initialization code for the sqlite-vec extension.
//! It is separated to minimize the scope of unsafe code in the crate.

use std::ffi::{c_char, c_int};
use std::sync::Once;

use rusqlite::ffi::{sqlite3, sqlite3_api_routines, sqlite3_auto_extension};
use sqlite_vec::sqlite3_vec_init;

type SqliteExtensionFn =
    unsafe extern "C" fn(*mut sqlite3, *mut *mut c_char, *const sqlite3_api_routines) -> c_int;

static REGISTER: Once = Once::new();

/// Register sqlite-vec as an auto-loaded extension for every connection opened afterwards.
///
/// Safe to call repeatedly; registration happens once per process. The memory store calls
/// this before opening its connections.
#[allow(unsafe_code)]
pub fn init_sqlite_vec_extension() {
    REGISTER.call_once(|| {
        // SAFETY: sqlite3_auto_extension is a stable SQLite API that registers an entry point
        // run for each new connection. sqlite3_vec_init has exactly the extension entry point
        // signature; the crate only exposes it as an untyped symbol.
        unsafe {
            sqlite3_auto_extension(Some(std::mem::transmute::<*const (), SqliteExtensionFn>(
                sqlite3_vec_init as *const (),
            )));
        }
    });
}
