//! SQLite driver for paranoid.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! `SqliteConnection` implements `paranoid_query::Connection` over the
//! bundled libsqlite3. Statements are rendered in the SQLite dialect
//! (`?N` placeholders, `INTEGER PRIMARY KEY` for single integer keys) and
//! foreign keys are enforced.
//!
//! # Type Mapping
//!
//! | `Value` | SQLite storage |
//! |---------|----------------|
//! | `Bool` | INTEGER (0/1) |
//! | `Int`, `BigInt` | INTEGER |
//! | `Timestamp`, `TimestampTz` | INTEGER (microseconds) |
//! | `Double` | REAL |
//! | `Text` | TEXT |
//! | `Json` | TEXT |
//! | `Bytes` | BLOB |
//!
//! INTEGER cells come back as `BigInt` unless the declared column type is
//! BOOLEAN, TIMESTAMP or TIMESTAMPTZ.

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{MEMORY_PATH, SqliteConnection};

/// The SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}
