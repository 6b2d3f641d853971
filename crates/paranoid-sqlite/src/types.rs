//! Value encoding between paranoid and SQLite.
//!
//! SQLite stores every value in one of five classes (INTEGER, REAL, TEXT,
//! BLOB, NULL). Integers are read back through the declared column type so
//! BOOLEAN and timestamp columns keep their `Value` variant.

use crate::ffi;
use paranoid_core::Value;
use std::ffi::{CStr, c_int};

unsafe fn bind_bytes(stmt: *mut ffi::sqlite3_stmt, index: c_int, bytes: &[u8], text: bool) -> c_int {
    // SAFETY: SQLITE_TRANSIENT makes SQLite copy the buffer before returning
    unsafe {
        if text {
            ffi::sqlite3_bind_text(
                stmt,
                index,
                bytes.as_ptr().cast(),
                bytes.len() as c_int,
                ffi::SQLITE_TRANSIENT(),
            )
        } else {
            ffi::sqlite3_bind_blob(
                stmt,
                index,
                bytes.as_ptr().cast(),
                bytes.len() as c_int,
                ffi::SQLITE_TRANSIENT(),
            )
        }
    }
}

/// Bind a Value to a prepared statement parameter.
///
/// # Safety
/// - `stmt` must be a valid, non-null prepared statement handle
/// - `index` must be a valid 1-based parameter index
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    // SAFETY: guaranteed by the caller
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),
            Value::Bool(b) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*b)),
            Value::Int(v) => ffi::sqlite3_bind_int(stmt, index, *v),
            Value::BigInt(v) | Value::Timestamp(v) | Value::TimestampTz(v) => {
                ffi::sqlite3_bind_int64(stmt, index, *v)
            }
            Value::Double(v) => ffi::sqlite3_bind_double(stmt, index, *v),
            Value::Text(s) => bind_bytes(stmt, index, s.as_bytes(), true),
            Value::Bytes(b) => bind_bytes(stmt, index, b, false),
            Value::Json(json) => bind_bytes(stmt, index, json.to_string().as_bytes(), true),
        }
    }
}

/// Declared type of a result column, upper-cased. Empty for expressions.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_decltype(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> String {
    // SAFETY: guaranteed by the caller; the pointer is checked for NULL
    unsafe {
        let ptr = ffi::sqlite3_column_decltype(stmt, index);
        if ptr.is_null() {
            String::new()
        } else {
            CStr::from_ptr(ptr).to_string_lossy().to_ascii_uppercase()
        }
    }
}

/// Map an INTEGER cell to the variant its declared column type names.
fn integer_value(v: i64, decltype: &str) -> Value {
    match decltype {
        "BOOLEAN" => Value::Bool(v != 0),
        "TIMESTAMP" => Value::Timestamp(v),
        "TIMESTAMPTZ" => Value::TimestampTz(v),
        "JSON" => Value::Json(v.into()),
        _ => Value::BigInt(v),
    }
}

/// Map a TEXT cell; JSON columns are parsed, falling back to text.
fn text_value(s: String, decltype: &str) -> Value {
    if decltype == "JSON" {
        if let Ok(json) = serde_json::from_str(&s) {
            return Value::Json(json);
        }
    }
    Value::Text(s)
}

/// Read a column value from a result row.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
/// - `index` must be a valid 0-based column index
pub unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int, decltype: &str) -> Value {
    // SAFETY: guaranteed by the caller; pointers are checked for NULL and
    // read for the byte length SQLite reports
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_INTEGER => integer_value(ffi::sqlite3_column_int64(stmt, index), decltype),
            ffi::SQLITE_FLOAT => Value::Double(ffi::sqlite3_column_double(stmt, index)),
            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() {
                    Value::Null
                } else {
                    let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
                    text_value(String::from_utf8_lossy(slice).into_owned(), decltype)
                }
            }
            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() || len == 0 {
                    Value::Bytes(Vec::new())
                } else {
                    let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
                    Value::Bytes(slice.to_vec())
                }
            }
            _ => Value::Null,
        }
    }
}

/// Get the column name from a result.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: guaranteed by the caller
    unsafe {
        let ptr = ffi::sqlite3_column_name(stmt, index);
        if ptr.is_null() {
            None
        } else {
            Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
        }
    }
}
