//! SQLite connection implementing `paranoid_query::Connection`.
//!
//! Statements are rendered in the SQLite dialect and run through the C API.
//! The handle lives behind `Arc<Mutex<>>`; clones share one database and the
//! async trait methods return ready futures.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::result_large_err)] // Error type is defined in paranoid-core
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers

use crate::ffi;
use crate::types;
use paranoid_core::{
    ColumnInfo, Cx, Error, Outcome, QueryError, QueryErrorKind, Result, Row, TransactionError,
    TransactionErrorKind, Value,
};
use paranoid_query::{Connection, Dialect, Select, Statement};
use std::ffi::{CStr, CString, c_int};
use std::fmt;
use std::future::Future;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Path SQLite treats as a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Inner state of the SQLite connection, protected by a mutex.
struct SqliteInner {
    db: *mut ffi::sqlite3,
    in_transaction: bool,
}

// SAFETY: the handle is opened with SQLITE_OPEN_FULLMUTEX and every access
// goes through the Mutex around SqliteInner.
unsafe impl Send for SqliteInner {}

impl Drop for SqliteInner {
    fn drop(&mut self) {
        if !self.db.is_null() {
            // SAFETY: db is valid and no statement outlives a call
            unsafe {
                ffi::sqlite3_close_v2(self.db);
            }
        }
    }
}

/// A connection to a SQLite database.
///
/// Foreign key enforcement is switched on when the database is opened, so
/// hard deletes that would orphan rows fail as constraint violations.
#[derive(Clone)]
pub struct SqliteConnection {
    inner: Arc<Mutex<SqliteInner>>,
    path: String,
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

fn query_error(kind: QueryErrorKind, sql: &str, message: String) -> Error {
    Error::Query(QueryError {
        kind,
        sql: Some(sql.to_string()),
        message,
        source: None,
    })
}

fn transaction_error(kind: TransactionErrorKind, message: &str) -> Error {
    Error::Transaction(TransactionError {
        kind,
        message: message.to_string(),
    })
}

impl SqliteConnection {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let c_path = CString::new(path.as_str()).map_err(|_| {
            query_error(
                QueryErrorKind::Database,
                &path,
                "Invalid path: contains null byte".to_string(),
            )
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_FULLMUTEX;

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is valid, errmsg returns a valid C string
                unsafe {
                    let msg = CStr::from_ptr(ffi::sqlite3_errmsg(db))
                        .to_string_lossy()
                        .into_owned();
                    ffi::sqlite3_close(db);
                    msg
                }
            };
            return Err(query_error(
                QueryErrorKind::Database,
                &path,
                format!("Failed to open database: {msg}"),
            ));
        }

        let conn = Self {
            inner: Arc::new(Mutex::new(SqliteInner {
                db,
                in_transaction: false,
            })),
            path,
        };
        conn.execute_raw("PRAGMA foreign_keys = ON")?;
        tracing::debug!(path = %conn.path, version = ffi::version(), "sqlite open");
        Ok(conn)
    }

    /// Open a private in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(MEMORY_PATH)
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, SqliteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute SQL directly without parameters (for PRAGMA, DDL, etc.)
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let inner = self.lock();
        exec_raw(inner.db, sql)
    }

    /// Execute a SELECT synchronously.
    pub fn query_sync(&self, select: &Select) -> Result<Vec<Row>> {
        let (sql, params) = select.to_sql(Dialect::Sqlite);
        let inner = self.lock();
        query_rows(inner.db, &sql, &params)
    }

    /// Execute a statement synchronously, returning rows affected.
    ///
    /// A failing statement leaves the database unchanged.
    pub fn execute_sync(&self, statement: &Statement) -> Result<u64> {
        let (sql, params) = statement.to_sql(Dialect::Sqlite);
        let inner = self.lock();
        execute_stmt(inner.db, &sql, &params)
    }

    /// Execute an INSERT synchronously, returning the rowid it produced.
    pub fn insert_sync(&self, statement: &Statement) -> Result<Option<i64>> {
        let (sql, params) = statement.to_sql(Dialect::Sqlite);
        let inner = self.lock();
        execute_stmt(inner.db, &sql, &params)?;
        if matches!(statement, Statement::Insert { .. }) {
            // SAFETY: db is valid
            Ok(Some(unsafe { ffi::sqlite3_last_insert_rowid(inner.db) }))
        } else {
            Ok(None)
        }
    }

    pub fn begin_sync(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.in_transaction {
            return Err(transaction_error(
                TransactionErrorKind::AlreadyActive,
                "a transaction is already open",
            ));
        }
        exec_raw(inner.db, "BEGIN")?;
        inner.in_transaction = true;
        Ok(())
    }

    pub fn commit_sync(&self) -> Result<()> {
        self.finish("COMMIT")
    }

    pub fn rollback_sync(&self) -> Result<()> {
        self.finish("ROLLBACK")
    }

    fn finish(&self, sql: &str) -> Result<()> {
        let mut inner = self.lock();
        if !inner.in_transaction {
            return Err(transaction_error(
                TransactionErrorKind::NotActive,
                "no transaction is open",
            ));
        }
        exec_raw(inner.db, sql)?;
        inner.in_transaction = false;
        Ok(())
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.lock().in_transaction
    }

    /// Names of the existing tables, sorted.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let inner = self.lock();
        let rows = query_rows(
            inner.db,
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
            &[],
        )?;
        rows.iter().map(|row| row.get_named::<String>("name")).collect()
    }

    /// Every stored row of `table`, deleted or not, keyed by bare column name.
    pub fn rows(&self, table: &str) -> Result<Vec<Row>> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY rowid",
            Dialect::Sqlite.quote_identifier(table)
        );
        let inner = self.lock();
        query_rows(inner.db, &sql, &[])
    }

    /// Number of stored rows in `table`.
    pub fn row_count(&self, table: &str) -> Result<usize> {
        Ok(self.rows(table)?.len())
    }

    /// Value of `column` in every stored row of `table`.
    pub fn column_values(&self, table: &str, column: &str) -> Result<Vec<Value>> {
        Ok(self
            .rows(table)?
            .iter()
            .map(|row| row.get_by_name(column).cloned().unwrap_or(Value::Null))
            .collect())
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(
        &self,
        _cx: &Cx,
        select: &Select,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self.query_sync(select);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        statement: &Statement,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.execute_sync(statement);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn insert(
        &self,
        _cx: &Cx,
        statement: &Statement,
    ) -> impl Future<Output = Outcome<Option<i64>, Error>> + Send {
        let result = self.insert_sync(statement);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn begin(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.begin_sync();
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn commit(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.commit_sync();
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn rollback(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.rollback_sync();
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }
}

// Helper functions

fn exec_raw(db: *mut ffi::sqlite3, sql: &str) -> Result<()> {
    tracing::trace!(sql, "sqlite exec");
    let c_sql = CString::new(sql).map_err(|_| {
        query_error(
            QueryErrorKind::Database,
            sql,
            "SQL contains null byte".to_string(),
        )
    })?;
    let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };

    if rc != ffi::SQLITE_OK {
        let msg = if errmsg.is_null() {
            ffi::error_string(rc).to_string()
        } else {
            // SAFETY: errmsg is valid and owned by us until freed
            unsafe {
                let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                ffi::sqlite3_free(errmsg.cast());
                msg
            }
        };
        return Err(query_error(error_code_to_kind(rc), sql, msg));
    }
    Ok(())
}

/// Prepare `sql` and bind `params` in order.
fn prepare_bound(
    db: *mut ffi::sqlite3,
    sql: &str,
    params: &[Value],
) -> Result<*mut ffi::sqlite3_stmt> {
    let c_sql = CString::new(sql).map_err(|_| {
        query_error(
            QueryErrorKind::Database,
            sql,
            "SQL contains null byte".to_string(),
        )
    })?;
    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe {
        ffi::sqlite3_prepare_v2(
            db,
            c_sql.as_ptr(),
            c_sql.as_bytes().len() as c_int,
            &mut stmt,
            ptr::null_mut(),
        )
    };
    if rc != ffi::SQLITE_OK {
        return Err(step_error(db, sql));
    }

    for (i, param) in params.iter().enumerate() {
        // SAFETY: stmt is valid, index is 1-based
        let rc = unsafe { types::bind_value(stmt, (i + 1) as c_int, param) };
        if rc != ffi::SQLITE_OK {
            let error = step_error(db, sql);
            // SAFETY: stmt is valid
            unsafe { ffi::sqlite3_finalize(stmt) };
            return Err(error);
        }
    }
    Ok(stmt)
}

fn query_rows(db: *mut ffi::sqlite3, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
    tracing::trace!(sql, params = params.len(), "sqlite query");
    let stmt = prepare_bound(db, sql, params)?;

    // SAFETY: stmt is valid
    let col_count = unsafe { ffi::sqlite3_column_count(stmt) };
    let mut names = Vec::with_capacity(col_count as usize);
    let mut decltypes = Vec::with_capacity(col_count as usize);
    for i in 0..col_count {
        // SAFETY: stmt is valid, i is in range
        unsafe {
            names.push(types::column_name(stmt, i).unwrap_or_else(|| format!("col{i}")));
            decltypes.push(types::column_decltype(stmt, i));
        }
    }
    let columns = Arc::new(ColumnInfo::new(names));

    let mut rows = Vec::new();
    loop {
        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(stmt) };
        match rc {
            ffi::SQLITE_ROW => {
                let values = decltypes
                    .iter()
                    .zip(0..col_count)
                    // SAFETY: stmt is valid, we just got SQLITE_ROW
                    .map(|(decltype, i)| unsafe { types::read_column(stmt, i, decltype) })
                    .collect();
                rows.push(Row::with_columns(Arc::clone(&columns), values));
            }
            ffi::SQLITE_DONE => break,
            _ => {
                let error = step_error(db, sql);
                // SAFETY: stmt is valid
                unsafe { ffi::sqlite3_finalize(stmt) };
                return Err(error);
            }
        }
    }

    // SAFETY: stmt is valid
    unsafe { ffi::sqlite3_finalize(stmt) };
    Ok(rows)
}

fn execute_stmt(db: *mut ffi::sqlite3, sql: &str, params: &[Value]) -> Result<u64> {
    tracing::trace!(sql, params = params.len(), "sqlite execute");
    let stmt = prepare_bound(db, sql, params)?;

    // SAFETY: stmt is valid
    let rc = unsafe { ffi::sqlite3_step(stmt) };
    let result = match rc {
        ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
            // SAFETY: db is valid
            Ok(unsafe { ffi::sqlite3_changes(db) } as u64)
        }
        _ => Err(step_error(db, sql)),
    };

    // SAFETY: stmt is valid
    unsafe { ffi::sqlite3_finalize(stmt) };
    result
}

fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid, errmsg returns a valid C string
    let (msg, code) = unsafe {
        let msg = CStr::from_ptr(ffi::sqlite3_errmsg(db))
            .to_string_lossy()
            .into_owned();
        (msg, ffi::sqlite3_errcode(db))
    };
    query_error(error_code_to_kind(code), sql, msg)
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    match code {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        _ => QueryErrorKind::Database,
    }
}
