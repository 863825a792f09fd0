use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue, ValueRef};
use rusqlite::{params_from_iter, Rows};
use tracing::{debug, trace};

use super::{Connection, Cursor, ExecResult, RowsAffected, Statement, Transaction};
use crate::error::{DriverError, SqlcopyError};
use crate::value::{ScanType, Slot, Value};

/// SQLite destination connection
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Open from a `sqlite:` URL, e.g. `sqlite::memory:` or `sqlite:/tmp/app.db`
    pub fn open(url: &str) -> Result<Self, SqlcopyError> {
        let path = sqlite_path(url);
        debug!(path = ?path, "Opening SQLite database");

        let conn = rusqlite::Connection::open(path).map_err(|e| {
            SqlcopyError::Connection(format!("Failed to open SQLite database {}: {}", path, e))
        })?;
        Ok(Self::new(conn))
    }

    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }
}

/// Strip the scheme and an optional `//` from a SQLite URL
pub fn sqlite_path(url: &str) -> &str {
    let rest = url.split_once(':').map(|(_, rest)| rest).unwrap_or(url);
    rest.strip_prefix("//").unwrap_or(rest)
}

impl Connection for SqliteConnection {
    fn query_columns(&self, sql: &str) -> Result<Vec<String>, DriverError> {
        trace!(sql = %sql, "Querying columns");
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([])?;
        while rows.next()?.is_some() {}
        Ok(columns)
    }

    fn begin(&self) -> Result<Box<dyn Transaction + '_>, DriverError> {
        let tx = self.conn.unchecked_transaction()?;
        Ok(Box::new(SqliteTransaction { tx }))
    }

    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement + '_>, DriverError> {
        let stmt = self.conn.prepare(sql)?;
        Ok(Box::new(SqliteStatement { stmt }))
    }
}

/// Rolls back on drop unless committed
struct SqliteTransaction<'c> {
    tx: rusqlite::Transaction<'c>,
}

impl Transaction for SqliteTransaction<'_> {
    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement + '_>, DriverError> {
        let stmt = self.tx.prepare(sql)?;
        Ok(Box::new(SqliteStatement { stmt }))
    }

    fn commit(self: Box<Self>) -> Result<(), DriverError> {
        self.tx.commit()?;
        Ok(())
    }
}

struct SqliteStatement<'c> {
    stmt: rusqlite::Statement<'c>,
}

impl Statement for SqliteStatement<'_> {
    fn execute(&mut self, args: &[Value]) -> Result<Box<dyn ExecResult>, DriverError> {
        let changed = self.stmt.execute(params_from_iter(args.iter()))?;
        Ok(Box::new(RowsAffected(changed as u64)))
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let output = match self {
            Value::Null => ToSqlOutput::Owned(SqliteValue::Null),
            Value::Bool(v) => ToSqlOutput::Owned(SqliteValue::Integer(i64::from(*v))),
            Value::Int(v) => ToSqlOutput::Owned(SqliteValue::Integer(*v)),
            Value::Float(v) => ToSqlOutput::Owned(SqliteValue::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Bytes(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v.as_slice())),
        };
        Ok(output)
    }
}

impl From<SqliteValue> for Value {
    fn from(v: SqliteValue) -> Self {
        match v {
            SqliteValue::Null => Value::Null,
            SqliteValue::Integer(i) => Value::Int(i),
            SqliteValue::Real(f) => Value::Float(f),
            SqliteValue::Text(s) => Value::Text(s),
            SqliteValue::Blob(b) => Value::Bytes(b),
        }
    }
}

/// Streaming cursor over a prepared SQLite statement
///
/// SQLite is dynamically typed, so every column scans as [`ScanType::Any`].
pub struct SqliteCursor<'s> {
    rows: Rows<'s>,
    columns: Vec<String>,
    current: Vec<SqliteValue>,
    error: Option<rusqlite::Error>,
}

impl<'s> SqliteCursor<'s> {
    /// Run `stmt` without parameters and stream its rows
    pub fn query(stmt: &'s mut rusqlite::Statement<'_>) -> Result<Self, SqlcopyError> {
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt
            .query([])
            .map_err(|e| SqlcopyError::Query(format!("source query: {}", e)))?;

        Ok(Self {
            rows,
            columns,
            current: Vec::new(),
            error: None,
        })
    }
}

impl Cursor for SqliteCursor<'_> {
    fn columns(&self) -> Result<Vec<String>, DriverError> {
        Ok(self.columns.clone())
    }

    fn column_types(&self) -> Result<Vec<ScanType>, DriverError> {
        Ok(vec![ScanType::Any; self.columns.len()])
    }

    fn advance(&mut self) -> bool {
        let row = match self.rows.next() {
            Ok(Some(row)) => row,
            Ok(None) => return false,
            Err(e) => {
                self.error = Some(e);
                return false;
            }
        };

        self.current.clear();
        for i in 0..self.columns.len() {
            match row.get::<_, SqliteValue>(i) {
                Ok(v) => self.current.push(v),
                Err(e) => {
                    self.error = Some(e);
                    return false;
                }
            }
        }
        true
    }

    fn scan(&mut self, slots: &mut [Slot]) -> Result<(), DriverError> {
        if slots.len() != self.current.len() {
            return Err(format!(
                "expected {} destination slots, got {}",
                self.current.len(),
                slots.len()
            )
            .into());
        }
        for (slot, value) in slots.iter_mut().zip(self.current.drain(..)) {
            slot.set(value.into())?;
        }
        Ok(())
    }

    fn take_error(&mut self) -> Option<DriverError> {
        self.error.take().map(|e| Box::new(e) as DriverError)
    }
}
