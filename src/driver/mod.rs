//! Database driver abstraction
//!
//! The copy engine is written against these traits only. Each supported
//! database has its own feature-gated submodule implementing them.
//!
//! Handle methods take `&self`: a failed [`Connection::begin`] must leave the
//! connection usable for direct writes.

use crate::error::{DriverError, SqlcopyError};
use crate::value::{ScanType, Slot, Value};

/// Forward-only source of result rows
pub trait Cursor {
    /// Column names of the result set
    fn columns(&self) -> Result<Vec<String>, DriverError>;

    /// Scan type of each column, in column order
    fn column_types(&self) -> Result<Vec<ScanType>, DriverError>;

    /// Move to the next row. Returns false at the end of the stream or on
    /// error; the error is reported by [`Cursor::take_error`].
    fn advance(&mut self) -> bool;

    /// Scan the current row into one slot per column
    fn scan(&mut self, slots: &mut [Slot]) -> Result<(), DriverError>;

    /// Terminal error that stopped iteration, if any
    fn take_error(&mut self) -> Option<DriverError>;
}

/// Result of executing a statement
pub trait ExecResult {
    /// Number of rows the statement changed, if the driver reports it
    fn rows_affected(&self) -> Result<u64, DriverError>;
}

/// Prepared statement
pub trait Statement {
    fn execute(&mut self, args: &[Value]) -> Result<Box<dyn ExecResult>, DriverError>;
}

/// Open transaction on a destination connection
pub trait Transaction {
    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement + '_>, DriverError>;

    fn commit(self: Box<Self>) -> Result<(), DriverError>;
}

/// Destination connection
pub trait Connection {
    /// Run a query and return the column names of its result
    fn query_columns(&self, sql: &str) -> Result<Vec<String>, DriverError>;

    fn begin(&self) -> Result<Box<dyn Transaction + '_>, DriverError>;

    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement + '_>, DriverError>;
}

/// Affected-row count reported by a driver that always knows it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowsAffected(pub u64);

impl ExecResult for RowsAffected {
    fn rows_affected(&self) -> Result<u64, DriverError> {
        Ok(self.0)
    }
}

/// Database backend selected by URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Sqlite,
    Postgres,
}

impl Scheme {
    /// Resolve the backend for a database URL
    ///
    /// Accepted schemes and aliases:
    /// - `sqlite:`, `sqlite3:`, `file:` for SQLite
    /// - `postgres:`, `postgresql:`, `pg:` for PostgreSQL
    pub fn from_url(url: &str) -> Result<Self, SqlcopyError> {
        let Some((scheme, _)) = url.split_once(':') else {
            return Err(SqlcopyError::Scheme {
                url: url.to_string(),
                message: "missing scheme".to_string(),
            });
        };

        let resolved = match scheme.to_lowercase().as_str() {
            "sqlite" | "sqlite3" | "file" => Scheme::Sqlite,
            "postgres" | "postgresql" | "pg" => Scheme::Postgres,
            other => {
                return Err(SqlcopyError::Scheme {
                    url: url.to_string(),
                    message: format!("unknown scheme '{}'", other),
                })
            }
        };

        if !resolved.is_enabled() {
            return Err(SqlcopyError::Scheme {
                url: url.to_string(),
                message: format!(
                    "{} support not enabled. Rebuild with --features {}",
                    resolved.name(),
                    resolved.feature()
                ),
            });
        }

        Ok(resolved)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scheme::Sqlite => "SQLite",
            Scheme::Postgres => "PostgreSQL",
        }
    }

    fn feature(&self) -> &'static str {
        match self {
            Scheme::Sqlite => "sqlite",
            Scheme::Postgres => "postgres",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Scheme::Sqlite => cfg!(feature = "sqlite"),
            Scheme::Postgres => cfg!(feature = "postgres"),
        }
    }
}

/// Backends compiled into this build
pub fn available_schemes() -> Vec<Scheme> {
    [Scheme::Sqlite, Scheme::Postgres]
        .into_iter()
        .filter(Scheme::is_enabled)
        .collect()
}

// Feature-gated database implementations
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnection, SqliteCursor};

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::{connect_client, PostgresConnection, PostgresCursor};
