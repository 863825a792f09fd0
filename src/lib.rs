//! # sqlcopy
//!
//! Copy query results between databases with batched INSERT statements
//!
//! This crate provides a CLI tool and library for streaming rows from a
//! source cursor into a destination table, working with drivers that lack
//! transactions, affected-row counts or typed columns.

pub mod config;
pub mod copy;
pub mod driver;
pub mod error;
pub mod placeholder;
pub mod value;

pub mod prelude {
    pub use crate::config::{CopyConfig, PlaceholderStyle};
    pub use crate::copy::{copy_rows, Copier, CopyOptions, Target};
    pub use crate::driver::{Connection, Cursor, ExecResult, Scheme, Statement, Transaction};
    pub use crate::error::{CopyError, CopyFailure, DriverError, SqlcopyError};
    pub use crate::placeholder::Placeholder;
    pub use crate::value::{ScanType, Slot, Value};
}

#[cfg(feature = "sqlite")]
pub use driver::{SqliteConnection, SqliteCursor};

#[cfg(feature = "postgres")]
pub use driver::{PostgresConnection, PostgresCursor};
