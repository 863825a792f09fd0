use thiserror::Error;

/// Boxed error returned by driver implementations
pub type DriverError = Box<dyn std::error::Error + Send + Sync>;

/// sqlcopy errors
#[derive(Error, Debug)]
pub enum SqlcopyError {
    #[error("Failed to connect to database: {0}")]
    Connection(String),

    #[error("Failed to run query: {0}")]
    Query(String),

    #[error("Unsupported database URL '{url}': {message}")]
    Scheme { url: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Copy(#[from] CopyFailure),
}

/// Statement a prepare step was building
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareIntent {
    /// Full-batch insert
    Insert,
    /// Insert sized for the final partial batch
    TailInsert,
}

impl std::fmt::Display for PrepareIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrepareIntent::Insert => f.write_str("insert"),
            PrepareIntent::TailInsert => f.write_str("tail insert"),
        }
    }
}

/// Step of a copy that failed
#[derive(Error, Debug)]
pub enum CopyError {
    #[error("copy target must not be empty")]
    InvalidTarget,

    #[error("batch size must be at least 1 and small enough to number every parameter")]
    InvalidBatchSize,

    #[error("failed to fetch source rows columns: {0}")]
    SourceColumns(#[source] DriverError),

    #[error("failed to determine columns of target table '{table}': {source}")]
    SchemaDiscovery {
        table: String,
        #[source]
        source: DriverError,
    },

    #[error("failed to prepare {intent} query: {source}")]
    Prepare {
        intent: PrepareIntent,
        #[source]
        source: DriverError,
    },

    #[error("failed to fetch source column types: {0}")]
    ColumnTypes(#[source] DriverError),

    #[error("failed to scan row: {0}")]
    Scan(#[source] DriverError),

    #[error("failed to exec insert: {0}")]
    Exec(#[source] DriverError),

    #[error("failed to commit transaction: {0}")]
    Commit(#[source] DriverError),

    #[error("source cursor failed: {0}")]
    Cursor(#[source] DriverError),

    #[error("copy cancelled")]
    Cancelled,
}

/// A failed copy together with the number of rows it wrote before failing
#[derive(Error, Debug)]
#[error("{error} ({rows_written} rows written)")]
pub struct CopyFailure {
    pub rows_written: u64,
    #[source]
    pub error: CopyError,
}

impl CopyFailure {
    pub fn new(rows_written: u64, error: CopyError) -> Self {
        Self {
            rows_written,
            error,
        }
    }
}
