use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::target::{insert_statement, probe_query, with_columns, Target};
use super::CopyOptions;
use crate::driver::{Connection, Cursor, ExecResult, Statement, Transaction};
use crate::error::{CopyError, CopyFailure, DriverError, PrepareIntent};
use crate::placeholder::Placeholder;
use crate::value::{Slot, Value};

/// Upper bound on the batch buffer reserved up front
const MAX_PREALLOCATED_VALUES: usize = 64 * 1024;

/// Destination handle chosen once per copy
enum WriteHandle<'c> {
    Direct(&'c dyn Connection),
    Transactional(Box<dyn Transaction + 'c>),
}

impl<'c> WriteHandle<'c> {
    /// Open a transaction, or fall back to the bare connection when the
    /// driver refuses one
    fn acquire(connection: &'c dyn Connection) -> Self {
        match connection.begin() {
            Ok(tx) => {
                debug!("Transaction opened");
                WriteHandle::Transactional(tx)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to begin transaction, falling back to non-transactional copy"
                );
                WriteHandle::Direct(connection)
            }
        }
    }

    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement + '_>, DriverError> {
        match self {
            WriteHandle::Direct(conn) => conn.prepare(sql),
            WriteHandle::Transactional(tx) => tx.prepare(sql),
        }
    }

    fn commit(self) -> Result<(), DriverError> {
        match self {
            WriteHandle::Direct(_) => Ok(()),
            WriteHandle::Transactional(tx) => {
                tx.commit()?;
                debug!("Transaction committed");
                Ok(())
            }
        }
    }
}

/// How INSERT statements are produced for a given row count
enum InsertPlan<'a> {
    Generated {
        table: String,
        columns: usize,
        placeholder: &'a Placeholder,
    },
    Literal(String),
}

impl InsertPlan<'_> {
    fn statement(&self, rows: usize) -> String {
        match self {
            InsertPlan::Generated {
                table,
                columns,
                placeholder,
            } => insert_statement(table, *columns, rows, placeholder),
            InsertPlan::Literal(sql) => sql.clone(),
        }
    }
}

/// State local to one copy invocation
struct CopyRun {
    rows_written: u64,
    rows_affected_supported: bool,
    batches: usize,
}

impl CopyRun {
    fn new() -> Self {
        Self {
            rows_written: 0,
            rows_affected_supported: true,
            batches: 0,
        }
    }

    fn fail(&self, error: CopyError) -> CopyFailure {
        CopyFailure::new(self.rows_written, error)
    }

    /// Scan every row off the cursor and insert it in batches
    fn transfer(
        &mut self,
        cursor: &mut dyn Cursor,
        handle: &WriteHandle<'_>,
        plan: &InsertPlan<'_>,
        columns: usize,
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> Result<(), CopyError> {
        ensure_active(cancel)?;
        let sql = plan.statement(batch_size);
        trace!(sql = %sql, "Preparing batch insert");
        let mut stmt = handle.prepare(&sql).map_err(|source| CopyError::Prepare {
            intent: PrepareIntent::Insert,
            source,
        })?;

        let types = cursor.column_types().map_err(CopyError::ColumnTypes)?;
        trace!(types = ?types, "Source column types");
        let mut slots = Slot::for_types(&types);

        let mut buffer: Vec<Value> =
            Vec::with_capacity(columns.saturating_mul(batch_size).min(MAX_PREALLOCATED_VALUES));
        let mut rows = 0;

        while cursor.advance() {
            ensure_active(cancel)?;
            cursor.scan(&mut slots).map_err(CopyError::Scan)?;
            buffer.extend(slots.iter_mut().map(Slot::take));
            rows += 1;

            if rows < batch_size {
                continue;
            }
            self.execute(stmt.as_mut(), &buffer)?;
            buffer.clear();
            rows = 0;
        }
        drop(stmt);

        if rows > 0 {
            ensure_active(cancel)?;
            let sql = plan.statement(rows);
            trace!(rows = rows, sql = %sql, "Preparing tail insert");
            let mut tail = handle.prepare(&sql).map_err(|source| CopyError::Prepare {
                intent: PrepareIntent::TailInsert,
                source,
            })?;
            self.execute(tail.as_mut(), &buffer)?;
        }

        Ok(())
    }

    fn execute(&mut self, stmt: &mut (dyn Statement + '_), args: &[Value]) -> Result<(), CopyError> {
        let result = stmt.execute(args).map_err(CopyError::Exec)?;
        self.batches += 1;
        self.record(result.as_ref());
        trace!(
            batch = self.batches,
            params = args.len(),
            rows_written = self.rows_written,
            "Executed insert"
        );
        Ok(())
    }

    /// Add the affected-row count of one execution
    ///
    /// The first failure to read the count disables reading it for the rest
    /// of the copy; those executions count as zero.
    fn record(&mut self, result: &dyn ExecResult) {
        if !self.rows_affected_supported {
            return;
        }
        match result.rows_affected() {
            Ok(n) => self.rows_written += n,
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to retrieve rows affected, assuming not supported by driver"
                );
                self.rows_affected_supported = false;
            }
        }
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), CopyError> {
    if cancel.is_cancelled() {
        return Err(CopyError::Cancelled);
    }
    Ok(())
}

/// Copy every row of `cursor` into `target` on `connection`
///
/// `target` is one of:
/// - a bare table name, whose columns are discovered with a zero-row query
///   through `connection`
/// - a table name with a parenthesized column list, used as is
/// - a literal `INSERT INTO ...` statement, executed once per row
///
/// Returns the number of rows the destination reported as inserted. On
/// failure the error carries the rows written before the failing step. A
/// terminal cursor error is reported after the transaction commits.
pub fn copy_rows(
    cursor: &mut dyn Cursor,
    connection: &dyn Connection,
    target: &str,
    options: &CopyOptions,
) -> Result<u64, CopyFailure> {
    if target.trim().is_empty() {
        return Err(CopyFailure::new(0, CopyError::InvalidTarget));
    }
    if options.batch_size == 0 {
        return Err(CopyFailure::new(0, CopyError::InvalidBatchSize));
    }

    let source_columns = cursor
        .columns()
        .map_err(|e| CopyFailure::new(0, CopyError::SourceColumns(e)))?;
    let columns = source_columns.len();

    let target = Target::parse(target);
    let batch_size = target.effective_batch_size(options.batch_size);
    if batch_size.checked_mul(columns).is_none() {
        return Err(CopyFailure::new(0, CopyError::InvalidBatchSize));
    }
    info!(
        copy_target = ?target,
        columns = columns,
        batch_size = batch_size,
        "Starting copy"
    );

    let plan = match target {
        Target::Statement(sql) => InsertPlan::Literal(sql),
        Target::TableWithColumns(table) => InsertPlan::Generated {
            table,
            columns,
            placeholder: &options.placeholder,
        },
        Target::Table(table) => {
            ensure_active(&options.cancel).map_err(|e| CopyFailure::new(0, e))?;
            let probe = probe_query(&table);
            debug!(sql = %probe, "Discovering target columns");
            let discovered = connection.query_columns(&probe).map_err(|source| {
                error!(table = %table, error = %source, "Failed to discover target columns");
                CopyFailure::new(
                    0,
                    CopyError::SchemaDiscovery {
                        table: table.clone(),
                        source,
                    },
                )
            })?;
            debug!(columns = ?discovered, "Discovered target columns");
            InsertPlan::Generated {
                table: with_columns(&table, &discovered),
                columns,
                placeholder: &options.placeholder,
            }
        }
    };

    let handle = WriteHandle::acquire(connection);
    let mut run = CopyRun::new();

    if let Err(e) = run.transfer(
        cursor,
        &handle,
        &plan,
        columns,
        batch_size,
        &options.cancel,
    ) {
        error!(error = %e, rows_written = run.rows_written, "Copy failed");
        return Err(run.fail(e));
    }

    ensure_active(&options.cancel).map_err(|e| run.fail(e))?;
    handle.commit().map_err(|e| {
        error!(error = %e, rows_written = run.rows_written, "Failed to commit copy");
        run.fail(CopyError::Commit(e))
    })?;

    if let Some(e) = cursor.take_error() {
        error!(error = %e, rows_written = run.rows_written, "Source cursor failed");
        return Err(run.fail(CopyError::Cursor(e)));
    }

    info!(
        rows_written = run.rows_written,
        batches = run.batches,
        "Copy complete"
    );
    Ok(run.rows_written)
}
