//! Recording in-memory driver for engine tests

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use tokio_util::sync::CancellationToken;

use crate::driver::{Connection, Cursor, ExecResult, Statement, Transaction};
use crate::error::DriverError;
use crate::value::{ScanType, Slot, Value};

/// Everything a [`MemoryConnection`] was asked to do
#[derive(Debug, Default)]
pub struct Log {
    pub probes: Vec<String>,
    pub prepared: Vec<String>,
    pub executions: Vec<Vec<Value>>,
    pub began: usize,
    pub commits: usize,
    pub stored: Vec<Vec<Value>>,
}

/// Destination that stores executed rows in memory
#[derive(Debug, Default)]
pub struct MemoryConnection {
    pub probe_columns: Vec<String>,
    /// Values per stored row
    pub width: usize,
    pub fail_begin: bool,
    pub fail_probe: bool,
    /// Index into the prepare log of the prepare that fails
    pub fail_prepare_at: Option<usize>,
    pub fail_exec_at: Option<usize>,
    pub fail_commit: bool,
    /// Execution index from which rows-affected reads fail
    pub fail_rows_affected_from: Option<usize>,
    pub rows_affected_calls: Rc<Cell<usize>>,
    log: RefCell<Log>,
}

impl MemoryConnection {
    pub fn new(probe_columns: &[&str]) -> Self {
        Self {
            probe_columns: probe_columns.iter().map(|c| c.to_string()).collect(),
            width: probe_columns.len(),
            ..Default::default()
        }
    }

    pub fn log(&self) -> std::cell::Ref<'_, Log> {
        self.log.borrow()
    }
}

impl Connection for MemoryConnection {
    fn query_columns(&self, sql: &str) -> Result<Vec<String>, DriverError> {
        self.log.borrow_mut().probes.push(sql.to_string());
        if self.fail_probe {
            return Err("no such table".into());
        }
        Ok(self.probe_columns.clone())
    }

    fn begin(&self) -> Result<Box<dyn Transaction + '_>, DriverError> {
        if self.fail_begin {
            return Err("transactions are not supported".into());
        }
        self.log.borrow_mut().began += 1;
        Ok(Box::new(MemoryTransaction { conn: self }))
    }

    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement + '_>, DriverError> {
        let mut log = self.log.borrow_mut();
        if self.fail_prepare_at == Some(log.prepared.len()) {
            log.prepared.push(sql.to_string());
            return Err("syntax error".into());
        }
        log.prepared.push(sql.to_string());
        Ok(Box::new(MemoryStatement { conn: self }))
    }
}

struct MemoryTransaction<'a> {
    conn: &'a MemoryConnection,
}

impl Transaction for MemoryTransaction<'_> {
    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement + '_>, DriverError> {
        self.conn.prepare(sql)
    }

    fn commit(self: Box<Self>) -> Result<(), DriverError> {
        if self.conn.fail_commit {
            return Err("database is locked".into());
        }
        self.conn.log.borrow_mut().commits += 1;
        Ok(())
    }
}

struct MemoryStatement<'a> {
    conn: &'a MemoryConnection,
}

impl Statement for MemoryStatement<'_> {
    fn execute(&mut self, args: &[Value]) -> Result<Box<dyn ExecResult>, DriverError> {
        let mut log = self.conn.log.borrow_mut();
        let index = log.executions.len();
        if self.conn.fail_exec_at == Some(index) {
            return Err("constraint violation".into());
        }
        log.executions.push(args.to_vec());

        let rows: Vec<Vec<Value>> = if self.conn.width == 0 {
            Vec::new()
        } else {
            args.chunks(self.conn.width).map(<[Value]>::to_vec).collect()
        };
        let count = rows.len() as u64;
        log.stored.extend(rows);

        Ok(Box::new(MemoryResult {
            count,
            fail: self.conn.fail_rows_affected_from.is_some_and(|from| index >= from),
            calls: Rc::clone(&self.conn.rows_affected_calls),
        }))
    }
}

struct MemoryResult {
    count: u64,
    fail: bool,
    calls: Rc<Cell<usize>>,
}

impl ExecResult for MemoryResult {
    fn rows_affected(&self) -> Result<u64, DriverError> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err("RowsAffected not supported".into());
        }
        Ok(self.count)
    }
}

/// Source cursor over fixed rows
#[derive(Debug)]
pub struct MemoryCursor {
    columns: Vec<String>,
    types: Vec<ScanType>,
    rows: VecDeque<Vec<Value>>,
    current: Vec<Value>,
    served: usize,
    error_after: Option<usize>,
    error: Option<DriverError>,
    cancel_at: Option<(usize, CancellationToken)>,
    fail_columns: bool,
    fail_column_types: bool,
}

impl MemoryCursor {
    pub fn new(columns: &[&str], types: Vec<ScanType>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            types,
            rows: rows.into(),
            current: Vec::new(),
            served: 0,
            error_after: None,
            error: None,
            cancel_at: None,
            fail_columns: false,
            fail_column_types: false,
        }
    }

    /// `n` rows of `(i, "hello")`
    pub fn pairs(n: usize) -> Self {
        let rows = (0..n)
            .map(|i| vec![Value::Int(i as i64), Value::from("hello")])
            .collect();
        Self::new(&["x", "y"], vec![ScanType::Int, ScanType::Text], rows)
    }

    /// Stop with a terminal error after serving `n` rows
    pub fn with_error_after(mut self, n: usize) -> Self {
        self.error_after = Some(n);
        self
    }

    /// Cancel `token` while advancing to row `n` (0-based)
    pub fn with_cancel_at(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_at = Some((n, token));
        self
    }

    pub fn failing_columns(mut self) -> Self {
        self.fail_columns = true;
        self
    }

    pub fn failing_column_types(mut self) -> Self {
        self.fail_column_types = true;
        self
    }
}

impl Cursor for MemoryCursor {
    fn columns(&self) -> Result<Vec<String>, DriverError> {
        if self.fail_columns {
            return Err("result set closed".into());
        }
        Ok(self.columns.clone())
    }

    fn column_types(&self) -> Result<Vec<ScanType>, DriverError> {
        if self.fail_column_types {
            return Err("column types unavailable".into());
        }
        Ok(self.types.clone())
    }

    fn advance(&mut self) -> bool {
        if let Some((n, token)) = &self.cancel_at {
            if *n == self.served {
                token.cancel();
            }
        }
        if self.error_after == Some(self.served) {
            self.error = Some("connection reset".into());
            return false;
        }
        match self.rows.pop_front() {
            Some(row) => {
                self.current = row;
                self.served += 1;
                true
            }
            None => false,
        }
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
        for (slot, value) in slots.iter_mut().zip(self.current.iter().cloned()) {
            slot.set(value)?;
        }
        Ok(())
    }

    fn take_error(&mut self) -> Option<DriverError> {
        self.error.take()
    }
}
