use std::cell::RefCell;

use bytes::BytesMut;
use postgres::fallible_iterator::FallibleIterator;
use postgres::types::{to_sql_checked, Format, FromSql, IsNull, ToSql, Type};
use postgres::{Client, NoTls, Row, RowIter};
use tracing::{debug, trace, warn};

use super::{Connection, Cursor, ExecResult, RowsAffected, Statement, Transaction};
use crate::error::{DriverError, SqlcopyError};
use crate::value::{ScanType, Slot, Value};

/// PostgreSQL destination connection
///
/// The client sits behind a `RefCell` so transactions and statements can
/// share it through `&self`.
pub struct PostgresConnection {
    client: RefCell<Client>,
}

impl PostgresConnection {
    pub fn new(client: Client) -> Self {
        Self {
            client: RefCell::new(client),
        }
    }

    /// Connect with a `postgres://` URL or key/value connection string
    pub fn connect(params: &str) -> Result<Self, SqlcopyError> {
        let client = connect_client(params)?;
        debug!("Connected to PostgreSQL");
        Ok(Self::new(client))
    }
}

/// Open a client, accepting the `pg://` alias
pub fn connect_client(params: &str) -> Result<Client, SqlcopyError> {
    Client::connect(&postgres_params(params), NoTls)
        .map_err(|e| SqlcopyError::Connection(format!("PostgreSQL: {}", e)))
}

/// Rewrite scheme aliases the `postgres` crate does not understand
pub fn postgres_params(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("pg") => {
            format!("postgres://{}", rest)
        }
        _ => url.to_string(),
    }
}

impl Connection for PostgresConnection {
    fn query_columns(&self, sql: &str) -> Result<Vec<String>, DriverError> {
        trace!(sql = %sql, "Querying columns");
        let mut client = self.client.borrow_mut();
        let stmt = client.prepare(sql)?;
        client.query(&stmt, &[])?;
        Ok(stmt.columns().iter().map(|c| c.name().to_string()).collect())
    }

    fn begin(&self) -> Result<Box<dyn Transaction + '_>, DriverError> {
        self.client.borrow_mut().batch_execute("BEGIN")?;
        Ok(Box::new(PostgresTransaction {
            conn: self,
            committed: false,
        }))
    }

    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement + '_>, DriverError> {
        let stmt = self.client.borrow_mut().prepare(sql)?;
        Ok(Box::new(PostgresStatement {
            client: &self.client,
            stmt,
        }))
    }
}

/// Rolls back on drop unless committed
struct PostgresTransaction<'c> {
    conn: &'c PostgresConnection,
    committed: bool,
}

impl Transaction for PostgresTransaction<'_> {
    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement + '_>, DriverError> {
        self.conn.prepare(sql)
    }

    fn commit(mut self: Box<Self>) -> Result<(), DriverError> {
        self.conn.client.borrow_mut().batch_execute("COMMIT")?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PostgresTransaction<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = self.conn.client.borrow_mut().batch_execute("ROLLBACK") {
            warn!(error = %e, "Failed to roll back transaction");
        }
    }
}

struct PostgresStatement<'c> {
    client: &'c RefCell<Client>,
    stmt: postgres::Statement,
}

impl Statement for PostgresStatement<'_> {
    fn execute(&mut self, args: &[Value]) -> Result<Box<dyn ExecResult>, DriverError> {
        let types = self.stmt.params();
        if types.len() != args.len() {
            return Err(format!(
                "statement expects {} parameters, got {}",
                types.len(),
                args.len()
            )
            .into());
        }

        let params = args
            .iter()
            .zip(types)
            .map(|(value, ty)| bind(value, ty))
            .collect::<Result<Vec<_>, _>>()?;
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref()).collect();

        let changed = self.client.borrow_mut().execute(&self.stmt, &refs)?;
        Ok(Box::new(RowsAffected(changed)))
    }
}

/// Convert a value into a parameter of the type the server inferred
///
/// Values without a native binary mapping for the parameter type are sent
/// as text, and the server parses them as that type.
fn bind(value: &Value, ty: &Type) -> Result<Box<dyn ToSql + Sync>, DriverError> {
    let param: Box<dyn ToSql + Sync> = match value {
        Value::Null => null_param(ty),
        Value::Bool(v) if *ty == Type::BOOL => Box::new(*v),
        Value::Bool(v) if *ty == Type::INT2 => Box::new(i16::from(*v)),
        Value::Bool(v) if *ty == Type::INT4 => Box::new(i32::from(*v)),
        Value::Bool(v) if *ty == Type::INT8 => Box::new(i64::from(*v)),
        Value::Int(v) if *ty == Type::BOOL => match *v {
            0 => Box::new(false),
            1 => Box::new(true),
            other => return Err(format!("cannot bind integer {} as bool", other).into()),
        },
        Value::Int(v) if *ty == Type::INT2 => Box::new(i16::try_from(*v)?),
        Value::Int(v) if *ty == Type::INT4 => Box::new(i32::try_from(*v)?),
        Value::Int(v) if *ty == Type::INT8 => Box::new(*v),
        Value::Int(v) if *ty == Type::FLOAT4 => Box::new(*v as f32),
        Value::Int(v) if *ty == Type::FLOAT8 => Box::new(*v as f64),
        Value::Float(v) if *ty == Type::FLOAT4 => Box::new(*v as f32),
        Value::Float(v) if *ty == Type::FLOAT8 => Box::new(*v),
        Value::Text(v) if <String as ToSql>::accepts(ty) => Box::new(v.clone()),
        Value::Bytes(v) if *ty == Type::BYTEA => Box::new(v.clone()),
        Value::Bool(v) => Box::new(TextParam(v.to_string())),
        Value::Int(v) => Box::new(TextParam(v.to_string())),
        Value::Float(v) => Box::new(TextParam(v.to_string())),
        Value::Text(v) => Box::new(TextParam(v.clone())),
        Value::Bytes(_) => {
            return Err(format!("cannot bind bytes value to parameter of type {}", ty).into())
        }
    };
    Ok(param)
}

/// Parameter sent in text format, e.g. a `numeric` or `timestamp` literal
#[derive(Debug)]
struct TextParam(String);

impl ToSql for TextParam {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        out.extend_from_slice(self.0.as_bytes());
        Ok(IsNull::No)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

fn null_param(ty: &Type) -> Box<dyn ToSql + Sync> {
    match scan_type(ty) {
        ScanType::Bool => Box::new(None::<bool>),
        ScanType::Int if *ty == Type::INT2 => Box::new(None::<i16>),
        ScanType::Int if *ty == Type::INT4 => Box::new(None::<i32>),
        ScanType::Int => Box::new(None::<i64>),
        ScanType::Float if *ty == Type::FLOAT4 => Box::new(None::<f32>),
        ScanType::Float => Box::new(None::<f64>),
        ScanType::Bytes => Box::new(None::<Vec<u8>>),
        _ => Box::new(None::<String>),
    }
}

/// Map a PostgreSQL column type to the slot type it scans into
fn scan_type(ty: &Type) -> ScanType {
    if *ty == Type::BOOL {
        ScanType::Bool
    } else if [Type::INT2, Type::INT4, Type::INT8].contains(ty) {
        ScanType::Int
    } else if [Type::FLOAT4, Type::FLOAT8].contains(ty) {
        ScanType::Float
    } else if <String as FromSql<'_>>::accepts(ty) {
        ScanType::Text
    } else if *ty == Type::BYTEA {
        ScanType::Bytes
    } else {
        ScanType::Unsupported(ty.name().to_string())
    }
}

fn read_value(row: &Row, idx: usize, ty: &Type) -> Result<Value, DriverError> {
    let value = match scan_type(ty) {
        ScanType::Bool => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        ScanType::Int if *ty == Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| Value::Int(i64::from(v))),
        ScanType::Int if *ty == Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| Value::Int(i64::from(v))),
        ScanType::Int => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
        ScanType::Float if *ty == Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| Value::Float(f64::from(v))),
        ScanType::Float => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
        ScanType::Text => row.try_get::<_, Option<String>>(idx)?.map(Value::Text),
        ScanType::Bytes => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Bytes),
        // unsupported slots reject the NULL placeholder with a scan error
        ScanType::Any | ScanType::Unsupported(_) => None,
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Streaming cursor over a PostgreSQL query
pub struct PostgresCursor<'a> {
    rows: RowIter<'a>,
    columns: Vec<String>,
    types: Vec<Type>,
    current: Option<Row>,
    error: Option<postgres::Error>,
}

impl<'a> PostgresCursor<'a> {
    /// Run `sql` without parameters and stream its rows
    pub fn query(client: &'a mut Client, sql: &str) -> Result<Self, SqlcopyError> {
        let stmt = client
            .prepare(sql)
            .map_err(|e| SqlcopyError::Query(format!("preparing source query: {}", e)))?;

        let columns = stmt.columns().iter().map(|c| c.name().to_string()).collect();
        let types = stmt.columns().iter().map(|c| c.type_().clone()).collect();

        let rows = client
            .query_raw(&stmt, std::iter::empty::<i32>())
            .map_err(|e| SqlcopyError::Query(format!("source query: {}", e)))?;

        Ok(Self {
            rows,
            columns,
            types,
            current: None,
            error: None,
        })
    }
}

impl Cursor for PostgresCursor<'_> {
    fn columns(&self) -> Result<Vec<String>, DriverError> {
        Ok(self.columns.clone())
    }

    fn column_types(&self) -> Result<Vec<ScanType>, DriverError> {
        Ok(self.types.iter().map(scan_type).collect())
    }

    fn advance(&mut self) -> bool {
        match self.rows.next() {
            Ok(Some(row)) => {
                self.current = Some(row);
                true
            }
            Ok(None) => false,
            Err(e) => {
                self.error = Some(e);
                false
            }
        }
    }

    fn scan(&mut self, slots: &mut [Slot]) -> Result<(), DriverError> {
        let row = self.current.as_ref().ok_or("scan called before advance")?;
        if slots.len() != self.types.len() {
            return Err(format!(
                "expected {} destination slots, got {}",
                self.types.len(),
                slots.len()
            )
            .into());
        }

        for (idx, (slot, ty)) in slots.iter_mut().zip(&self.types).enumerate() {
            slot.set(read_value(row, idx, ty)?)?;
        }
        Ok(())
    }

    fn take_error(&mut self) -> Option<DriverError> {
        self.error.take().map(|e| Box::new(e) as DriverError)
    }
}
