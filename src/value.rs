//! Row value data structures
//!
//! These types form the contract between drivers (produce values while
//! scanning) and the copy engine (buffers and binds them).

use std::fmt;

use thiserror::Error;

/// A single column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Short name of the value kind, used in scan errors
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Column scan type advertised by a driver
///
/// Determines what a [`Slot`] accepts when a row is scanned into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanType {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    /// Dynamically typed column, accepts any value
    Any,
    /// A type the driver cannot represent, stores the driver's type name
    Unsupported(String),
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanType::Bool => f.write_str("bool"),
            ScanType::Int => f.write_str("int"),
            ScanType::Float => f.write_str("float"),
            ScanType::Text => f.write_str("text"),
            ScanType::Bytes => f.write_str("bytes"),
            ScanType::Any => f.write_str("any"),
            ScanType::Unsupported(name) => write!(f, "unsupported type '{}'", name),
        }
    }
}

/// Failure to place a scanned value into a slot
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot scan {found} value into {expected} column")]
pub struct ScanError {
    pub expected: ScanType,
    pub found: &'static str,
}

/// Typed scratch holder for one column of the current row
#[derive(Debug, Clone)]
pub struct Slot {
    scan_type: ScanType,
    value: Value,
}

impl Slot {
    pub fn new(scan_type: ScanType) -> Self {
        Self {
            scan_type,
            value: Value::Null,
        }
    }

    /// Allocate one slot per column type
    pub fn for_types(types: &[ScanType]) -> Vec<Slot> {
        types.iter().cloned().map(Slot::new).collect()
    }

    pub fn scan_type(&self) -> &ScanType {
        &self.scan_type
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Store a raw driver value, converting it to the slot's type
    ///
    /// NULL is accepted by every supported type. Integers widen into float
    /// slots; nothing else is coerced.
    pub fn set(&mut self, raw: Value) -> Result<(), ScanError> {
        let value = match (&self.scan_type, raw) {
            (ScanType::Unsupported(_), raw) => return Err(self.mismatch(&raw)),
            (_, Value::Null) => Value::Null,
            (ScanType::Any, raw) => raw,
            (ScanType::Bool, Value::Bool(v)) => Value::Bool(v),
            (ScanType::Int, Value::Int(v)) => Value::Int(v),
            (ScanType::Float, Value::Float(v)) => Value::Float(v),
            (ScanType::Float, Value::Int(v)) => Value::Float(v as f64),
            (ScanType::Text, Value::Text(v)) => Value::Text(v),
            (ScanType::Bytes, Value::Bytes(v)) => Value::Bytes(v),
            (_, raw) => return Err(self.mismatch(&raw)),
        };
        self.value = value;
        Ok(())
    }

    /// Move the value out, leaving NULL behind
    pub fn take(&mut self) -> Value {
        std::mem::replace(&mut self.value, Value::Null)
    }

    fn mismatch(&self, raw: &Value) -> ScanError {
        ScanError {
            expected: self.scan_type.clone(),
            found: raw.kind_name(),
        }
    }
}
