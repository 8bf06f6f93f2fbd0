//! Values produced by schema-driven decoding

use std::sync::Arc;

use super::plan::Plan;
use crate::rbytes::{Marshal, WBuffer};
use crate::rtypes::Object;
use crate::{Error, Result};

/// A decoded member
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    /// Fixed arrays, counted arrays and sequence containers
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Record(Record),
    /// Polymorphic pointer; `None` for null
    Object(Option<Box<Object>>),
}

impl Value {
    /// Integer view of integral values, used for array counts
    pub fn as_i64(&self) -> Option<i64> {
        Some(match *self {
            Value::Bool(v) => v as i64,
            Value::I8(v) => v.into(),
            Value::U8(v) => v.into(),
            Value::I16(v) => v.into(),
            Value::U16(v) => v.into(),
            Value::I32(v) => v.into(),
            Value::U32(v) => v.into(),
            Value::I64(v) => v,
            Value::U64(v) => i64::try_from(v).ok()?,
            _ => return None,
        })
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F32(v) => Some(v.into()),
            Value::F64(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(rec) => Some(rec),
            _ => None,
        }
    }

    /// Short kind name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::U8(_) => "u8",
            Value::I16(_) => "i16",
            Value::U16(_) => "u16",
            Value::I32(_) => "i32",
            Value::U32(_) => "u32",
            Value::I64(_) => "i64",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Record(_) => "record",
            Value::Object(_) => "object",
        }
    }
}

/// An instance of a class decoded through its stored schema
///
/// Fields are held in the order of the schema members. The compiled plan
/// travels with the record so it can be written back.
#[derive(Debug, Clone)]
pub struct Record {
    pub class: String,
    pub version: i16,
    pub(crate) fields: Vec<Value>,
    pub(crate) plan: Arc<Plan>,
}

impl Record {
    /// Record of `plan`'s class with every field at its zero value
    pub fn new(plan: Arc<Plan>) -> Self {
        Self {
            class: plan.class.clone(),
            version: plan.version,
            fields: plan.default_values(),
            plan,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.plan.slot(name).and_then(|i| self.fields.get(i))
    }

    /// Replace a field value
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let slot = self
            .plan
            .slot(name)
            .ok_or_else(|| Error::InvalidArgument(format!("{} has no member {name:?}", self.class)))?;
        self.fields[slot] = value;
        Ok(())
    }

    /// `(name, value)` pairs in member order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.plan
            .field_names()
            .iter()
            .map(String::as_str)
            .zip(self.fields.iter())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn checksum(&self) -> u32 {
        self.plan.checksum
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.version == other.version && self.fields == other.fields
    }
}

impl rootio_core::Object for Record {
    fn class(&self) -> &str {
        &self.class
    }
}

impl Marshal for Record {
    fn marshal(&self, w: &mut WBuffer) -> Result<()> {
        self.plan.encode(&self.fields, w)
    }
}
