use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::schema::RecordSchema;

/// Error raised when reading or writing a record slot.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("record {record} has no field at position {position}")]
    NoSuchPosition { record: String, position: usize },
    #[error("record {record} has no field named {field}")]
    NoSuchField { record: String, field: String },
    /// Writing through a substituted view. Only a caller bug can get here.
    #[error("[BUG] write at position {position} of read-only view of record {record}")]
    ReadOnlyView { record: String, position: usize },
}

/// A generic datum, shaped by a [`crate::Schema`].
///
/// Records are shared handles: cloning a `Value::Record` shares the record,
/// and equality between records is identity, never structure. Structural
/// equality would not terminate on cyclic graphs.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Record(RecordRef),
}

impl Value {
    /// Lowercase name of this value's kind, matching [`crate::Schema::kind_name`].
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordRef> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<RecordRef> for Value {
    fn from(v: RecordRef) -> Self {
        Value::Record(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

/// Address-based identity of a record allocation.
///
/// Two handles have the same identity exactly when they share one record.
/// Identities are only meaningful while the record is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordIdentity(usize);

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Indexed access to a record's field slots.
///
/// This is the narrow capability the codec and the reference handlers need:
/// positional get and put, the record's schema, and its identity.
pub trait IndexedRecord {
    fn schema(&self) -> Arc<RecordSchema>;

    /// Returns a copy of the slot at `position` (records are copied as handles).
    fn get(&self, position: usize) -> Option<Value>;

    /// Overwrites the slot at `position`.
    fn put(&self, position: usize, value: Value) -> Result<(), RecordError>;

    fn identity(&self) -> RecordIdentity;
}

struct Record {
    schema: Arc<RecordSchema>,
    values: Vec<Value>,
}

/// A shared, mutable record.
///
/// Handles are cheap to clone and all clones see the same slots. Records that
/// point at each other form `Rc` cycles; break one reference field (for
/// example by putting `Value::Null`) to release such a graph.
#[derive(Clone)]
pub struct RecordRef(Rc<RefCell<Record>>);

impl RecordRef {
    /// Creates a record with every slot set to `Value::Null`.
    pub fn new(schema: Arc<RecordSchema>) -> Self {
        let values = vec![Value::Null; schema.fields().len()];
        RecordRef(Rc::new(RefCell::new(Record { schema, values })))
    }

    /// Creates a record and fills the named fields.
    pub fn from_values<N, V>(
        schema: Arc<RecordSchema>,
        values: impl IntoIterator<Item = (N, V)>,
    ) -> Result<Self, RecordError>
    where
        N: AsRef<str>,
        V: Into<Value>,
    {
        let record = RecordRef::new(schema);
        for (name, value) in values {
            record.put_by_name(name.as_ref(), value)?;
        }
        Ok(record)
    }

    pub fn schema(&self) -> Arc<RecordSchema> {
        Arc::clone(&self.0.borrow().schema)
    }

    pub fn get_by_name(&self, name: &str) -> Option<Value> {
        let record = self.0.borrow();
        let position = record.schema.position(name)?;
        record.values.get(position).cloned()
    }

    pub fn put_by_name(&self, name: &str, value: impl Into<Value>) -> Result<(), RecordError> {
        let schema = self.schema();
        let position = schema.position(name).ok_or_else(|| RecordError::NoSuchField {
            record: schema.name().to_string(),
            field: name.to_string(),
        })?;
        IndexedRecord::put(self, position, value.into())
    }

    /// Returns true if both handles share one record.
    pub fn ptr_eq(&self, other: &RecordRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity(Rc::as_ptr(&self.0) as *const () as usize)
    }
}

impl IndexedRecord for RecordRef {
    fn schema(&self) -> Arc<RecordSchema> {
        RecordRef::schema(self)
    }

    fn get(&self, position: usize) -> Option<Value> {
        self.0.borrow().values.get(position).cloned()
    }

    fn put(&self, position: usize, value: Value) -> Result<(), RecordError> {
        let mut record = self.0.borrow_mut();
        if position >= record.values.len() {
            return Err(RecordError::NoSuchPosition {
                record: record.schema.name().to_string(),
                position,
            });
        }
        record.values[position] = value;
        Ok(())
    }

    fn identity(&self) -> RecordIdentity {
        RecordRef::identity(self)
    }
}

// Shallow on purpose: the fields of a cyclic graph would print forever.
impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordRef({}@{})", self.0.borrow().schema.name(), self.identity())
    }
}
