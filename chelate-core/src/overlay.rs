use std::sync::Arc;

use crate::schema::RecordSchema;
use crate::value::{IndexedRecord, RecordError, RecordIdentity, Value};

/// A read-only view of a record with one slot replaced.
///
/// Used on the write path to emit a reference's ID in place of the referenced
/// record without touching the caller's record. Every position except the
/// substituted one reads through to the wrapped record; writes are rejected.
pub struct SubstitutedRecord<'a> {
    wrapped: &'a dyn IndexedRecord,
    position: usize,
    data: Value,
}

impl<'a> SubstitutedRecord<'a> {
    pub fn new(wrapped: &'a dyn IndexedRecord, position: usize, data: Value) -> Self {
        SubstitutedRecord {
            wrapped,
            position,
            data,
        }
    }
}

impl IndexedRecord for SubstitutedRecord<'_> {
    fn schema(&self) -> Arc<RecordSchema> {
        self.wrapped.schema()
    }

    fn get(&self, position: usize) -> Option<Value> {
        if position == self.position {
            Some(self.data.clone())
        } else {
            self.wrapped.get(position)
        }
    }

    fn put(&self, position: usize, _value: Value) -> Result<(), RecordError> {
        Err(RecordError::ReadOnlyView {
            record: self.wrapped.schema().name().to_string(),
            position,
        })
    }

    /// The view shares the identity of the record it wraps.
    fn identity(&self) -> RecordIdentity {
        self.wrapped.identity()
    }
}
