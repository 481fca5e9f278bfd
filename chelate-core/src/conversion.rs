use indexmap::IndexMap;
use log::debug;

use crate::codec::CodecError;
use crate::schema::RecordSchema;
use crate::value::{IndexedRecord, RecordRef};

/// Result of a write-side conversion.
pub enum Converted<'a> {
    /// Write the record as it is.
    Unchanged,
    /// Write this record in its place.
    Replaced(Box<dyn IndexedRecord + 'a>),
}

/// A hook the codec runs on every record whose schema carries the matching
/// logical type.
pub trait Conversion {
    /// Logical type name this conversion handles.
    fn logical_type_name(&self) -> &str;

    /// Read side: called once the record and all of its fields have been read.
    /// Returns the record to hand to the caller.
    fn from_record(
        &self,
        record: RecordRef,
        schema: &RecordSchema,
    ) -> Result<RecordRef, CodecError>;

    /// Write side: called before the record's fields are written. Returns the
    /// record whose fields are written in its place, if any.
    fn to_record<'a>(
        &self,
        record: &'a RecordRef,
        schema: &RecordSchema,
    ) -> Result<Converted<'a>, CodecError>;

    /// Called once a whole read session is complete.
    fn end_read(&self) -> Result<(), CodecError> {
        Ok(())
    }
}

/// The set of conversions in effect for a codec, keyed by logical type name.
#[derive(Default)]
pub struct DataModel {
    conversions: IndexMap<String, Box<dyn Conversion>>,
}

impl DataModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a conversion, replacing any previous one for the same logical type.
    pub fn add_conversion(&mut self, conversion: impl Conversion + 'static) {
        let name = conversion.logical_type_name().to_string();
        if self.conversions.insert(name.clone(), Box::new(conversion)).is_some() {
            debug!("replaced conversion for logical type {name}");
        }
    }

    pub fn conversion(&self, logical_type_name: &str) -> Option<&dyn Conversion> {
        self.conversions.get(logical_type_name).map(|c| c.as_ref())
    }

    /// The conversion for a record schema's logical type, if one is registered.
    pub fn conversion_for(&self, schema: &RecordSchema) -> Option<&dyn Conversion> {
        schema.logical_type().and_then(|name| self.conversion(name))
    }

    /// Gives every conversion a chance to report problems left at the end of a read.
    pub fn end_read(&self) -> Result<(), CodecError> {
        for conversion in self.conversions.values() {
            conversion.end_read()?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.conversions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use std::cell::Cell;

    struct Counting {
        name: &'static str,
        reads: Cell<usize>,
    }

    impl Conversion for Counting {
        fn logical_type_name(&self) -> &str {
            self.name
        }

        fn from_record(
            &self,
            record: RecordRef,
            _schema: &RecordSchema,
        ) -> Result<RecordRef, CodecError> {
            self.reads.set(self.reads.get() + 1);
            Ok(record)
        }

        fn to_record<'a>(
            &self,
            _record: &'a RecordRef,
            _schema: &RecordSchema,
        ) -> Result<Converted<'a>, CodecError> {
            Ok(Converted::Unchanged)
        }
    }

    fn counting(name: &'static str) -> Counting {
        Counting {
            name,
            reads: Cell::new(0),
        }
    }

    #[test]
    fn lookup_by_logical_type() {
        let mut model = DataModel::new();
        assert!(model.is_empty());
        model.add_conversion(counting("stamp"));

        let mut marked = RecordSchema::new("Stamp", [("millis", Schema::Long)]);
        marked.set_logical_type("stamp");
        let plain = RecordSchema::new("Plain", [("millis", Schema::Long)]);

        assert!(model.conversion_for(&marked).is_some());
        assert!(model.conversion_for(&plain).is_none());
        assert!(model.conversion("other").is_none());
        model.end_read().unwrap();
    }

    #[test]
    fn later_conversion_replaces_earlier() {
        let mut model = DataModel::new();
        model.add_conversion(counting("stamp"));
        model.add_conversion(counting("stamp"));
        assert_eq!(model.len(), 1);
    }
}
