//! Schema-driven encoding of [`Value`]s to and from CBOR.
//!
//! Records encode as arrays in field order and unions as `[branch index, value]`.
//! Both directions walk the value depth-first in field order, running the
//! [`DataModel`]'s conversion for every record whose schema has a logical type:
//! before its fields on write, after its fields on read.

use ciborium::Value as Cbor;
use std::sync::Arc;

use crate::conversion::{Converted, DataModel};
use crate::reference::ReferenceError;
use crate::schema::{RecordSchema, Schema, SchemaError};
use crate::value::{IndexedRecord, RecordError, RecordRef, Value};

/// Error raised while encoding or decoding datums.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("no union branch accepts a {0} value")]
    NoMatchingBranch(String),
    #[error("union branch {index} out of range ({count} branches)")]
    InvalidBranch { index: u64, count: usize },
    #[error("record {record} expects {expected} fields, found {found}")]
    FieldCount {
        record: String,
        expected: usize,
        found: usize,
    },
    #[error("encoding failed: {0}")]
    Encode(String),
    #[error("decoding failed: {0}")]
    Decode(String),
    #[error("not a chelate container")]
    BadMagic,
    #[error("schema fingerprint mismatch: header says {expected}, schema hashes to {actual}")]
    FingerprintMismatch {
        expected: blake3::Hash,
        actual: blake3::Hash,
    },
}

impl CodecError {
    fn mismatch(expected: &Schema, found: impl Into<String>) -> Self {
        CodecError::TypeMismatch {
            expected: expected.kind_name().to_string(),
            found: found.into(),
        }
    }
}

/// Serializes a CBOR datum to bytes.
pub fn encode(datum: &Cbor) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(datum, &mut bytes).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Parses one CBOR datum from bytes.
pub fn decode(bytes: &[u8]) -> Result<Cbor, CodecError> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Writes values of one schema.
pub struct DatumWriter<'m> {
    model: &'m DataModel,
    schema: &'m Schema,
}

impl<'m> DatumWriter<'m> {
    /// Creates a writer after validating `schema`.
    pub fn new(model: &'m DataModel, schema: &'m Schema) -> Result<Self, CodecError> {
        schema.validate()?;
        Ok(DatumWriter { model, schema })
    }

    pub fn write(&self, value: &Value) -> Result<Cbor, CodecError> {
        self.write_value(self.schema, value)
    }

    fn write_value(&self, schema: &Schema, value: &Value) -> Result<Cbor, CodecError> {
        match (schema, value) {
            (Schema::Null, Value::Null) => Ok(Cbor::Null),
            (Schema::Boolean, Value::Boolean(b)) => Ok(Cbor::Bool(*b)),
            (Schema::Int, Value::Int(i)) => Ok(Cbor::Integer((*i).into())),
            (Schema::Long, Value::Long(l)) => Ok(Cbor::Integer((*l).into())),
            (Schema::Double, Value::Double(d)) => Ok(Cbor::Float(*d)),
            (Schema::String, Value::String(s)) => Ok(Cbor::Text(s.clone())),
            (Schema::Bytes, Value::Bytes(b)) => Ok(Cbor::Bytes(b.clone())),
            (Schema::Array(items), Value::Array(values)) => values
                .iter()
                .map(|v| self.write_value(items, v))
                .collect::<Result<Vec<_>, _>>()
                .map(Cbor::Array),
            (Schema::Union(branches), value) => {
                let index = branches
                    .iter()
                    .position(|branch| branch.accepts(value))
                    .ok_or_else(|| CodecError::NoMatchingBranch(value.kind().to_string()))?;
                let inner = self.write_value(&branches[index], value)?;
                Ok(Cbor::Array(vec![Cbor::Integer((index as u64).into()), inner]))
            }
            (Schema::Record(record_schema), Value::Record(record)) => {
                self.write_record(record_schema, record)
            }
            (schema, value) => Err(CodecError::mismatch(schema, value.kind())),
        }
    }

    fn write_record(&self, schema: &RecordSchema, record: &RecordRef) -> Result<Cbor, CodecError> {
        let actual = record.schema();
        if actual.name() != schema.name() {
            return Err(CodecError::TypeMismatch {
                expected: format!("record {}", schema.name()),
                found: format!("record {}", actual.name()),
            });
        }
        if actual.fields().len() != schema.fields().len() {
            return Err(CodecError::FieldCount {
                record: schema.name().to_string(),
                expected: schema.fields().len(),
                found: actual.fields().len(),
            });
        }

        let converted = match self.model.conversion_for(schema) {
            Some(conversion) => conversion.to_record(record, schema)?,
            None => Converted::Unchanged,
        };
        let record: &dyn IndexedRecord = match &converted {
            Converted::Unchanged => record,
            Converted::Replaced(replacement) => replacement.as_ref(),
        };

        let mut fields = Vec::with_capacity(schema.fields().len());
        for (position, field) in schema.fields().iter().enumerate() {
            let value = record.get(position).unwrap_or(Value::Null);
            fields.push(self.write_value(field.schema(), &value)?);
        }
        Ok(Cbor::Array(fields))
    }
}

/// Reads values of one schema.
pub struct DatumReader<'m> {
    model: &'m DataModel,
    schema: &'m Schema,
}

impl<'m> DatumReader<'m> {
    /// Creates a reader after validating `schema`.
    pub fn new(model: &'m DataModel, schema: &'m Schema) -> Result<Self, CodecError> {
        schema.validate()?;
        Ok(DatumReader { model, schema })
    }

    pub fn read(&self, datum: &Cbor) -> Result<Value, CodecError> {
        self.read_value(self.schema, datum)
    }

    fn read_value(&self, schema: &Schema, datum: &Cbor) -> Result<Value, CodecError> {
        match (schema, datum) {
            (Schema::Null, Cbor::Null) => Ok(Value::Null),
            (Schema::Boolean, Cbor::Bool(b)) => Ok(Value::Boolean(*b)),
            (Schema::Int, Cbor::Integer(i)) => i32::try_from(*i)
                .map(Value::Int)
                .map_err(|_| CodecError::mismatch(schema, "out-of-range integer")),
            (Schema::Long, Cbor::Integer(i)) => i64::try_from(*i)
                .map(Value::Long)
                .map_err(|_| CodecError::mismatch(schema, "out-of-range integer")),
            (Schema::Double, Cbor::Float(d)) => Ok(Value::Double(*d)),
            (Schema::String, Cbor::Text(s)) => Ok(Value::String(s.clone())),
            (Schema::Bytes, Cbor::Bytes(b)) => Ok(Value::Bytes(b.clone())),
            (Schema::Array(items), Cbor::Array(elements)) => elements
                .iter()
                .map(|e| self.read_value(items, e))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (Schema::Union(branches), Cbor::Array(pair)) => match pair.as_slice() {
                [Cbor::Integer(index), inner] => {
                    let index = u64::try_from(*index)
                        .map_err(|_| CodecError::mismatch(schema, "negative branch index"))?;
                    let branch = usize::try_from(index)
                        .ok()
                        .and_then(|i| branches.get(i))
                        .ok_or(CodecError::InvalidBranch {
                            index,
                            count: branches.len(),
                        })?;
                    self.read_value(branch, inner)
                }
                _ => Err(CodecError::mismatch(schema, "malformed union")),
            },
            (Schema::Record(record_schema), Cbor::Array(fields)) => {
                self.read_record(record_schema, fields).map(Value::Record)
            }
            (schema, datum) => Err(CodecError::mismatch(schema, cbor_kind(datum))),
        }
    }

    fn read_record(
        &self,
        schema: &Arc<RecordSchema>,
        fields: &[Cbor],
    ) -> Result<RecordRef, CodecError> {
        if fields.len() != schema.fields().len() {
            return Err(CodecError::FieldCount {
                record: schema.name().to_string(),
                expected: schema.fields().len(),
                found: fields.len(),
            });
        }

        let record = RecordRef::new(Arc::clone(schema));
        for (position, (field, datum)) in schema.fields().iter().zip(fields).enumerate() {
            let value = self.read_value(field.schema(), datum)?;
            record.put(position, value)?;
        }

        match self.model.conversion_for(schema) {
            Some(conversion) => conversion.from_record(record, schema),
            None => Ok(record),
        }
    }
}

fn cbor_kind(datum: &Cbor) -> &'static str {
    match datum {
        Cbor::Integer(_) => "integer",
        Cbor::Bytes(_) => "bytes",
        Cbor::Float(_) => "float",
        Cbor::Text(_) => "text",
        Cbor::Bool(_) => "bool",
        Cbor::Null => "null",
        Cbor::Tag(_, _) => "tag",
        Cbor::Array(_) => "array",
        Cbor::Map(_) => "map",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(schema: &Schema, value: &Value) -> Value {
        let model = DataModel::new();
        let datum = DatumWriter::new(&model, schema).unwrap().write(value).unwrap();
        let bytes = encode(&datum).unwrap();
        let decoded = decode(&bytes).unwrap();
        DatumReader::new(&model, schema).unwrap().read(&decoded).unwrap()
    }

    fn point_schema() -> Arc<RecordSchema> {
        Arc::new(RecordSchema::new(
            "Point",
            [
                ("label", Schema::String),
                ("x", Schema::Double),
                ("tags", Schema::array(Schema::Int)),
                ("note", Schema::union([Schema::Null, Schema::String])),
                ("raw", Schema::Bytes),
                ("seen", Schema::Boolean),
            ],
        ))
    }

    #[test]
    fn record_roundtrip() {
        let schema = point_schema();
        let point = RecordRef::from_values(
            Arc::clone(&schema),
            [
                ("label", Value::from("origin")),
                ("x", Value::Double(1.5)),
                ("tags", Value::Array(vec![Value::Int(1), Value::Int(-2)])),
                ("note", Value::Null),
                ("raw", Value::Bytes(vec![0, 255])),
                ("seen", Value::Boolean(true)),
            ],
        )
        .unwrap();

        let recovered = roundtrip(&Schema::Record(schema), &Value::Record(point.clone()));
        let recovered = recovered.as_record().unwrap();

        assert!(!recovered.ptr_eq(&point));
        for name in ["label", "x", "tags", "note", "raw", "seen"] {
            assert_eq!(recovered.get_by_name(name), point.get_by_name(name), "field {name}");
        }
    }

    #[test]
    fn union_branch_selection() {
        let schema = Schema::union([Schema::Null, Schema::Long, Schema::String]);

        let datum = DatumWriter::new(&DataModel::new(), &schema)
            .unwrap()
            .write(&Value::Long(9))
            .unwrap();
        assert_eq!(datum, Cbor::Array(vec![Cbor::Integer(1.into()), Cbor::Integer(9.into())]));

        assert_eq!(roundtrip(&schema, &Value::Null), Value::Null);
        assert_eq!(roundtrip(&schema, &Value::from("text")), Value::from("text"));
    }

    #[test]
    fn union_without_matching_branch() {
        let schema = Schema::union([Schema::Null, Schema::Long]);
        let model = DataModel::new();
        let writer = DatumWriter::new(&model, &schema).unwrap();

        assert!(matches!(
            writer.write(&Value::from("text")),
            Err(CodecError::NoMatchingBranch(kind)) if kind == "string"
        ));
    }

    #[test]
    fn invalid_branch_index() {
        let schema = Schema::union([Schema::Null, Schema::Long]);
        let model = DataModel::new();
        let reader = DatumReader::new(&model, &schema).unwrap();
        let datum = Cbor::Array(vec![Cbor::Integer(5.into()), Cbor::Null]);

        assert!(matches!(
            reader.read(&datum),
            Err(CodecError::InvalidBranch { index: 5, count: 2 })
        ));
    }

    #[test]
    fn type_mismatch_on_write_and_read() {
        let model = DataModel::new();
        let writer = DatumWriter::new(&model, &Schema::Long).unwrap();
        assert!(matches!(writer.write(&Value::Int(1)), Err(CodecError::TypeMismatch { .. })));

        let reader = DatumReader::new(&model, &Schema::Int).unwrap();
        let too_big = Cbor::Integer(i64::MAX.into());
        assert!(matches!(reader.read(&too_big), Err(CodecError::TypeMismatch { .. })));
        assert!(matches!(
            reader.read(&Cbor::Text("1".into())),
            Err(CodecError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn record_shape_checked() {
        let schema = Schema::Record(point_schema());
        let other = Arc::new(RecordSchema::new("Other", [("label", Schema::String)]));
        let model = DataModel::new();
        let writer = DatumWriter::new(&model, &schema).unwrap();
        assert!(matches!(
            writer.write(&Value::Record(RecordRef::new(other))),
            Err(CodecError::TypeMismatch { .. })
        ));

        let model = DataModel::new();
        let reader = DatumReader::new(&model, &schema).unwrap();
        assert!(matches!(
            reader.read(&Cbor::Array(vec![Cbor::Text("short".into())])),
            Err(CodecError::FieldCount { expected: 6, found: 1, .. })
        ));
    }

    #[test]
    fn invalid_schema_rejected_up_front() {
        let model = DataModel::new();
        let schema = Schema::union([]);
        assert!(matches!(
            DatumWriter::new(&model, &schema),
            Err(CodecError::Schema(SchemaError::EmptyUnion))
        ));
        assert!(matches!(
            DatumReader::new(&model, &schema),
            Err(CodecError::Schema(SchemaError::EmptyUnion))
        ));
    }
}
