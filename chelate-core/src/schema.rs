use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::marker;
use crate::value::Value;

/// Error raised while validating or (de)serializing a schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid ID field {field:?} on record {record}: expected an existing long field")]
    InvalidIdField { record: String, field: String },
    #[error("invalid field name for reference field on record {record}: {field:?}")]
    InvalidReferenceField { record: String, field: String },
    #[error("record {record} has logical type {logical_type} but no {property:?} property")]
    MissingProperty {
        record: String,
        logical_type: String,
        property: &'static str,
    },
    #[error("record {0} has no fields")]
    EmptyRecord(String),
    #[error("record {record} declares field {field} more than once")]
    DuplicateField { record: String, field: String },
    #[error("union has no branches")]
    EmptyUnion,
    #[error("union nested directly inside another union")]
    NestedUnion,
    #[error("union declares more than one {0} branch")]
    DuplicateBranch(String),
    #[error("schema encoding failed: {0}")]
    Encode(String),
    #[error("schema decoding failed: {0}")]
    Decode(String),
}

/// Type system for Chelate datums.
///
/// Schemas are trees: a record can only contain record types that were built
/// before it, so a schema can never refer to itself. Cycles between values are
/// expressed with the `referenceable`/`reference` logical types instead (see
/// [`crate::Referenceable`] and [`crate::Reference`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schema {
    Null,
    Boolean,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    Double,
    /// UTF-8 text string.
    String,
    Bytes,
    /// Homogeneous list.
    Array(Box<Schema>),
    /// One of several branches. Encodes as `[branch index, value]`.
    Union(Vec<Schema>),
    /// Record with ordered named fields. Encodes as array (field order from schema).
    Record(Arc<RecordSchema>),
}

impl Schema {
    /// Creates an array type.
    pub fn array(items: Schema) -> Self {
        Schema::Array(Box::new(items))
    }

    /// Creates a union type from its branches, in order.
    pub fn union(branches: impl IntoIterator<Item = Schema>) -> Self {
        Schema::Union(branches.into_iter().collect())
    }

    /// Wraps a record schema.
    pub fn record(record: RecordSchema) -> Self {
        Schema::Record(Arc::new(record))
    }

    /// Returns the record schema if this is a record type.
    pub fn as_record(&self) -> Option<&Arc<RecordSchema>> {
        match self {
            Schema::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Lowercase name of this schema's kind, matching [`Value::kind`].
    pub fn kind_name(&self) -> &'static str {
        match self {
            Schema::Null => "null",
            Schema::Boolean => "boolean",
            Schema::Int => "int",
            Schema::Long => "long",
            Schema::Double => "double",
            Schema::String => "string",
            Schema::Bytes => "bytes",
            Schema::Array(_) => "array",
            Schema::Union(_) => "union",
            Schema::Record(_) => "record",
        }
    }

    /// Returns true if `value` can be written with this schema.
    ///
    /// Records are matched by name only; their fields are checked while writing.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Schema::Record(schema), Value::Record(record)) => {
                record.schema().name() == schema.name()
            }
            (schema, value) => schema.kind_name() == value.kind(),
        }
    }

    /// Key under which a union branch must be unique.
    fn branch_key(&self) -> String {
        match self {
            Schema::Record(record) => format!("record {}", record.name()),
            other => other.kind_name().to_string(),
        }
    }

    /// Validates the whole schema tree, including the logical types of every record.
    pub fn validate(&self) -> Result<(), SchemaError> {
        match self {
            Schema::Array(items) => items.validate(),
            Schema::Union(branches) => {
                if branches.is_empty() {
                    return Err(SchemaError::EmptyUnion);
                }
                let mut seen = HashSet::new();
                for branch in branches {
                    if matches!(branch, Schema::Union(_)) {
                        return Err(SchemaError::NestedUnion);
                    }
                    let key = branch.branch_key();
                    if !seen.insert(key.clone()) {
                        return Err(SchemaError::DuplicateBranch(key));
                    }
                    branch.validate()?;
                }
                Ok(())
            }
            Schema::Record(record) => record.validate(),
            Schema::Null
            | Schema::Boolean
            | Schema::Int
            | Schema::Long
            | Schema::Double
            | Schema::String
            | Schema::Bytes => Ok(()),
        }
    }

    /// Serializes this schema to CBOR bytes.
    ///
    /// Logical type names and record properties are part of the encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SchemaError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes).map_err(|e| SchemaError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserializes a schema from CBOR bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, SchemaError> {
        ciborium::from_reader(data).map_err(|e| SchemaError::Decode(e.to_string()))
    }

    /// Computes the Blake3 fingerprint of this schema's CBOR encoding.
    pub fn fingerprint(&self) -> Result<blake3::Hash, SchemaError> {
        Ok(blake3::hash(&self.to_bytes()?))
    }
}

/// A named field of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    name: String,
    schema: Schema,
}

impl Field {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Field {
            name: name.into(),
            schema,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

/// A record type: ordered fields plus an optional logical type and string properties.
///
/// The logical type name and its properties are ordinary schema metadata, so
/// they survive schema serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSchema {
    name: String,
    fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    logical_type: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    props: IndexMap<String, String>,
}

impl RecordSchema {
    /// Creates a record type from field definitions.
    pub fn new<N>(name: impl Into<String>, fields: impl IntoIterator<Item = (N, Schema)>) -> Self
    where
        N: Into<String>,
    {
        RecordSchema {
            name: name.into(),
            fields: fields
                .into_iter()
                .map(|(name, schema)| Field::new(name, schema))
                .collect(),
            logical_type: None,
            props: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Looks up a field by name, returning its position and definition.
    pub fn field(&self, name: &str) -> Option<(usize, &Field)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, field)| field.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.field(name).map(|(position, _)| position)
    }

    pub fn logical_type(&self) -> Option<&str> {
        self.logical_type.as_deref()
    }

    pub fn set_logical_type(&mut self, name: impl Into<String>) {
        self.logical_type = Some(name.into());
    }

    pub fn prop(&self, key: &str) -> Option<&str> {
        self.props.get(key).map(String::as_str)
    }

    /// Sets a string property, replacing any previous value for `key`.
    pub fn add_prop(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.props.insert(key.into(), value.into());
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.fields.is_empty() {
            return Err(SchemaError::EmptyRecord(self.name.clone()));
        }
        let mut names = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    record: self.name.clone(),
                    field: field.name.clone(),
                });
            }
            field.schema.validate()?;
        }
        marker::validate_record(self)
    }
}
