//! The `referenceable` and `reference` logical types.
//!
//! A logical type is a name plus string properties stored on a record schema.
//! Both markers here carry the name of one field of the record they annotate:
//! the field holding the record's ID, or the field holding a reference to
//! another record.

use crate::schema::{RecordSchema, Schema, SchemaError};

/// A named annotation that can be attached to a record schema.
pub trait LogicalType {
    /// The logical type name stored on the schema.
    fn name(&self) -> &'static str;

    /// Attaches this logical type and its properties to `schema`.
    fn add_to_schema(&self, schema: RecordSchema) -> RecordSchema;

    /// Checks that `schema` satisfies this logical type's constraints.
    fn validate(&self, schema: &RecordSchema) -> Result<(), SchemaError>;
}

/// Marks a record type whose instances are identified by a 64-bit ID field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referenceable {
    id_field_name: String,
}

impl Referenceable {
    pub const NAME: &'static str = "referenceable";
    pub const ID_FIELD_NAME: &'static str = "id-field-name";

    pub fn new(id_field_name: impl Into<String>) -> Self {
        Referenceable {
            id_field_name: id_field_name.into(),
        }
    }

    /// Reconstructs the marker from the properties of an annotated schema.
    pub fn from_schema(schema: &RecordSchema) -> Result<Self, SchemaError> {
        schema
            .prop(Self::ID_FIELD_NAME)
            .map(Self::new)
            .ok_or_else(|| SchemaError::MissingProperty {
                record: schema.name().to_string(),
                logical_type: Self::NAME.to_string(),
                property: Self::ID_FIELD_NAME,
            })
    }

    pub fn id_field_name(&self) -> &str {
        &self.id_field_name
    }

    /// Position of the ID field in `schema`; the field must exist and be a long.
    pub fn id_position(&self, schema: &RecordSchema) -> Result<usize, SchemaError> {
        match schema.field(&self.id_field_name) {
            Some((position, field)) if *field.schema() == Schema::Long => Ok(position),
            _ => Err(SchemaError::InvalidIdField {
                record: schema.name().to_string(),
                field: self.id_field_name.clone(),
            }),
        }
    }
}

impl LogicalType for Referenceable {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn add_to_schema(&self, mut schema: RecordSchema) -> RecordSchema {
        schema.set_logical_type(Self::NAME);
        schema.add_prop(Self::ID_FIELD_NAME, self.id_field_name.clone());
        schema
    }

    fn validate(&self, schema: &RecordSchema) -> Result<(), SchemaError> {
        self.id_position(schema).map(|_| ())
    }
}

/// Marks a record type with a field that points at a referenceable record.
///
/// At rest the field holds the target's ID; in memory it holds the target
/// record itself. The field's schema must therefore be a union that admits
/// both `null` and `long` as well as a placeholder record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    ref_field_name: String,
}

impl Reference {
    pub const NAME: &'static str = "reference";
    pub const REF_FIELD_NAME: &'static str = "ref-field-name";

    pub fn new(ref_field_name: impl Into<String>) -> Self {
        Reference {
            ref_field_name: ref_field_name.into(),
        }
    }

    /// Reconstructs the marker from the properties of an annotated schema.
    pub fn from_schema(schema: &RecordSchema) -> Result<Self, SchemaError> {
        schema
            .prop(Self::REF_FIELD_NAME)
            .map(Self::new)
            .ok_or_else(|| SchemaError::MissingProperty {
                record: schema.name().to_string(),
                logical_type: Self::NAME.to_string(),
                property: Self::REF_FIELD_NAME,
            })
    }

    pub fn ref_field_name(&self) -> &str {
        &self.ref_field_name
    }

    pub fn ref_position(&self, schema: &RecordSchema) -> Result<usize, SchemaError> {
        schema
            .position(&self.ref_field_name)
            .ok_or_else(|| SchemaError::InvalidReferenceField {
                record: schema.name().to_string(),
                field: self.ref_field_name.clone(),
            })
    }
}

impl LogicalType for Reference {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn add_to_schema(&self, mut schema: RecordSchema) -> RecordSchema {
        schema.set_logical_type(Self::NAME);
        schema.add_prop(Self::REF_FIELD_NAME, self.ref_field_name.clone());
        schema
    }

    fn validate(&self, schema: &RecordSchema) -> Result<(), SchemaError> {
        self.ref_position(schema).map(|_| ())
    }
}

/// The marker attached to a record schema, if it is one of ours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Referenceable(Referenceable),
    Reference(Reference),
}

impl Marker {
    /// Reads the marker attached to `schema`.
    ///
    /// Returns `Ok(None)` for records without a logical type and for logical
    /// types this crate does not know about.
    pub fn of(schema: &RecordSchema) -> Result<Option<Marker>, SchemaError> {
        match schema.logical_type() {
            Some(Referenceable::NAME) => {
                Referenceable::from_schema(schema).map(|m| Some(Marker::Referenceable(m)))
            }
            Some(Reference::NAME) => {
                Reference::from_schema(schema).map(|m| Some(Marker::Reference(m)))
            }
            _ => Ok(None),
        }
    }

    fn as_logical_type(&self) -> &dyn LogicalType {
        match self {
            Marker::Referenceable(marker) => marker as &dyn LogicalType,
            Marker::Reference(marker) => marker,
        }
    }
}

/// Validates the logical type attached to a record, if any.
pub(crate) fn validate_record(schema: &RecordSchema) -> Result<(), SchemaError> {
    match Marker::of(schema)? {
        Some(marker) => marker.as_logical_type().validate(schema),
        None => Ok(()),
    }
}
