use log::{debug, trace};
use std::cell::RefCell;
use std::rc::Rc;

use crate::codec::CodecError;
use crate::conversion::{Conversion, Converted, DataModel};
use crate::marker::{Reference, Referenceable};
use crate::overlay::SubstitutedRecord;
use crate::pending::PendingTable;
use crate::registry::Registry;
use crate::schema::RecordSchema;
use crate::value::{IndexedRecord, RecordRef, Value};

/// Error raised while resolving references.
#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    /// A reference points at a record that was never written as referenceable
    /// in this session.
    #[error("field {field} of record {record} points to a record never written as referenceable")]
    Unresolved { record: String, field: String },
    #[error("referenceable record {record} has no long ID in field {field}")]
    MissingId { record: String, field: String },
    #[error("reference field {field} of record {record} holds an invalid {found}")]
    InvalidReference {
        record: String,
        field: String,
        found: &'static str,
    },
    /// The read finished while references were still waiting for these IDs.
    #[error("read session ended with unresolved references to IDs {ids:?}")]
    Dangling { ids: Vec<i64> },
}

#[derive(Debug, Default)]
struct Session {
    registry: RefCell<Registry>,
    pending: RefCell<PendingTable>,
}

/// Shared state for one read or one write session.
///
/// Hands out the two conversions that make up reference resolution; both see
/// the same registry and pending table. Use a fresh manager per session.
///
/// ```
/// use chelate_core::{DataModel, ReferenceManager};
///
/// let manager = ReferenceManager::new();
/// let mut model = DataModel::new();
/// model.add_conversion(manager.tracker());
/// model.add_conversion(manager.handler());
/// assert_eq!(model.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct ReferenceManager {
    session: Rc<Session>,
}

impl ReferenceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversion for records marked `referenceable`.
    pub fn tracker(&self) -> ReferenceableTracker {
        ReferenceableTracker {
            session: Rc::clone(&self.session),
        }
    }

    /// Conversion for records marked `reference`.
    pub fn handler(&self) -> ReferenceHandler {
        ReferenceHandler {
            session: Rc::clone(&self.session),
        }
    }

    /// A data model with both conversions of this session registered.
    pub fn data_model(&self) -> DataModel {
        let mut model = DataModel::new();
        model.add_conversion(self.tracker());
        model.add_conversion(self.handler());
        model
    }

    /// The record read under `id` so far in this session.
    pub fn lookup(&self, id: i64) -> Option<RecordRef> {
        self.session.registry.borrow().lookup_read(id)
    }

    /// IDs that references are still waiting for.
    pub fn pending_ids(&self) -> Vec<i64> {
        self.session.pending.borrow().pending_ids()
    }

    /// Ends the session, failing if any reference never found its target.
    pub fn finish(self) -> Result<(), ReferenceError> {
        check_dangling(&self.session)
    }
}

fn check_dangling(session: &Session) -> Result<(), ReferenceError> {
    let ids = session.pending.borrow().pending_ids();
    if ids.is_empty() {
        Ok(())
    } else {
        Err(ReferenceError::Dangling { ids })
    }
}

/// Tracks the IDs of `referenceable` records.
///
/// Read side: registers each record under its ID and resolves references that
/// were waiting for it. Write side: remembers which ID each record is written
/// with. Records pass through unchanged in both directions.
pub struct ReferenceableTracker {
    session: Rc<Session>,
}

impl ReferenceableTracker {
    fn id_of(&self, record: &dyn IndexedRecord, schema: &RecordSchema) -> Result<i64, CodecError> {
        let marker = Referenceable::from_schema(schema)?;
        let position = marker.id_position(schema)?;
        match record.get(position) {
            Some(Value::Long(id)) => Ok(id),
            _ => Err(ReferenceError::MissingId {
                record: schema.name().to_string(),
                field: marker.id_field_name().to_string(),
            }
            .into()),
        }
    }
}

impl Conversion for ReferenceableTracker {
    fn logical_type_name(&self) -> &str {
        Referenceable::NAME
    }

    fn from_record(
        &self,
        record: RecordRef,
        schema: &RecordSchema,
    ) -> Result<RecordRef, CodecError> {
        let id = self.id_of(&record, schema)?;
        debug!("registered {} with ID {id}", schema.name());
        self.session.registry.borrow_mut().register_read(id, record.clone());
        self.session.pending.borrow_mut().fire_all(id, &record)?;
        Ok(record)
    }

    fn to_record<'a>(
        &self,
        record: &'a RecordRef,
        schema: &RecordSchema,
    ) -> Result<Converted<'a>, CodecError> {
        let id = self.id_of(record, schema)?;
        trace!("writing {} {} with ID {id}", schema.name(), record.identity());
        self.session.registry.borrow_mut().record_write_id(record, id);
        Ok(Converted::Unchanged)
    }
}

/// Resolves the reference field of `reference` records.
///
/// Read side: replaces the stored ID with the record registered under it, now
/// or as soon as that record is read. Write side: emits the referenced
/// record's ID through a read-only view, leaving the caller's record intact.
pub struct ReferenceHandler {
    session: Rc<Session>,
}

fn invalid_reference(schema: &RecordSchema, marker: &Reference, found: &Value) -> CodecError {
    ReferenceError::InvalidReference {
        record: schema.name().to_string(),
        field: marker.ref_field_name().to_string(),
        found: found.kind(),
    }
    .into()
}

impl Conversion for ReferenceHandler {
    fn logical_type_name(&self) -> &str {
        Reference::NAME
    }

    fn from_record(
        &self,
        record: RecordRef,
        schema: &RecordSchema,
    ) -> Result<RecordRef, CodecError> {
        let marker = Reference::from_schema(schema)?;
        let position = marker.ref_position(schema)?;
        let field = marker.ref_field_name();

        let id = match record.get(position) {
            None | Some(Value::Null) => return Ok(record),
            Some(Value::Long(id)) => id,
            // Includes a placeholder record decoded from the data.
            Some(other) => return Err(invalid_reference(schema, &marker, &other)),
        };

        let target = self.session.registry.borrow().lookup_read(id);
        match target {
            Some(target) => {
                trace!("resolved {}.{field} to ID {id}", schema.name());
                record.put(position, Value::Record(target))?;
            }
            None => {
                debug!("deferring {}.{field} until ID {id} is read", schema.name());
                let waiting = record.clone();
                self.session.pending.borrow_mut().defer(
                    id,
                    Box::new(move |resolved| {
                        waiting.put(position, Value::Record(resolved.clone()))
                    }),
                );
            }
        }
        Ok(record)
    }

    fn to_record<'a>(
        &self,
        record: &'a RecordRef,
        schema: &RecordSchema,
    ) -> Result<Converted<'a>, CodecError> {
        let marker = Reference::from_schema(schema)?;
        let position = marker.ref_position(schema)?;

        let referenced = match record.get(position) {
            None | Some(Value::Null) | Some(Value::Long(_)) => return Ok(Converted::Unchanged),
            Some(Value::Record(referenced)) => referenced,
            Some(other) => return Err(invalid_reference(schema, &marker, &other)),
        };

        let id = self
            .session
            .registry
            .borrow()
            .lookup_write_id(&referenced)
            .ok_or_else(|| ReferenceError::Unresolved {
                record: schema.name().to_string(),
                field: marker.ref_field_name().to_string(),
            })?;
        trace!("substituting ID {id} for {}.{}", schema.name(), marker.ref_field_name());
        let view = SubstitutedRecord::new(record, position, Value::Long(id));
        Ok(Converted::Replaced(Box::new(view)))
    }

    fn end_read(&self) -> Result<(), CodecError> {
        check_dangling(&self.session).map_err(CodecError::from)
    }
}
