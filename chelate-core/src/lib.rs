//! Chelate serializes cyclic object graphs with schemas that cannot describe cycles.
//!
//! Core concepts:
//! - **Schema**: a finite tree of record, union, array and primitive types
//! - **Referenceable**: a record type whose instances carry a `long` ID
//! - **Reference**: a record type with one field that points at a referenceable
//!   record; an ID at rest, the record itself in memory
//! - **Placeholder**: a minimal referenceable record standing in for the
//!   referenced type inside the reference field's `{null, long, placeholder}` union
//! - **ReferenceManager**: one session's ID registry and pending references,
//!   exposed as two conversions for a [`DataModel`]
//!
//! # Example
//!
//! ```
//! use chelate_core::{
//!     ContainerReader, ContainerWriter, RecordRef, RecordSchema, Reference, ReferenceManager,
//!     Referenceable, LogicalType, Schema, Value,
//! };
//! use std::sync::Arc;
//!
//! let placeholder = Referenceable::new("id")
//!     .add_to_schema(RecordSchema::new("NodePlaceholder", [("id", Schema::Long)]));
//! let link = Arc::new(Reference::new("to").add_to_schema(RecordSchema::new(
//!     "Link",
//!     [("to", Schema::union([Schema::Null, Schema::Long, Schema::record(placeholder)]))],
//! )));
//! let node = Arc::new(Referenceable::new("id").add_to_schema(RecordSchema::new(
//!     "Node",
//!     [("id", Schema::Long), ("next", Schema::Record(Arc::clone(&link)))],
//! )));
//! let schema = Schema::Record(Arc::clone(&node));
//!
//! // A node whose link points back at itself.
//! let this = RecordRef::from_values(Arc::clone(&node), [("id", 1i64)]).unwrap();
//! let next = RecordRef::from_values(link, [("to", this.clone())]).unwrap();
//! this.put_by_name("next", next).unwrap();
//!
//! let write_session = ReferenceManager::new();
//! let model = write_session.data_model();
//! let mut writer = ContainerWriter::new(&model, &schema).unwrap();
//! writer.append(&Value::Record(this.clone())).unwrap();
//! let bytes = writer.finish();
//!
//! let read_session = ReferenceManager::new();
//! let reader = ContainerReader::open(&read_session.data_model(), &bytes).unwrap();
//! let copy = reader.records()[0].as_record().unwrap().clone();
//! let next = copy.get_by_name("next").unwrap();
//! let to = next.as_record().unwrap().get_by_name("to").unwrap();
//! assert!(to.as_record().unwrap().ptr_eq(&copy));
//!
//! // Break the cycles so both graphs can be dropped.
//! this.put_by_name("next", Value::Null).unwrap();
//! copy.put_by_name("next", Value::Null).unwrap();
//! ```
//!
//! # Sessions
//!
//! A session is one write or one read, typically one container. Use a fresh
//! [`ReferenceManager`] for each: IDs never carry over between sessions.
//!
//! Graphs read back with cycles are `Rc` cycles and stay alive until the caller
//! clears one of their reference fields.

mod codec;
mod container;
mod conversion;
mod marker;
mod overlay;
mod pending;
mod reference;
mod registry;
mod schema;
mod value;

pub use codec::{CodecError, DatumReader, DatumWriter, decode, encode};
pub use container::{ContainerReader, ContainerWriter, MAGIC};
pub use conversion::{Conversion, Converted, DataModel};
pub use marker::{LogicalType, Marker, Reference, Referenceable};
pub use overlay::SubstitutedRecord;
pub use pending::{Callback, PendingTable};
pub use reference::{ReferenceError, ReferenceHandler, ReferenceManager, ReferenceableTracker};
pub use registry::Registry;
pub use schema::{Field, RecordSchema, Schema, SchemaError};
pub use value::{IndexedRecord, RecordError, RecordIdentity, RecordRef, Value};
