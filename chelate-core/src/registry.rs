use log::warn;
use std::collections::HashMap;

use crate::value::{RecordIdentity, RecordRef};

/// ID bookkeeping for one read or write session.
///
/// The read side maps IDs to the records read so far; the write side maps
/// record identities (not structural equality) to the IDs they were written
/// with. The write side holds on to every record it has seen, so an identity
/// stays unique for as long as the session lasts even if the caller drops
/// the record between writes. A registry must not be reused across sessions.
#[derive(Debug, Default)]
pub struct Registry {
    records: HashMap<i64, RecordRef>,
    ids: HashMap<RecordIdentity, (RecordRef, i64)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a record read under `id`. Re-registering an ID replaces the
    /// previous record.
    pub fn register_read(&mut self, id: i64, record: RecordRef) {
        let identity = record.identity();
        if let Some(previous) = self.records.insert(id, record) {
            if previous.identity() != identity {
                warn!("ID {id} re-registered by a different record; the last one wins");
            }
        }
    }

    pub fn lookup_read(&self, id: i64) -> Option<RecordRef> {
        self.records.get(&id).cloned()
    }

    /// Records the ID `record` is written with.
    pub fn record_write_id(&mut self, record: &RecordRef, id: i64) {
        self.ids.insert(record.identity(), (record.clone(), id));
    }

    pub fn lookup_write_id(&self, record: &RecordRef) -> Option<i64> {
        self.ids
            .get(&record.identity())
            .filter(|(written, _)| written.ptr_eq(record))
            .map(|(_, id)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RecordSchema, Schema};
    use std::sync::Arc;

    fn node(id: i64) -> RecordRef {
        let schema = Arc::new(RecordSchema::new("Node", [("id", Schema::Long)]));
        RecordRef::from_values(schema, [("id", id)]).unwrap()
    }

    #[test]
    fn read_side_lookup() {
        let mut registry = Registry::new();
        assert!(registry.lookup_read(1).is_none());

        let record = node(1);
        registry.register_read(1, record.clone());

        assert!(registry.lookup_read(1).unwrap().ptr_eq(&record));
        assert!(registry.lookup_read(2).is_none());
    }

    #[test]
    fn read_side_last_write_wins() {
        let mut registry = Registry::new();
        let first = node(1);
        let second = node(1);

        registry.register_read(1, first);
        registry.register_read(1, second.clone());

        assert!(registry.lookup_read(1).unwrap().ptr_eq(&second));
    }

    #[test]
    fn write_side_keyed_by_identity() {
        let mut registry = Registry::new();

        // Structurally equal but distinct records.
        let a = node(5);
        let b = node(5);
        registry.record_write_id(&a, 5);

        assert_eq!(registry.lookup_write_id(&a), Some(5));
        assert_eq!(registry.lookup_write_id(&a.clone()), Some(5));
        assert_eq!(registry.lookup_write_id(&b), None);
    }

    #[test]
    fn write_side_outlives_caller_handles() {
        let mut registry = Registry::new();
        for id in 0..50 {
            registry.record_write_id(&node(id), id);
        }

        let strangers: Vec<_> = (0..50).map(node).collect();
        assert!(strangers.iter().all(|s| registry.lookup_write_id(s).is_none()));
    }
}
