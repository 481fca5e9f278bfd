use log::debug;
use std::collections::HashMap;
use std::fmt;

use crate::value::{RecordError, RecordRef};

/// A deferred action waiting for the record registered under some ID.
///
/// Each callback patches one field of one record, so callbacks for the same ID
/// are independent of each other.
pub type Callback = Box<dyn FnOnce(&RecordRef) -> Result<(), RecordError>>;

/// Forward references waiting for their targets, keyed by target ID.
#[derive(Default)]
pub struct PendingTable {
    callbacks: HashMap<i64, Vec<Callback>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `callback` until a record is registered under `id`.
    pub fn defer(&mut self, id: i64, callback: Callback) {
        self.callbacks.entry(id).or_default().push(callback);
    }

    /// Runs and removes every callback waiting on `id`, in the order they were
    /// deferred. Does nothing when none are waiting.
    pub fn fire_all(&mut self, id: i64, record: &RecordRef) -> Result<(), RecordError> {
        let Some(callbacks) = self.callbacks.remove(&id) else {
            return Ok(());
        };
        debug!("resolving {} pending reference(s) to ID {id}", callbacks.len());
        for callback in callbacks {
            callback(record)?;
        }
        Ok(())
    }

    /// IDs that still have callbacks waiting, in ascending order.
    pub fn pending_ids(&self) -> Vec<i64> {
        let mut ids: Vec<_> = self.callbacks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of waiting callbacks across all IDs.
    pub fn len(&self) -> usize {
        self.callbacks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl fmt::Debug for PendingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTable")
            .field("ids", &self.pending_ids())
            .field("callbacks", &self.len())
            .finish()
    }
}
