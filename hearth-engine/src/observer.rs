use hearth_model::Record;

use crate::options::DeleteMode;

/// Lifecycle hooks invoked after a write has been persisted.
///
/// Every method has a no-op default; implement only the events you need.
/// Observers run inline on the calling task, so keep them cheap. Writes made
/// inside a transaction are reported once it commits; bulk writes are not
/// reported per record.
pub trait RecordObserver: Send + Sync {
    /// A record was inserted. Receives the stored record as re-read.
    fn after_create(&self, record: &Record) {
        let _ = record;
    }

    /// A record was updated or restored.
    fn after_update(&self, before: &Record, after: &Record) {
        let _ = (before, after);
    }

    /// A record was soft- or hard-deleted. Receives the record as it was
    /// before deletion.
    fn after_delete(&self, record: &Record, mode: DeleteMode) {
        let _ = (record, mode);
    }
}
