//! Applying store changes to the index.
//!
//! Shared by the watcher (one change at a time) and the reconciler (whole
//! snapshots). Malformed values are logged and counted, never fatal.

use tracing::{debug, warn};

use kvsearch_index::{IndexEngine, IndexError, WriteOutcome};
use kvsearch_types::{map_deletion, map_entry, ChangeEvent, ChangeKind, Revision, StoredEntry};

/// Counters for one batch of writes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyStats {
    /// Writes that changed the index
    pub applied: usize,
    /// Deletes of ids with no indexed document
    pub tombstoned: usize,
    /// Writes dropped because the index already held a newer revision
    pub stale: usize,
    /// Entries whose value could not be mapped
    pub malformed: usize,
    /// Documents removed
    pub deleted: usize,
    /// Highest revision among the applied writes
    pub last_revision: Revision,
}

impl ApplyStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, outcome: WriteOutcome, revision: Revision) {
        match outcome {
            WriteOutcome::Applied => {
                self.applied += 1;
                self.last_revision = self.last_revision.max(revision);
            }
            WriteOutcome::Stale => self.stale += 1,
            WriteOutcome::Tombstoned => self.tombstoned += 1,
        }
    }

    /// Check if any write changed the index.
    pub fn has_updates(&self) -> bool {
        self.applied > 0
    }
}

/// Map and upsert one entry.
pub fn apply_entry(
    engine: &IndexEngine,
    entry: &StoredEntry,
    stats: &mut ApplyStats,
) -> Result<(), IndexError> {
    match map_entry(entry) {
        Ok(doc) => {
            let outcome = engine.upsert(doc)?;
            stats.record(outcome, entry.revision);
        }
        Err(e) => {
            warn!(key = %entry.key, revision = entry.revision, error = %e, "Skipping malformed entry");
            stats.malformed += 1;
        }
    }
    Ok(())
}

/// Remove the document for `key` as of `revision`.
pub fn apply_deletion(
    engine: &IndexEngine,
    key: &str,
    revision: Revision,
    stats: &mut ApplyStats,
) -> Result<(), IndexError> {
    let id = map_deletion(key);
    let outcome = engine.delete(&id, revision)?;
    if outcome == WriteOutcome::Applied {
        stats.deleted += 1;
    }
    stats.record(outcome, revision);
    Ok(())
}

/// Apply one change event.
pub fn apply_change(
    engine: &IndexEngine,
    event: &ChangeEvent,
    stats: &mut ApplyStats,
) -> Result<(), IndexError> {
    match event.kind {
        ChangeKind::Put => match event.as_entry() {
            Some(entry) => apply_entry(engine, &entry, stats),
            None => {
                warn!(key = %event.key, revision = event.revision, "PUT without value");
                stats.malformed += 1;
                Ok(())
            }
        },
        ChangeKind::Delete => apply_deletion(engine, &event.key, event.revision, stats),
    }
}

/// Apply a batch of change events and publish them with one commit.
pub fn apply_batch(engine: &IndexEngine, batch: &[ChangeEvent]) -> Result<ApplyStats, IndexError> {
    let mut stats = ApplyStats::new();
    for event in batch {
        apply_change(engine, event, &mut stats)?;
    }
    if stats.has_updates() {
        engine.commit()?;
    }
    debug!(
        events = batch.len(),
        applied = stats.applied,
        stale = stats.stale,
        malformed = stats.malformed,
        "Applied change batch"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvsearch_index::IndexConfig;

    fn engine() -> IndexEngine {
        IndexEngine::new(IndexConfig::default().with_memory_mb(15)).unwrap()
    }

    #[test]
    fn test_apply_batch_put_then_delete() {
        let engine = engine();
        let stats = apply_batch(
            &engine,
            &[
                ChangeEvent::put("a/1", "hello", 5),
                ChangeEvent::put("a/2", "world", 6),
                ChangeEvent::delete("a/1", 7),
            ],
        )
        .unwrap();

        assert_eq!(stats.applied, 3);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.last_revision, 7);
        assert!(engine.query("hello", 10).unwrap().is_empty());
        assert_eq!(engine.query("world", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_does_not_abort_batch() {
        let engine = engine();
        let stats = apply_batch(
            &engine,
            &[
                ChangeEvent::put("a/bad", vec![0xff, 0xfe], 1),
                ChangeEvent::put("a/good", "fine", 2),
            ],
        )
        .unwrap();

        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.applied, 1);
        assert!(engine.get("a/good").is_some());
        assert!(engine.get("a/bad").is_none());
    }

    #[test]
    fn test_stale_writes_are_counted() {
        let engine = engine();
        let mut stats = ApplyStats::new();
        apply_entry(&engine, &StoredEntry::new("a/2", "x", 10), &mut stats).unwrap();
        apply_entry(&engine, &StoredEntry::new("a/2", "old", 3), &mut stats).unwrap();
        apply_deletion(&engine, "a/2", 4, &mut stats).unwrap();

        assert_eq!(stats.applied, 1);
        assert_eq!(stats.stale, 2);
        assert_eq!(stats.deleted, 0);
    }

    #[test]
    fn test_delete_of_unindexed_key_is_not_counted_as_deleted() {
        let engine = engine();
        let stats = apply_batch(
            &engine,
            &[
                ChangeEvent::delete("a/never", 3),
                ChangeEvent::put("a/1", "hello", 4),
                ChangeEvent::delete("a/1", 5),
                ChangeEvent::delete("a/1", 6),
            ],
        )
        .unwrap();

        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.tombstoned, 2);
        assert_eq!(stats.applied, 2);
        assert_eq!(stats.last_revision, 5);
        assert_eq!(engine.revision("a/never"), Some(3));
    }
}
