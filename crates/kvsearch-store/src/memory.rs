//! In-process store with etcd-like semantics.
//!
//! Every write bumps a global revision. Watchers receive changes in revision
//! order and may resume from a past revision as long as it has not been
//! compacted. Tests use the failure switches to simulate outages and dropped
//! watch streams.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::mpsc;
use tracing::debug;

use kvsearch_types::{ChangeEvent, Revision, Snapshot, StoredEntry};

use crate::error::StoreError;
use crate::store::{ChangeBatch, ChangeStream, KvStore};

struct WatchSubscriber {
    prefix: String,
    sender: mpsc::UnboundedSender<Result<ChangeBatch, StoreError>>,
}

#[derive(Default)]
struct Inner {
    data: BTreeMap<String, StoredEntry>,
    revision: Revision,
    compacted: Revision,
    history: Vec<ChangeEvent>,
    watchers: Vec<WatchSubscriber>,
    unavailable: bool,
}

impl Inner {
    fn record(&mut self, event: ChangeEvent) {
        self.watchers.retain(|w| {
            if !event.key.starts_with(&w.prefix) {
                return true;
            }
            w.sender.send(Ok(vec![event.clone()])).is_ok()
        });
        self.history.push(event);
    }
}

/// Store kept entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write a key and return the new revision.
    pub fn put(&self, key: &str, value: impl Into<Vec<u8>>) -> Revision {
        let mut inner = self.lock();
        inner.revision += 1;
        let revision = inner.revision;
        let entry = StoredEntry::new(key, value, revision);
        inner.data.insert(key.to_string(), entry.clone());
        inner.record(ChangeEvent::put(entry.key, entry.value, revision));
        revision
    }

    /// Delete a key. Returns the revision of the delete, or None if absent.
    pub fn delete(&self, key: &str) -> Option<Revision> {
        let mut inner = self.lock();
        inner.data.remove(key)?;
        inner.revision += 1;
        let revision = inner.revision;
        inner.record(ChangeEvent::delete(key, revision));
        Some(revision)
    }

    /// Current store revision.
    pub fn revision(&self) -> Revision {
        self.lock().revision
    }

    /// Make every call fail with [`StoreError::Unavailable`] until reset.
    ///
    /// Open watch streams are terminated with an error.
    pub fn set_unavailable(&self, unavailable: bool) {
        let mut inner = self.lock();
        inner.unavailable = unavailable;
        if unavailable {
            for watcher in inner.watchers.drain(..) {
                let _ = watcher
                    .sender
                    .send(Err(StoreError::Unavailable("store went away".to_string())));
            }
        }
    }

    /// End every open watch stream without an error, as a server-side
    /// cancellation would.
    pub fn disconnect_watchers(&self) {
        let mut inner = self.lock();
        let count = inner.watchers.len();
        inner.watchers.clear();
        debug!(count, "Disconnected memory store watchers");
    }

    /// Number of live watch streams.
    pub fn watcher_count(&self) -> usize {
        let mut inner = self.lock();
        inner.watchers.retain(|w| !w.sender.is_closed());
        inner.watchers.len()
    }

    /// Discard change history before `revision`.
    pub fn compact(&self, revision: Revision) {
        let mut inner = self.lock();
        inner.history.retain(|e| e.revision >= revision);
        inner.compacted = inner.compacted.max(revision);
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get_prefix(&self, prefix: &str) -> Result<Snapshot, StoreError> {
        let inner = self.lock();
        if inner.unavailable {
            return Err(StoreError::Unavailable("store is unavailable".to_string()));
        }

        let entries = inner
            .data
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, entry)| entry.clone())
            .collect();

        Ok(Snapshot::new(inner.revision, entries))
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        start_revision: Option<Revision>,
    ) -> Result<ChangeStream, StoreError> {
        let mut inner = self.lock();
        if inner.unavailable {
            return Err(StoreError::Unavailable("store is unavailable".to_string()));
        }

        let (sender, receiver) = mpsc::unbounded_channel();

        if let Some(start) = start_revision {
            if start < inner.compacted {
                return Err(StoreError::Compacted {
                    requested: start,
                    compacted: inner.compacted,
                });
            }
            for event in inner
                .history
                .iter()
                .filter(|e| e.revision >= start && e.key.starts_with(prefix))
            {
                let _ = sender.send(Ok(vec![event.clone()]));
            }
        }

        inner.watchers.push(WatchSubscriber {
            prefix: prefix.to_string(),
            sender,
        });

        let changes = stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|item| (item, receiver))
        });
        Ok(Box::pin(changes))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
