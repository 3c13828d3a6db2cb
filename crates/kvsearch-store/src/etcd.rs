//! etcd v3 store.
//!
//! Snapshot reads are paged and pinned to the revision of the first page so
//! the whole snapshot reflects one point in time.

use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{
    Client, ConnectOptions, EventType, GetOptions, KeyValue, WatchOptions, WatchResponse,
};
use futures::stream;
use tracing::{debug, info, warn};

use kvsearch_types::{ChangeEvent, EtcdSettings, Revision, Snapshot, StoredEntry};

use crate::error::StoreError;
use crate::store::{ChangeBatch, ChangeStream, KvStore};

/// Connection settings for [`EtcdStore`].
#[derive(Debug, Clone)]
pub struct EtcdStoreConfig {
    pub endpoints: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub dial_timeout: Duration,
    pub page_size: i64,
}

impl From<&EtcdSettings> for EtcdStoreConfig {
    fn from(settings: &EtcdSettings) -> Self {
        Self {
            endpoints: settings.endpoints.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            dial_timeout: Duration::from_secs(settings.dial_timeout_secs),
            page_size: settings.page_size,
        }
    }
}

/// Store backed by an etcd cluster.
///
/// The underlying client is cheap to clone; each call works on its own clone.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
    page_size: i64,
}

impl EtcdStore {
    /// Connect to the cluster.
    pub async fn connect(config: EtcdStoreConfig) -> Result<Self, StoreError> {
        let mut options = ConnectOptions::new().with_connect_timeout(config.dial_timeout);
        if let Some(user) = &config.username {
            options = options.with_user(user.clone(), config.password.clone().unwrap_or_default());
        }

        info!(endpoints = ?config.endpoints, "Connecting to etcd");
        let client = Client::connect(&config.endpoints, Some(options)).await?;

        Ok(Self {
            client,
            page_size: config.page_size.max(1),
        })
    }

    /// Write a key. Used by the seeding tool, never by the sync pipeline.
    pub async fn put(&self, key: &str, value: impl Into<Vec<u8>>) -> Result<Revision, StoreError> {
        let mut client = self.client.clone();
        let response = client.put(key, value, None).await?;
        Ok(response.header().map(|h| h.revision()).unwrap_or_default())
    }
}

#[async_trait]
impl KvStore for EtcdStore {
    async fn get_prefix(&self, prefix: &str) -> Result<Snapshot, StoreError> {
        let mut client = self.client.clone();
        let range_end = prefix_range_end(prefix.as_bytes());

        let mut entries = Vec::new();
        let mut start_key = prefix.as_bytes().to_vec();
        let mut revision: Option<Revision> = None;

        loop {
            let mut options = GetOptions::new()
                .with_range(range_end.clone())
                .with_limit(self.page_size);
            if let Some(rev) = revision {
                options = options.with_revision(rev);
            }

            let response = client.get(start_key.clone(), Some(options)).await?;
            let page_revision = response.header().map(|h| h.revision()).unwrap_or_default();
            let snapshot_revision = *revision.get_or_insert(page_revision);

            entries.extend(response.kvs().iter().filter_map(decodable));

            match response.kvs().last() {
                Some(last) if response.more() => {
                    start_key = last.key().to_vec();
                    start_key.push(0);
                    debug!(
                        fetched = entries.len(),
                        revision = snapshot_revision,
                        "Fetching next snapshot page"
                    );
                }
                _ => break,
            }
        }

        let revision = revision.unwrap_or_default();
        debug!(prefix, entries = entries.len(), revision, "Read prefix snapshot");
        Ok(Snapshot::new(revision, entries))
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        start_revision: Option<Revision>,
    ) -> Result<ChangeStream, StoreError> {
        let mut client = self.client.clone();
        let mut options = WatchOptions::new().with_prefix();
        if let Some(rev) = start_revision {
            options = options.with_start_revision(rev);
        }

        let (watcher, watch_stream) = client.watch(prefix, Some(options)).await?;
        info!(prefix, start_revision = ?start_revision, "Opened etcd watch");

        // The watcher handle travels with the stream: dropping it ends the watch.
        let changes = stream::unfold(Some((watcher, watch_stream)), move |state| async move {
            let (watcher, mut watch_stream) = state?;
            loop {
                match watch_stream.message().await {
                    Ok(Some(response)) => match to_batch(&response, start_revision) {
                        Ok(batch) if batch.is_empty() => continue,
                        Ok(batch) => return Some((Ok(batch), Some((watcher, watch_stream)))),
                        Err(e) => return Some((Err(e), None)),
                    },
                    Ok(None) => {
                        warn!("etcd watch stream closed by server");
                        return None;
                    }
                    Err(e) => return Some((Err(StoreError::from(e)), None)),
                }
            }
        });

        Ok(Box::pin(changes))
    }

    fn name(&self) -> &str {
        "etcd"
    }
}

/// First key after every key that starts with `prefix`.
///
/// An empty or all-0xff prefix has no upper bound; etcd spells that `\0`.
pub fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    vec![0]
}

fn decode_entry(key: &[u8], value: &[u8], revision: Revision) -> Result<StoredEntry, StoreError> {
    let key = std::str::from_utf8(key)
        .map_err(|_| StoreError::InvalidKey(String::from_utf8_lossy(key).into_owned()))?;
    Ok(StoredEntry::new(key, value, revision))
}

/// Entry for `kv`, or None when its key cannot be decoded. Such keys can
/// never be indexed, so they are logged and left out of reads and batches.
fn decodable(kv: &KeyValue) -> Option<StoredEntry> {
    match decode_entry(kv.key(), kv.value(), kv.mod_revision()) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!(error = %e, revision = kv.mod_revision(), "Skipping entry with undecodable key");
            None
        }
    }
}

fn to_batch(
    response: &WatchResponse,
    start_revision: Option<Revision>,
) -> Result<ChangeBatch, StoreError> {
    if response.canceled() {
        let compacted = response.compact_revision();
        return Err(if compacted > 0 {
            StoreError::Compacted {
                requested: start_revision.unwrap_or_default(),
                compacted,
            }
        } else {
            StoreError::Unavailable("watch canceled by server".to_string())
        });
    }

    let mut batch = Vec::with_capacity(response.events().len());
    for event in response.events() {
        let Some(kv) = event.kv() else {
            continue;
        };
        let Some(entry) = decodable(kv) else {
            continue;
        };
        batch.push(match event.event_type() {
            EventType::Put => ChangeEvent::put(entry.key, entry.value, entry.revision),
            EventType::Delete => ChangeEvent::delete(entry.key, entry.revision),
        });
    }
    Ok(batch)
}
