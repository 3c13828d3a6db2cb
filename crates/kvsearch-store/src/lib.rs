//! # kvsearch-store
//!
//! Thin capability wrapper over the key-value store.
//!
//! Two primitives, both scoped to a key prefix:
//! - [`KvStore::get_prefix`]: snapshot read, returns entries plus the store
//!   revision the snapshot was taken at
//! - [`KvStore::watch_prefix`]: live change stream, optionally resuming from a
//!   revision; it ends on error or server-side cancellation and must be
//!   re-issued by the caller
//!
//! Implementations:
//! - [`EtcdStore`]: etcd v3 via `etcd-client`
//! - [`MemoryStore`]: in-process store with the same semantics, used by tests
//!   and local development

pub mod error;
pub mod etcd;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use etcd::{prefix_range_end, EtcdStore, EtcdStoreConfig};
pub use memory::MemoryStore;
pub use store::{ChangeBatch, ChangeStream, KvStore};
