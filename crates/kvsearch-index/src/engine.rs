//! Index engine.
//!
//! Holds the id -> document map and the Tantivy index built from it.
//!
//! Per-id ordering: every write for an id runs while holding that id's map
//! entry, so a given id mutates atomically and different ids proceed in
//! parallel. A write only lands if its revision beats the revision already
//! recorded for the id; deletes leave a tombstone carrying their revision so
//! an older PUT arriving late cannot bring the document back.
//!
//! Visibility: writes are staged in the Tantivy writer and become searchable
//! on [`IndexEngine::commit`]. Queries run against the last committed
//! snapshot and never wait on writers.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info, trace};

use kvsearch_types::{IndexedDocument, Revision, SearchHit};

use crate::document::{to_search_hit, to_tantivy_doc};
use crate::error::IndexError;
use crate::schema::{build_document_schema, DocumentSchema};

/// Default memory budget for IndexWriter (50MB)
const DEFAULT_WRITER_MEMORY_MB: usize = 50;

/// Index engine configuration
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Memory budget for writer in MB
    pub writer_memory_mb: usize,
    /// Match query terms within edit distance 1
    pub fuzzy: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
            fuzzy: false,
        }
    }
}

impl IndexConfig {
    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.writer_memory_mb = mb;
        self
    }

    pub fn with_fuzzy(mut self, fuzzy: bool) -> Self {
        self.fuzzy = fuzzy;
        self
    }
}

/// Result of a write call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write changed the index
    Applied,
    /// A write with an equal or higher revision already landed; dropped
    Stale,
    /// Delete of an id with no live document: only its tombstone moved
    Tombstoned,
}

/// Counts reported by [`IndexEngine::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Live documents
    pub documents: usize,
    /// Deleted ids still remembered for ordering
    pub tombstones: usize,
    /// Documents visible to queries (as of the last commit)
    pub searchable: u64,
}

#[derive(Debug, Clone)]
enum Slot {
    Live(IndexedDocument),
    Tombstone(Revision),
}

impl Slot {
    fn revision(&self) -> Revision {
        match self {
            Slot::Live(doc) => doc.revision,
            Slot::Tombstone(revision) => *revision,
        }
    }
}

/// In-memory search index shared by the watcher, the scanner and the API.
pub struct IndexEngine {
    schema: DocumentSchema,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    query_parser: QueryParser,
    slots: DashMap<String, Slot>,
}

impl IndexEngine {
    /// Create an empty RAM-only index.
    pub fn new(config: IndexConfig) -> Result<Self, IndexError> {
        let schema = build_document_schema();
        let index = Index::create_in_ram(schema.schema().clone());

        let memory_budget = config.writer_memory_mb * 1024 * 1024;
        let writer = index.writer(memory_budget)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        let mut query_parser = QueryParser::for_index(&index, vec![schema.body]);
        if config.fuzzy {
            query_parser.set_field_fuzzy(schema.body, false, 1, true);
        }

        info!(
            memory_mb = config.writer_memory_mb,
            fuzzy = config.fuzzy,
            "Created in-memory search index"
        );

        Ok(Self {
            schema,
            writer: Mutex::new(writer),
            reader,
            query_parser,
            slots: DashMap::new(),
        })
    }

    fn writer(&self) -> Result<MutexGuard<'_, IndexWriter>, IndexError> {
        self.writer
            .lock()
            .map_err(|e| IndexError::IndexLocked(e.to_string()))
    }

    /// Insert or replace a document.
    ///
    /// No-op returning [`WriteOutcome::Stale`] if the id already holds a
    /// document or tombstone with `revision >= doc.revision`.
    pub fn upsert(&self, doc: IndexedDocument) -> Result<WriteOutcome, IndexError> {
        match self.slots.entry(doc.id.clone()) {
            Entry::Occupied(mut slot) => {
                let current = slot.get().revision();
                if current >= doc.revision {
                    trace!(id = %doc.id, current, incoming = doc.revision, "Dropped stale upsert");
                    return Ok(WriteOutcome::Stale);
                }
                self.replace_document(&doc)?;
                debug!(id = %doc.id, revision = doc.revision, "Updated document");
                slot.insert(Slot::Live(doc));
            }
            Entry::Vacant(slot) => {
                self.replace_document(&doc)?;
                debug!(id = %doc.id, revision = doc.revision, "Inserted document");
                slot.insert(Slot::Live(doc));
            }
        }
        Ok(WriteOutcome::Applied)
    }

    /// Remove a document.
    ///
    /// No-op returning [`WriteOutcome::Stale`] if the id holds a revision
    /// strictly greater than `revision`. Otherwise the id becomes a tombstone
    /// at `revision`: [`WriteOutcome::Applied`] when a document was removed,
    /// [`WriteOutcome::Tombstoned`] when there was none.
    pub fn delete(&self, id: &str, revision: Revision) -> Result<WriteOutcome, IndexError> {
        match self.slots.entry(id.to_string()) {
            Entry::Occupied(mut slot) => {
                let current = slot.get().revision();
                if current > revision {
                    trace!(id, current, incoming = revision, "Dropped stale delete");
                    return Ok(WriteOutcome::Stale);
                }
                let outcome = match slot.get() {
                    Slot::Live(_) => {
                        self.remove_document(id)?;
                        debug!(id, revision, "Deleted document");
                        WriteOutcome::Applied
                    }
                    Slot::Tombstone(_) => WriteOutcome::Tombstoned,
                };
                slot.insert(Slot::Tombstone(revision));
                Ok(outcome)
            }
            Entry::Vacant(slot) => {
                slot.insert(Slot::Tombstone(revision));
                Ok(WriteOutcome::Tombstoned)
            }
        }
    }

    fn replace_document(&self, doc: &IndexedDocument) -> Result<(), IndexError> {
        let tantivy_doc = to_tantivy_doc(&self.schema, doc)?;
        let writer = self.writer()?;
        writer.delete_term(Term::from_field_text(self.schema.id, &doc.id));
        writer.add_document(tantivy_doc)?;
        Ok(())
    }

    fn remove_document(&self, id: &str) -> Result<(), IndexError> {
        let writer = self.writer()?;
        writer.delete_term(Term::from_field_text(self.schema.id, id));
        Ok(())
    }

    /// Publish staged writes to queries.
    pub fn commit(&self) -> Result<u64, IndexError> {
        let opstamp = {
            let mut writer = self.writer()?;
            writer.commit()?
        };
        self.reader.reload()?;
        debug!(opstamp, "Committed index changes");
        Ok(opstamp)
    }

    /// Ranked search over the last committed state, highest score first.
    ///
    /// A blank query returns no results.
    pub fn query(&self, text: &str, limit: usize) -> Result<Vec<SearchHit>, IndexError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query = self.query_parser.parse_query(text)?;
        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit.max(1)))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            hits.push(to_search_hit(&self.schema, &doc, score)?);
        }

        debug!(query = text, results = hits.len(), "Search complete");
        Ok(hits)
    }

    /// Ids of all live documents.
    pub fn known_ids(&self) -> HashSet<String> {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Live(_)))
            .map(|slot| slot.key().clone())
            .collect()
    }

    /// Ids of live documents whose id starts with `prefix`.
    pub fn known_ids_with_prefix(&self, prefix: &str) -> HashSet<String> {
        self.slots
            .iter()
            .filter(|slot| slot.key().starts_with(prefix) && matches!(slot.value(), Slot::Live(_)))
            .map(|slot| slot.key().clone())
            .collect()
    }

    /// The live document for `id`, if any.
    pub fn get(&self, id: &str) -> Option<IndexedDocument> {
        match self.slots.get(id)?.value() {
            Slot::Live(doc) => Some(doc.clone()),
            Slot::Tombstone(_) => None,
        }
    }

    /// Highest revision recorded for `id`, live or deleted.
    pub fn revision(&self, id: &str) -> Option<Revision> {
        self.slots.get(id).map(|slot| slot.revision())
    }

    /// Forget tombstones at or below `up_to`. Returns how many were dropped.
    ///
    /// Callers must guarantee no write older than `up_to` can still arrive
    /// for those ids.
    pub fn prune_tombstones(&self, up_to: Revision) -> usize {
        let mut pruned = 0;
        self.slots.retain(|_, slot| match slot {
            Slot::Tombstone(revision) if *revision <= up_to => {
                pruned += 1;
                false
            }
            _ => true,
        });
        if pruned > 0 {
            debug!(pruned, up_to, "Pruned tombstones");
        }
        pruned
    }

    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats {
            searchable: self.reader.searcher().num_docs(),
            ..Default::default()
        };
        for slot in self.slots.iter() {
            match slot.value() {
                Slot::Live(_) => stats.documents += 1,
                Slot::Tombstone(_) => stats.tombstones += 1,
            }
        }
        stats
    }
}
