//! Search request handling, independent of the transport.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use kvsearch_index::{IndexEngine, IndexError};
use kvsearch_types::{SearchHit, SearchSettings};

/// Errors surfaced to search callers.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The request itself is invalid; never touches the index
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Index error: {0}")]
    Index(IndexError),
}

impl From<IndexError> for HandlerError {
    fn from(err: IndexError) -> Self {
        match err {
            // An unparsable query is the caller's mistake
            IndexError::QueryParse(e) => HandlerError::BadRequest(format!("invalid query: {}", e)),
            other => HandlerError::Index(other),
        }
    }
}

/// Validates search requests and runs them against the index.
#[derive(Clone)]
pub struct SearchHandler {
    engine: Arc<IndexEngine>,
    default_limit: usize,
    max_limit: usize,
}

impl SearchHandler {
    pub fn new(engine: Arc<IndexEngine>, settings: &SearchSettings) -> Self {
        Self {
            engine,
            default_limit: settings.default_limit.max(1),
            max_limit: settings.max_limit.max(1),
        }
    }

    /// Effective result limit for a requested one (0 = default).
    pub fn effective_limit(&self, requested: usize) -> usize {
        match requested {
            0 => self.default_limit,
            n => n.min(self.max_limit),
        }
    }

    /// Ranked hits for `query`, highest score first. No matches is an empty
    /// list, not an error.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, HandlerError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(HandlerError::BadRequest("query is required".to_string()));
        }

        let limit = self.effective_limit(limit);
        let hits = self.engine.query(query, limit)?;
        debug!(query, limit, results = hits.len(), "Search handled");
        Ok(hits)
    }
}
