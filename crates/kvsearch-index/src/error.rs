//! Index error types.

use thiserror::Error;

/// Errors that can occur during index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Tantivy index error
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// Query parse error
    #[error("Query parse error: {0}")]
    QueryParse(#[from] tantivy::query::QueryParserError),

    /// Stored field payload could not be decoded
    #[error("Stored document error: {0}")]
    StoredDocument(String),

    /// Writer lock poisoned by a panicking writer
    #[error("Index is locked: {0}")]
    IndexLocked(String),
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::StoredDocument(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexError::StoredDocument("missing id field".to_string());
        assert_eq!(err.to_string(), "Stored document error: missing id field");

        let err = IndexError::IndexLocked("poisoned".to_string());
        assert!(err.to_string().contains("locked"));
    }
}
