//! Index-side records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entry::Revision;

/// The unit held in the search index.
///
/// For a given id the index holds at most one document, and its revision is
/// the highest revision seen for that id from any update path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    /// Derived from the store key
    pub id: String,

    /// Field name to indexable text
    pub fields: BTreeMap<String, String>,

    /// Revision of the entry that produced this document
    pub revision: Revision,
}

impl IndexedDocument {
    pub fn new(id: impl Into<String>, revision: Revision) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
            revision,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.fields.insert(name.into(), text.into());
        self
    }

    /// All field values joined for full-text indexing, in field-name order.
    pub fn body_text(&self) -> String {
        self.fields
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub revision: Revision,

    /// Stored fields of the matching document
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_text_is_ordered_by_field_name() {
        let doc = IndexedDocument::new("test/1", 3)
            .with_field("type", "canary")
            .with_field("status", "running");
        assert_eq!(doc.body_text(), "running\ncanary");
    }

    #[test]
    fn test_body_text_empty() {
        assert_eq!(IndexedDocument::new("test/1", 1).body_text(), "");
    }
}
