//! Conversion between indexed documents and Tantivy documents.

use std::collections::BTreeMap;

use tantivy::schema::Value;
use tantivy::TantivyDocument;

use kvsearch_types::{IndexedDocument, SearchHit};

use crate::error::IndexError;
use crate::schema::DocumentSchema;

/// Convert a document into its Tantivy form.
pub fn to_tantivy_doc(
    schema: &DocumentSchema,
    doc: &IndexedDocument,
) -> Result<TantivyDocument, IndexError> {
    let mut tantivy_doc = TantivyDocument::default();
    tantivy_doc.add_text(schema.id, &doc.id);
    tantivy_doc.add_i64(schema.revision, doc.revision);
    tantivy_doc.add_text(schema.body, doc.body_text());
    tantivy_doc.add_text(schema.fields_json, serde_json::to_string(&doc.fields)?);
    Ok(tantivy_doc)
}

/// Rebuild a search hit from a stored Tantivy document.
pub fn to_search_hit(
    schema: &DocumentSchema,
    doc: &TantivyDocument,
    score: f32,
) -> Result<SearchHit, IndexError> {
    let id = doc
        .get_first(schema.id)
        .and_then(|v| v.as_str())
        .ok_or_else(|| IndexError::StoredDocument("document without id".to_string()))?
        .to_string();

    let revision = doc
        .get_first(schema.revision)
        .and_then(|v| v.as_i64())
        .unwrap_or_default();

    let fields: BTreeMap<String, String> = match doc
        .get_first(schema.fields_json)
        .and_then(|v| v.as_str())
    {
        Some(json) => serde_json::from_str(json)?,
        None => BTreeMap::new(),
    };

    Ok(SearchHit {
        id,
        score,
        revision,
        fields,
    })
}
