//! Tantivy schema for mirrored store entries.
//!
//! Every document has:
//! - id: the store key
//! - revision: store revision of the indexed value
//! - body: all field values, tokenized for search
//! - fields_json: the field map, stored for result summaries

use tantivy::schema::{Field, Schema, STORED, STRING, TEXT};

/// Schema field handles for efficient access
#[derive(Debug, Clone)]
pub struct DocumentSchema {
    schema: Schema,
    /// Primary key (STRING | STORED)
    pub id: Field,
    /// Store revision (i64, STORED)
    pub revision: Field,
    /// Searchable text (TEXT)
    pub body: Field,
    /// JSON-encoded field map (STORED)
    pub fields_json: Field,
}

impl DocumentSchema {
    /// Get the underlying Tantivy schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

/// Build the document schema.
pub fn build_document_schema() -> DocumentSchema {
    let mut schema_builder = Schema::builder();

    let id = schema_builder.add_text_field("id", STRING | STORED);
    let revision = schema_builder.add_i64_field("revision", STORED);
    let body = schema_builder.add_text_field("body", TEXT);
    let fields_json = schema_builder.add_text_field("fields_json", STORED);

    DocumentSchema {
        schema: schema_builder.build(),
        id,
        revision,
        body,
        fields_json,
    }
}
