//! Document mapping.
//!
//! Pure and stateless: turns a stored entry into an indexable document, or a
//! deleted key into the id to remove.
//!
//! Values are interpreted as:
//! - a JSON object (value starts with `{`), flattened into dotted field names
//! - plain text otherwise, indexed under [`VALUE_FIELD`]

use std::collections::BTreeMap;

use serde_json::Value;

use crate::document::IndexedDocument;
use crate::entry::StoredEntry;
use crate::error::MapperError;

/// Field used for values that are not JSON objects.
pub const VALUE_FIELD: &str = "value";

/// Map a PUT-shaped entry to a document.
pub fn map_entry(entry: &StoredEntry) -> Result<IndexedDocument, MapperError> {
    let text = std::str::from_utf8(&entry.value)
        .map_err(|_| MapperError::malformed(&entry.key, "value is not UTF-8"))?;
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Err(MapperError::malformed(&entry.key, "value is empty"));
    }

    let fields = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        json_fields(&entry.key, trimmed)?
    } else {
        BTreeMap::from([(VALUE_FIELD.to_string(), trimmed.to_string())])
    };

    Ok(IndexedDocument {
        id: document_id(&entry.key),
        fields,
        revision: entry.revision,
    })
}

/// Map a deleted key to the id of the document to remove.
pub fn map_deletion(key: &str) -> String {
    document_id(key)
}

fn document_id(key: &str) -> String {
    key.to_string()
}

fn json_fields(key: &str, text: &str) -> Result<BTreeMap<String, String>, MapperError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| MapperError::malformed(key, format!("invalid JSON: {}", e)))?;

    let Value::Object(object) = value else {
        return Err(MapperError::malformed(key, "expected a JSON object"));
    };

    let mut fields = BTreeMap::new();
    for (name, value) in object {
        flatten_into(&mut fields, name, value);
    }

    if fields.is_empty() {
        return Err(MapperError::malformed(key, "JSON object has no indexable fields"));
    }
    Ok(fields)
}

fn flatten_into(fields: &mut BTreeMap<String, String>, path: String, value: Value) {
    match value {
        Value::Null => {}
        Value::Object(object) => {
            for (name, nested) in object {
                flatten_into(fields, format!("{}.{}", path, name), nested);
            }
        }
        Value::Array(items) => {
            let joined = items
                .into_iter()
                .filter_map(scalar_text)
                .collect::<Vec<_>>()
                .join(" ");
            if !joined.is_empty() {
                fields.insert(path, joined);
            }
        }
        scalar => {
            if let Some(text) = scalar_text(scalar) {
                fields.insert(path, text);
            }
        }
    }
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        // Nested containers inside arrays are rendered compactly
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
        Value::Null => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_value() {
        let doc = map_entry(&StoredEntry::new("a/1", "hello", 5)).unwrap();
        assert_eq!(doc.id, "a/1");
        assert_eq!(doc.revision, 5);
        assert_eq!(doc.fields.get(VALUE_FIELD).map(String::as_str), Some("hello"));
    }

    #[test]
    fn test_json_object_is_flattened() {
        let value = r#"{
            "id": 42,
            "type": "test-1",
            "enabled": true,
            "createdAt": null,
            "owner": {"team": "search", "tags": ["etcd", "bleve"]}
        }"#;
        let doc = map_entry(&StoredEntry::new("test/exp", value, 9)).unwrap();

        assert_eq!(doc.fields.get("id").unwrap(), "42");
        assert_eq!(doc.fields.get("type").unwrap(), "test-1");
        assert_eq!(doc.fields.get("enabled").unwrap(), "true");
        assert_eq!(doc.fields.get("owner.team").unwrap(), "search");
        assert_eq!(doc.fields.get("owner.tags").unwrap(), "etcd bleve");
        assert!(!doc.fields.contains_key("createdAt"));
    }

    #[test]
    fn test_non_utf8_is_malformed() {
        let entry = StoredEntry::new("a/bin", vec![0xff, 0xfe, 0x00], 1);
        let err = map_entry(&entry).unwrap_err();
        assert_eq!(err, MapperError::malformed("a/bin", "value is not UTF-8"));
    }

    #[test]
    fn test_empty_is_malformed() {
        assert!(map_entry(&StoredEntry::new("a/empty", "   ", 1)).is_err());
    }

    #[test]
    fn test_broken_json_is_malformed() {
        let err = map_entry(&StoredEntry::new("a/json", "{\"id\": ", 1)).unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn test_json_array_is_malformed() {
        let err = map_entry(&StoredEntry::new("a/arr", "[1, 2]", 1)).unwrap_err();
        assert!(err.to_string().contains("expected a JSON object"));
    }

    #[test]
    fn test_map_deletion_matches_entry_id() {
        let doc = map_entry(&StoredEntry::new("a/2", "x", 10)).unwrap();
        assert_eq!(map_deletion("a/2"), doc.id);
    }
}
