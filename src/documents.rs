//! Conversions between driver documents and JSON at the service boundary.

use mongodb::bson::{Bson, Document};
use serde_json::{Map, Value};

use crate::error::{ExplorerError, ExplorerResult};

/// A document as it crosses the HTTP boundary.
pub type JsonDocument = Map<String, Value>;

/// Replace top-level ObjectId values with their hex string. Everything else,
/// including identifiers nested in sub-documents or arrays, is emitted as
/// relaxed Extended JSON.
pub fn serialize_document(document: Document) -> JsonDocument {
    document
        .into_iter()
        .map(|(field, value)| {
            let value = match value {
                Bson::ObjectId(oid) => Value::String(oid.to_hex()),
                other => other.into_relaxed_extjson(),
            };
            (field, value)
        })
        .collect()
}

pub fn serialize_documents(documents: Vec<Document>) -> Vec<JsonDocument> {
    documents.into_iter().map(serialize_document).collect()
}

/// Convert a JSON object (Extended JSON accepted) into a driver document.
pub fn json_to_document(value: Value) -> Result<Document, String> {
    if !value.is_object() {
        return Err("expected a JSON object".to_string());
    }
    match Bson::try_from(value) {
        Ok(Bson::Document(document)) => Ok(document),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Parse filter text. Empty text matches everything; anything that is not a
/// JSON object is rejected before reaching the database.
pub fn parse_filter(query: &str) -> ExplorerResult<Document> {
    if query.trim().is_empty() {
        return Ok(Document::new());
    }
    let value: Value =
        serde_json::from_str(query).map_err(|e| ExplorerError::InvalidFilter(e.to_string()))?;
    json_to_document(value).map_err(ExplorerError::InvalidFilter)
}
