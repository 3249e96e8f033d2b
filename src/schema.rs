//! Display-only schema inference from a sampled document.

use mongodb::bson::{Bson, Document};
use serde_json::{Map, Value};

/// Type tag shown for a field value.
pub fn type_tag(value: &Bson) -> &'static str {
    match value {
        Bson::Null | Bson::Undefined => "null",
        Bson::ObjectId(_) => "objectId",
        Bson::Array(_) => "array",
        Bson::String(_) | Bson::Symbol(_) => "string",
        Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Decimal128(_) => "number",
        Bson::Boolean(_) => "boolean",
        Bson::DateTime(_) => "date",
        _ => "object",
    }
}

/// Infer `{ field: typeTag }` from the first sampled document only; other
/// documents in the sample are not consulted. Returns pretty-printed JSON,
/// `"{}"` when there is no sample.
pub fn infer_schema(sample: Option<&Document>) -> String {
    let Some(document) = sample else {
        return "{}".to_string();
    };

    let schema: Map<String, Value> = document
        .iter()
        .map(|(field, value)| (field.clone(), Value::String(type_tag(value).to_string())))
        .collect();

    if schema.is_empty() {
        return "{}".to_string();
    }
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string())
}
