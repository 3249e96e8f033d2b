//! HTTP request and response bodies.
//! Field names follow the camelCase wire format used by the browser client.

use serde::{Deserialize, Serialize};

use crate::documents::JsonDocument;
use crate::error::{ExplorerError, ExplorerResult};

/// Treat absent and empty strings alike for required fields
fn required<'a>(value: &'a Option<String>, name: &'static str, missing: &mut Vec<&'static str>) -> &'a str {
    match value.as_deref() {
        Some(v) if !v.is_empty() => v,
        _ => {
            missing.push(name);
            ""
        }
    }
}

fn check_missing(missing: Vec<&'static str>) -> ExplorerResult<()> {
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ExplorerError::missing(&missing))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    #[serde(default)]
    pub connection_string: Option<String>,
}

impl ConnectRequest {
    pub fn connection_string(&self) -> ExplorerResult<&str> {
        let mut missing = Vec::new();
        let cs = required(&self.connection_string, "connectionString", &mut missing);
        check_missing(missing)?;
        Ok(cs)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(default)]
    pub connection_string: Option<String>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub collection_name: Option<String>,
    /// Filter as JSON text. Empty text matches every document.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub skip: Option<u64>,
}

/// Validated inputs for the query service
#[derive(Debug, Clone)]
pub struct QuerySpec<'a> {
    pub connection_string: &'a str,
    pub database: &'a str,
    pub collection: &'a str,
    pub filter: &'a str,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl QueryRequest {
    pub fn spec(&self) -> ExplorerResult<QuerySpec<'_>> {
        let mut missing = Vec::new();
        let connection_string = required(&self.connection_string, "connectionString", &mut missing);
        let database = required(&self.db_name, "dbName", &mut missing);
        let collection = required(&self.collection_name, "collectionName", &mut missing);
        if self.query.is_none() {
            missing.push("query");
        }
        check_missing(missing)?;

        Ok(QuerySpec {
            connection_string,
            database,
            collection,
            filter: self.query.as_deref().unwrap_or_default(),
            skip: self.skip,
            limit: self.limit,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CrudPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub document: Option<JsonDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrudRequest {
    #[serde(default)]
    pub connection_string: Option<String>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub collection_name: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub payload: Option<CrudPayload>,
}

pub struct CrudSpec<'a> {
    pub connection_string: &'a str,
    pub database: &'a str,
    pub collection: &'a str,
    pub operation: &'a str,
    pub payload: &'a CrudPayload,
}

impl CrudRequest {
    pub fn targets(&self) -> ExplorerResult<CrudSpec<'_>> {
        let mut missing = Vec::new();
        let connection_string = required(&self.connection_string, "connectionString", &mut missing);
        let database = required(&self.db_name, "dbName", &mut missing);
        let collection = required(&self.collection_name, "collectionName", &mut missing);
        let operation = required(&self.operation, "operation", &mut missing);
        let Some(payload) = self.payload.as_ref() else {
            missing.push("payload");
            return Err(ExplorerError::missing(&missing));
        };
        check_missing(missing)?;

        Ok(CrudSpec {
            connection_string,
            database,
            collection,
            operation,
            payload,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    #[serde(default)]
    pub natural_language_query: String,
    /// Inferred schema as JSON text
    #[serde(default)]
    pub collection_schema: String,
    #[serde(default)]
    pub collection_name: String,
}

impl TranslateRequest {
    pub fn validate(&self) -> ExplorerResult<()> {
        let mut missing = Vec::new();
        if self.natural_language_query.trim().is_empty() {
            missing.push("naturalLanguageQuery");
        }
        if self.collection_name.is_empty() {
            missing.push("collectionName");
        }
        check_missing(missing)
    }
}

/// Model suggestion. Neither field is validated or executed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSuggestion {
    pub mongo_query: String,
    pub reasoning: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_request_defaults() {
        let request: QueryRequest = serde_json::from_value(json!({
            "connectionString": "mongodb://localhost",
            "dbName": "shop",
            "collectionName": "orders",
            "query": ""
        }))
        .unwrap();
        let spec = request.spec().unwrap();
        assert_eq!(spec.database, "shop");
        assert_eq!(spec.filter, "");
        assert_eq!(spec.limit, None);
        assert_eq!(spec.skip, None);
    }

    #[test]
    fn test_query_request_reports_all_missing_fields() {
        let request: QueryRequest =
            serde_json::from_value(json!({ "connectionString": "mongodb://localhost" })).unwrap();
        let err = request.spec().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required parameters: dbName, collectionName, query"
        );
    }

    #[test]
    fn test_connect_request_empty_string_is_missing() {
        let request: ConnectRequest =
            serde_json::from_value(json!({ "connectionString": "" })).unwrap();
        assert!(matches!(
            request.connection_string(),
            Err(ExplorerError::MissingField(_))
        ));
    }

    #[test]
    fn test_crud_request_requires_payload() {
        let request: CrudRequest = serde_json::from_value(json!({
            "connectionString": "mongodb://localhost",
            "dbName": "shop",
            "collectionName": "orders",
            "operation": "deleteOne"
        }))
        .unwrap();
        assert!(request.targets().is_err());
    }

    #[test]
    fn test_translate_request_validation() {
        let request: TranslateRequest = serde_json::from_value(json!({
            "naturalLanguageQuery": "users older than 30",
            "collectionSchema": "{\"age\": \"number\"}",
            "collectionName": "users"
        }))
        .unwrap();
        assert!(request.validate().is_ok());

        let empty: TranslateRequest = serde_json::from_value(json!({})).unwrap();
        assert!(empty.validate().is_err());
    }
}
