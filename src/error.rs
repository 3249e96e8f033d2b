//! Request-path error taxonomy and its HTTP rendering.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mongodb::error::ErrorKind;
use std::io;

pub type ExplorerResult<T> = std::result::Result<T, ExplorerError>;

#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    #[error("Missing required parameters: {0}")]
    MissingField(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid query format. Query must be a valid JSON object string: {0}")]
    InvalidFilter(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Connection refused. Check that the MongoDB server is running and reachable: {0}")]
    ConnectionRefused(String),

    #[error("Could not resolve the MongoDB host. Check the hostname or SRV record: {0}")]
    DnsResolution(String),

    #[error("Authentication failed. Check the username, password and auth source: {0}")]
    Authentication(String),

    #[error("{0}")]
    Driver(String),

    #[error("Could not generate filter")]
    Translation,
}

impl ExplorerError {
    pub fn missing(fields: &[&str]) -> Self {
        Self::MissingField(fields.join(", "))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingField(_)
            | Self::InvalidRequest(_)
            | Self::InvalidFilter(_)
            | Self::InvalidDocument(_)
            | Self::UnsupportedOperation(_) => StatusCode::BAD_REQUEST,
            Self::ConnectionRefused(_)
            | Self::DnsResolution(_)
            | Self::Authentication(_)
            | Self::Driver(_)
            | Self::Translation => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for errors raised before any database call was attempted.
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

impl From<mongodb::error::Error> for ExplorerError {
    fn from(err: mongodb::error::Error) -> Self {
        let message = err.to_string();
        match err.kind.as_ref() {
            ErrorKind::Authentication { .. } => Self::Authentication(message),
            ErrorKind::DnsResolve { .. } => Self::DnsResolution(message),
            // Malformed connection strings and names are caller input
            ErrorKind::InvalidArgument { .. } => Self::InvalidRequest(message),
            ErrorKind::Io(io_err) if io_err.kind() == io::ErrorKind::ConnectionRefused => {
                Self::ConnectionRefused(message)
            }
            ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => classify_message(message),
            _ => Self::Driver(message),
        }
    }
}

/// Classify a server selection or I/O failure by its message. Those kinds
/// wrap the underlying connection cause as text.
pub fn classify_message(message: String) -> ExplorerError {
    let lower = message.to_lowercase();
    if lower.contains("connection refused") || lower.contains("econnrefused") {
        ExplorerError::ConnectionRefused(message)
    } else if lower.contains("authentication failed") {
        ExplorerError::Authentication(message)
    } else if lower.contains("enotfound")
        || lower.contains("querysrv")
        || lower.contains("failed to lookup address")
        || lower.contains("dns resolution")
        || lower.contains("no such host")
        || lower.contains("name or service not known")
    {
        ExplorerError::DnsResolution(message)
    } else {
        ExplorerError::Driver(message)
    }
}

impl IntoResponse for ExplorerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.is_client_error() {
            tracing::debug!("Rejected request: {}", self);
        } else {
            tracing::error!("Request failed: {}", self);
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
