//! HTTP API: `/connect`, `/query`, `/crud`, `/translate` and `/health`.
//!
//! Each request is handled independently; no state is shared between
//! requests beyond the optional client pool inside the connector.

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{
    ConnectRequest, CrudRequest, FilterSuggestion, HealthResponse, QueryRequest, TranslateRequest,
};
use crate::connection::WriteOutcome;
use crate::documents::JsonDocument;
use crate::error::{ExplorerError, ExplorerResult};
use crate::explorer::{DatabaseDescriptor, Explorer};
use crate::translator::FilterTranslator;

#[derive(Clone)]
pub struct AppState {
    pub explorer: Arc<Explorer>,
    pub translator: Arc<dyn FilterTranslator>,
}

/// Malformed bodies are client errors in the same `{ error }` shape
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ExplorerResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ExplorerError::InvalidRequest(rejection.body_text()))
}

async fn connect(
    State(state): State<AppState>,
    payload: Result<Json<ConnectRequest>, JsonRejection>,
) -> ExplorerResult<Json<Vec<DatabaseDescriptor>>> {
    let request = body(payload)?;
    let connection_string = request.connection_string()?;
    let databases = state.explorer.introspect(connection_string).await?;
    Ok(Json(databases))
}

async fn query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> ExplorerResult<Json<Vec<JsonDocument>>> {
    let request = body(payload)?;
    let spec = request.spec()?;
    let documents = state.explorer.query(&spec).await?;
    Ok(Json(documents))
}

async fn crud(
    State(state): State<AppState>,
    payload: Result<Json<CrudRequest>, JsonRejection>,
) -> ExplorerResult<Json<WriteOutcome>> {
    let request = body(payload)?;
    let targets = request.targets()?;
    let outcome = state
        .explorer
        .mutate(
            targets.connection_string,
            targets.database,
            targets.collection,
            targets.operation,
            targets.payload,
        )
        .await?;
    Ok(Json(outcome))
}

async fn translate(
    State(state): State<AppState>,
    payload: Result<Json<TranslateRequest>, JsonRejection>,
) -> ExplorerResult<Json<FilterSuggestion>> {
    let request = body(payload)?;
    request.validate()?;
    let suggestion = state.translator.translate(&request).await?;
    Ok(Json(suggestion))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Builds CORS layer from allowed origins. Invalid origins are skipped.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new();
    }
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let mut valid_origins = Vec::with_capacity(origins.len());
    for origin in origins {
        match origin.parse::<HeaderValue>() {
            Ok(value) => valid_origins.push(value),
            Err(e) => tracing::warn!("Ignoring invalid CORS origin '{}': {}", origin, e),
        }
    }
    layer.allow_origin(valid_origins)
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/connect", post(connect))
        .route("/query", post(query))
        .route("/crud", post(crud))
        .route("/translate", post(translate))
        .route("/health", get(health))
        .layer(build_cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(app: Router, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("HTTP server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
