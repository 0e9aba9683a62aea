//! HTTP services.
//!
//! Two independent axum apps share this module:
//!
//! | Service | Method | Path | Description |
//! |---------|--------|------|-------------|
//! | embed | `POST` | `/embed` | `{"texts": [..]}` → `{"vectors": [[..]]}` |
//! | extract | `POST` | `/file` | multipart `file` → `{"filename","type","length","text"}` |
//! | both | `GET` | `/health` | status, version, and service details |
//!
//! # Error Contract
//!
//! Errors are returned as `{"detail": "<message>"}`:
//! missing/malformed upload (400), empty upload (400), body over the
//! configured limit (413), extraction or embedding failure (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Config, ExtractConfig};
use crate::embedding::{self, EmbeddingProvider};
use crate::extract::{self, ExtractError};
use crate::models::{EmbedRequest, EmbedResponse, ErrorBody, ExtractedFile};

// ============ Error response ============

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "{}", self.message);
        } else {
            tracing::warn!(status = %self.status, "{}", self.message);
        }
        let body = ErrorBody {
            detail: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ExtractError> for AppError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Empty => Self::new(StatusCode::BAD_REQUEST, err.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        // 413 when the body limit was hit, 400 for malformed multipart.
        Self::new(err.status(), err.body_text())
    }
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: &'static str,
    service: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dims: Option<usize>,
}

// ============ Embedding service ============

#[derive(Clone)]
struct EmbedState {
    provider: Arc<dyn EmbeddingProvider>,
}

/// Router for the embedding service.
pub fn embed_router(provider: Arc<dyn EmbeddingProvider>) -> Router {
    Router::new()
        .route("/embed", post(handle_embed))
        .route("/health", get(handle_embed_health))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(EmbedState { provider })
}

/// Handler for `POST /embed`.
async fn handle_embed(
    State(state): State<EmbedState>,
    Json(req): Json<EmbedRequest>,
) -> Result<Json<EmbedResponse>, AppError> {
    let vectors = embedding::embed_texts(state.provider.as_ref(), &req.texts)
        .await
        .map_err(|e| AppError::internal(format!("{:#}", e)))?;
    Ok(Json(EmbedResponse { vectors }))
}

async fn handle_embed_health(State(state): State<EmbedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "embed",
        version: env!("CARGO_PKG_VERSION"),
        model: Some(state.provider.model_name().to_string()),
        dims: Some(state.provider.dims()),
    })
}

/// Load the embedding model, then serve until the process is stopped.
///
/// The model is loaded before binding so a bad model config fails at startup.
pub async fn run_embed_server(config: &Config) -> anyhow::Result<()> {
    let provider = embedding::create_provider(&config.embedding).await?;
    tracing::info!(
        model = provider.model_name(),
        dims = provider.dims(),
        "embedding model ready"
    );
    serve(&config.server.embed_bind, embed_router(provider), "embed").await
}

// ============ Extraction service ============

#[derive(Clone)]
struct ExtractState {
    config: Arc<ExtractConfig>,
}

/// Router for the extraction service.
pub fn extract_router(config: ExtractConfig) -> Router {
    let limit = config.max_upload_bytes;
    Router::new()
        .route("/file", post(handle_file))
        .route("/health", get(handle_extract_health))
        .layer(DefaultBodyLimit::max(limit))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(ExtractState {
            config: Arc::new(config),
        })
}

/// Handler for `POST /file`.
///
/// Reads the first multipart field named `file`; other fields are ignored.
async fn handle_file(
    State(state): State<ExtractState>,
    mut multipart: Multipart,
) -> Result<Json<ExtractedFile>, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;

        let extracted = extract::extract_file(&filename, bytes.to_vec(), &state.config).await?;
        tracing::info!(
            filename = %extracted.filename,
            kind = extracted.kind.as_str(),
            length = extracted.length,
            "extracted file"
        );
        return Ok(Json(extracted));
    }

    Err(AppError::new(
        StatusCode::BAD_REQUEST,
        "missing multipart field 'file'",
    ))
}

async fn handle_extract_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "extract",
        version: env!("CARGO_PKG_VERSION"),
        model: None,
        dims: None,
    })
}

pub async fn run_extract_server(config: &Config) -> anyhow::Result<()> {
    serve(
        &config.server.extract_bind,
        extract_router(config.extract.clone()),
        "extract",
    )
    .await
}

async fn serve(bind_addr: &str, app: Router, service: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(service, "listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!(service, "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
