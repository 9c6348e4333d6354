//! Artifact and health endpoints.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use cas::{CasError, ContentHash, ContentStore};
use serde_json::json;
use tracing::{debug, info};
use turboconf::{RuntimeMode, TurboConfig};

use crate::auth::AuthGate;
use crate::error::ApiError;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ContentStore>,
    pub auth: AuthGate,
    pub mode: RuntimeMode,
    pub max_body_bytes: usize,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn ContentStore>, config: &TurboConfig) -> Self {
        Self {
            store,
            auth: AuthGate::new(config.security.clone()),
            mode: config.server.mode,
            max_body_bytes: config.server.max_body_bytes(),
            start_time: Instant::now(),
        }
    }
}

/// Run a store operation on the blocking pool.
async fn run_blocking<T, F>(hash: &ContentHash, op: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, CasError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(result) => result.map_err(|e| ApiError::from_cas(hash, e)),
        Err(source) => Err(ApiError::Task {
            hash: hash.clone(),
            source,
        }),
    }
}

/// Liveness probe. Never touches the store.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

pub async fn get_artifact(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Response, ApiError> {
    // A malformed key can never have been stored.
    let hash = ContentHash::from_str_checked(&hash).map_err(|_| ApiError::NotFound)?;

    let store = Arc::clone(&state.store);
    let key = hash.clone();
    let data = run_blocking(&hash, move || store.get(&key))
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data).into_response())
}

/// Presence check: 200 when stored, 404 otherwise. No body.
pub async fn head_artifact(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<StatusCode, ApiError> {
    let hash = ContentHash::from_str_checked(&hash).map_err(|_| ApiError::NotFound)?;

    let store = Arc::clone(&state.store);
    let key = hash.clone();
    let present = run_blocking(&hash, move || Ok(store.exists(&key))).await?;

    if present {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::NotFound)
    }
}

pub async fn put_artifact(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let hash = ContentHash::from_str_checked(&hash)?;
    let size = body.len();

    let store = Arc::clone(&state.store);
    let key = hash.clone();
    run_blocking(&hash, move || store.put(&key, &body)).await?;

    info!(%hash, size, "artifact stored");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Artifact stored successfully" })),
    )
        .into_response())
}

pub async fn delete_artifact(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<StatusCode, ApiError> {
    // Nothing can be stored under a malformed key, so there is nothing to remove.
    let Ok(hash) = ContentHash::from_str_checked(&hash) else {
        return Ok(StatusCode::NO_CONTENT);
    };

    let store = Arc::clone(&state.store);
    let key = hash.clone();
    run_blocking(&hash, move || store.delete(&key)).await?;

    debug!(%hash, "artifact delete handled");
    Ok(StatusCode::NO_CONTENT)
}

/// Fallback for unmatched routes and methods.
pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}
