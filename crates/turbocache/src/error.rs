//! HTTP error mapping.
//!
//! Handler failures become `ApiError`, which logs at the level its category
//! deserves and renders a stable JSON body. Internal failures carry their
//! cause in an `ErrorDetail` response extension; `reveal_error_detail` copies
//! it into the body in development mode and drops it otherwise.

use std::any::Any;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cas::{CasError, ContentHash, HashError};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use turboconf::RuntimeMode;

pub const INTERNAL_ERROR: &str = "Internal server error";

/// Cause of a 500, kept out of the body unless running in development mode.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("artifact not found")]
    NotFound,

    #[error("invalid artifact hash: {0}")]
    InvalidHash(#[from] HashError),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("storage failure for {hash}: {source}")]
    Storage {
        hash: ContentHash,
        #[source]
        source: CasError,
    },

    #[error("storage task for {hash} failed: {source}")]
    Task {
        hash: ContentHash,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl ApiError {
    pub fn from_cas(hash: &ContentHash, err: CasError) -> Self {
        match err {
            CasError::HashMismatch { expected, actual } => ApiError::HashMismatch { expected, actual },
            CasError::InvalidHash(e) => ApiError::InvalidHash(e),
            source => ApiError::Storage {
                hash: hash.clone(),
                source,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Artifact not found" })),
            )
                .into_response(),
            ApiError::InvalidHash(e) => {
                warn!(error = %e, "rejected malformed artifact hash");
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "Invalid artifact hash" })),
                )
                    .into_response()
            }
            ApiError::HashMismatch { expected, actual } => {
                warn!(%expected, %actual, "hash verification failed");
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "Hash verification failed" })),
                )
                    .into_response()
            }
            ApiError::Storage { hash, source } => {
                error!(%hash, error = %source, "storage operation failed");
                internal_error(source.to_string())
            }
            ApiError::Task { hash, source } => {
                error!(%hash, error = %source, "storage task failed");
                internal_error(source.to_string())
            }
        }
    }
}

/// Generic 500 carrying `detail` as an extension.
pub fn internal_error(detail: String) -> Response {
    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": INTERNAL_ERROR })),
    )
        .into_response();
    response.extensions_mut().insert(ErrorDetail(detail));
    response
}

/// `CatchPanicLayer` handler.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    error!(panic = %detail, "unhandled error in request handler");
    internal_error(detail)
}

/// Middleware: expose `ErrorDetail` as `message` in development mode.
pub async fn reveal_error_detail(
    State(mode): State<RuntimeMode>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let Some(ErrorDetail(detail)) = response.extensions_mut().remove::<ErrorDetail>() else {
        return response;
    };

    if mode.is_development() {
        let status = response.status();
        (status, Json(json!({ "error": INTERNAL_ERROR, "message": detail }))).into_response()
    } else {
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::routing::get;
    use axum::{middleware, Router};
    use tower::ServiceExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn failing_app(mode: RuntimeMode) -> Router {
        Router::new()
            .route(
                "/fail",
                get(|| async {
                    let hash = ContentHash::from_data(b"hello");
                    ApiError::Storage {
                        hash,
                        source: CasError::Io {
                            op: "read artifact",
                            source: std::io::Error::other("disk on fire"),
                        },
                    }
                }),
            )
            .layer(middleware::from_fn_with_state(mode, reveal_error_detail))
    }

    async fn call(app: Router) -> Response {
        app.oneshot(
            axum::http::Request::builder()
                .uri("/fail")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_production_hides_detail() {
        let response = call(failing_app(RuntimeMode::Production)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<ErrorDetail>().is_some());

        let body = body_json(response).await;
        assert_eq!(body, json!({ "error": INTERNAL_ERROR }));
    }

    #[tokio::test]
    async fn test_development_reveals_detail() {
        let response = call(failing_app(RuntimeMode::Development)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], INTERNAL_ERROR);
        assert!(body["message"].as_str().unwrap().contains("disk on fire"));
    }

    #[tokio::test]
    async fn test_handle_panic_is_generic_500() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.extensions().get::<ErrorDetail>().map(|d| d.0.as_str()),
            Some("boom")
        );
        assert_eq!(body_json(response).await, json!({ "error": INTERNAL_ERROR }));
    }

    #[test]
    fn test_from_cas_classifies_mismatch() {
        let hash = ContentHash::from_data(b"x");
        let err = ApiError::from_cas(
            &hash,
            CasError::HashMismatch {
                expected: hash.clone(),
                actual: ContentHash::from_data(b"y"),
            },
        );
        assert!(matches!(err, ApiError::HashMismatch { .. }));

        let err = ApiError::from_cas(&hash, CasError::ReadOnly);
        assert!(matches!(err, ApiError::Storage { .. }));
    }
}
