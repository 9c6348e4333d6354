//! Bearer token and team allow-list gate for the artifact routes.
//!
//! `AuthGate::check` is a pure predicate over the immutable security config
//! and two header values. `require_auth` is the axum middleware around it and
//! is the only place rejections are logged.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header::AUTHORIZATION, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;
use turboconf::SecurityConfig;

/// Header carrying the caller's team identifier.
pub const TEAM_HEADER: &str = "x-team-id";

/// Why a request was turned away.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthRejection {
    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("team {team} is not allowed")]
    Forbidden { team: String },
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            AuthRejection::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "Unauthorized" })),
            )
                .into_response(),
            AuthRejection::Forbidden { .. } => (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": "Team not allowed" })),
            )
                .into_response(),
        }
    }
}

/// Stateless authorization predicate.
#[derive(Debug, Clone)]
pub struct AuthGate {
    security: Arc<SecurityConfig>,
}

impl AuthGate {
    pub fn new(security: SecurityConfig) -> Self {
        Self {
            security: Arc::new(security),
        }
    }

    /// Decide whether a request carrying these headers may reach the store.
    ///
    /// An empty team header counts as absent.
    pub fn check(&self, authorization: Option<&str>, team: Option<&str>) -> Result<(), AuthRejection> {
        let presented = authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty());

        let valid = match (presented, self.security.token.as_deref()) {
            (Some(presented), Some(expected)) => {
                bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
            }
            _ => false,
        };
        if !valid {
            return Err(AuthRejection::Unauthorized);
        }

        let allowed = &self.security.allowed_teams;
        match team.map(str::trim).filter(|t| !t.is_empty()) {
            Some(team) if !allowed.is_empty() && !allowed.iter().any(|a| a == team) => {
                Err(AuthRejection::Forbidden {
                    team: team.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Middleware: reject unauthenticated or out-of-scope requests before routing
/// them to an artifact handler.
pub async fn require_auth(State(gate): State<AuthGate>, request: Request, next: Next) -> Response {
    let headers = request.headers();
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let team = headers.get(TEAM_HEADER).and_then(|v| v.to_str().ok());

    match gate.check(authorization, team) {
        Ok(()) => next.run(request).await,
        Err(rejection) => {
            let client = client_addr(&request);
            match &rejection {
                AuthRejection::Unauthorized => {
                    warn!(client = %client, "invalid or missing token");
                }
                AuthRejection::Forbidden { team } => {
                    warn!(client = %client, team = %team, "team not allowed");
                }
            }
            rejection.into_response()
        }
    }
}

fn client_addr(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
