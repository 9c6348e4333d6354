//! turbocache - content-addressed remote build cache server
//!
//! This library provides:
//! - `auth`: bearer token and team allow-list gate
//! - `error`: handler error mapping and development-mode detail
//! - `routes`: artifact and health handlers
//! - `serve`: router assembly, startup and graceful shutdown
//! - `telemetry`: tracing subscriber and OTLP export

pub mod auth;
pub mod error;
pub mod routes;
pub mod serve;
pub mod telemetry;

#[cfg(test)]
mod test_support;
