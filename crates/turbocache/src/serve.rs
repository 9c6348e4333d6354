//! Artifact cache server: router assembly, startup and graceful shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue};
use axum::routing::get;
use axum::{middleware, Router};
use cas::{CasConfig, FileStore, StoreLayout};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn, Level};
use turboconf::{CacheConfig, TurboConfig};

use crate::auth::require_auth;
use crate::error::{handle_panic, reveal_error_detail};
use crate::routes::{
    delete_artifact, get_artifact, head_artifact, health, not_found, put_artifact, AppState,
};

/// Build the full HTTP application.
pub fn router(state: AppState) -> Router {
    let artifacts = Router::new()
        .route(
            "/{hash}",
            get(get_artifact)
                .head(head_artifact)
                .put(put_artifact)
                .delete(delete_artifact)
                .fallback(not_found),
        )
        .route_layer(middleware::from_fn_with_state(state.auth.clone(), require_auth));

    Router::new()
        .route("/health", get(health).fallback(not_found))
        .nest("/v8/artifacts", artifacts)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn_with_state(state.mode, reveal_error_detail))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Translate cache settings into a store configuration.
pub fn cas_config(cache: &CacheConfig) -> Result<CasConfig> {
    let layout: StoreLayout = cache
        .layout
        .parse()
        .map_err(anyhow::Error::msg)
        .context("invalid cache.layout")?;

    let config = if cache.read_only {
        CasConfig::read_only(&cache.dir)
    } else {
        CasConfig::with_base_path(&cache.dir)
    };
    Ok(config.with_layout(layout))
}

/// Open the store, creating its directory. Must finish before binding.
pub async fn open_store(cache: &CacheConfig) -> Result<FileStore> {
    let config = cas_config(cache)?;
    let dir = cache.dir.clone();
    let opened = tokio::task::spawn_blocking(move || FileStore::open(config))
        .await
        .context("store initialization task failed")?;

    match opened {
        Ok(store) => Ok(store),
        Err(e) => {
            error!(dir = %dir.display(), error = %e, "failed to initialize cache directory");
            Err(e).with_context(|| format!("failed to initialize cache directory {}", dir.display()))
        }
    }
}

/// Compare measured usage against the configured ceiling. Nothing is evicted.
async fn report_usage(store: &FileStore, cache: &CacheConfig) {
    let store = store.clone();
    match tokio::task::spawn_blocking(move || store.usage()).await {
        Ok(Ok(usage)) => {
            let ceiling = cache.max_size_bytes();
            info!(
                artifacts = usage.artifacts,
                bytes = usage.bytes,
                ceiling_bytes = ceiling,
                "cache usage"
            );
            if usage.bytes > ceiling {
                warn!(
                    bytes = usage.bytes,
                    ceiling_bytes = ceiling,
                    "cache exceeds configured max size; size ceiling is not enforced"
                );
            }
        }
        Ok(Err(e)) => warn!(error = %e, "could not measure cache usage"),
        Err(e) => warn!(error = %e, "cache usage task failed"),
    }
}

/// Run the artifact cache server until SIGINT/SIGTERM.
pub async fn run(config: TurboConfig) -> Result<()> {
    info!("📦 turbocache starting");
    info!("   Mode: {}", config.server.mode);
    info!("   Port: {}", config.server.port);
    info!("   Cache dir: {}", config.cache.dir.display());

    let store = open_store(&config.cache).await?;
    report_usage(&store, &config.cache).await;

    if config.security.token.is_none() {
        warn!("no bearer token configured; every artifact request will be rejected");
    }
    if !config.security.allowed_teams.is_empty() {
        info!("   Allowed teams: {}", config.security.allowed_teams.join(", "));
    }

    let state = AppState::new(Arc::new(store), &config);
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("📦 turbocache ready!");
    info!("   Artifacts: http://{}/v8/artifacts/{{hash}}", addr);
    info!("   Health: GET http://{}/health", addr);

    serve_on(listener, app, shutdown_signal()).await?;

    info!("Shutdown complete");
    Ok(())
}

/// Serve `app` on an already bound listener until `shutdown` resolves, then
/// drain in-flight requests.
pub async fn serve_on<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("Server error")
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
