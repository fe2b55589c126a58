//! HTTP server — static files from the destination root with the LESS
//! middleware in front, plus a `/health` endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::{middleware, Router};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use less_cache::StylesheetCache;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::middleware::less_layer;

/// Build the router serving `cache`'s destination root.
pub fn router(cache: Arc<StylesheetCache>) -> Router {
    let static_files = ServeDir::new(cache.config().dest_root());

    let app = match cache.config().url_prefix() {
        Some(prefix) => Router::new().nest_service(prefix, static_files),
        None => Router::new().fallback_service(static_files),
    };

    app.route("/health", get(handle_health))
        .layer(middleware::from_fn_with_state(cache.clone(), less_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(cache)
}

/// Health check with cache counters.
async fn handle_health(State(cache): State<Arc<StylesheetCache>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "cache": cache.stats(),
    }))
}

/// The `lessd` HTTP server.
pub struct LessServer {
    addr: String,
    cache: Arc<StylesheetCache>,
}

impl LessServer {
    pub fn new(config: &ServerConfig) -> ServerResult<Self> {
        let cache = StylesheetCache::new(config.cache_config())?;
        Ok(Self {
            addr: config.addr.clone(),
            cache: Arc::new(cache),
        })
    }

    pub fn cache(&self) -> &Arc<StylesheetCache> {
        &self.cache
    }

    /// Serve until Ctrl-C.
    pub async fn run(&self) -> ServerResult<()> {
        let app = router(Arc::clone(&self.cache));

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        tracing::info!("lessd listening on http://{}", self.addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Transport(e.to_string()))?;

        tracing::info!("server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
