//! Axum middleware that compiles stylesheets before the request reaches the
//! static file service.
//!
//! Only `GET`/`HEAD` requests for `.css` paths are looked at; everything else
//! goes straight to `next` without touching the filesystem.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use less_cache::{Outcome, StylesheetCache};

use crate::error::ServerError;

/// Response header reporting what the cache did for a stylesheet request.
pub const CACHE_HEADER: &str = "x-less-cache";

/// Compile-on-request layer. Use with
/// `axum::middleware::from_fn_with_state(cache, less_layer)`.
pub async fn less_layer(
    State(cache): State<Arc<StylesheetCache>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    match cache.handle(request.method().as_str(), &path).await {
        Ok(Some(outcome)) => {
            let mut response = next.run(request).await;
            let value = match outcome {
                Outcome::Fresh => "fresh",
                Outcome::Compiled(_) => "compiled",
            };
            response
                .headers_mut()
                .insert(CACHE_HEADER, HeaderValue::from_static(value));
            response
        }
        Ok(None) => next.run(request).await,
        Err(e) => {
            tracing::error!("failed to serve {path}: {e}");
            ServerError::from(e).into_response()
        }
    }
}
