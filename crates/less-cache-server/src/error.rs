//! Error types and error codes for the HTTP layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use less_cache::CacheError;

/// Error codes carried in JSON error bodies.
pub mod error_codes {
    pub const COMPILE: &str = "E_COMPILE";
    pub const IO: &str = "E_IO";
    pub const CONFIG: &str = "E_CONFIG";
    pub const INTERNAL: &str = "E_INTERNAL";
}

/// All errors that can occur in the server.
#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Config parse error in {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn code(&self) -> &'static str {
        use error_codes::*;
        match self {
            ServerError::Cache(CacheError::Compile { .. }) => COMPILE,
            ServerError::Cache(CacheError::Io { .. }) | ServerError::Io(_) => IO,
            ServerError::Cache(CacheError::Config(_))
            | ServerError::Config(_)
            | ServerError::ConfigParse { .. } => CONFIG,
            ServerError::Cache(_) | ServerError::Transport(_) => INTERNAL,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Cache(CacheError::SourceNotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::Cache(CacheError::NotStylesheet(_))
            | ServerError::Cache(CacheError::PathEscapesRoot(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
