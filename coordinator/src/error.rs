//! Error types for the start coordinator

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Start coordinator errors
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The issuance counter cannot advance without wrapping
    #[error("token space exhausted after {issued} tokens")]
    Exhausted {
        /// Tokens issued before the counter ran out
        issued: u64,
    },

    /// The listen address could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The HTTP server stopped with an error
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Token request failed");
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
