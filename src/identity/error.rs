//! Identity service error types

use thiserror::Error;

/// Errors that can occur while issuing or requesting session ids
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Bind failed: {0}")]
    Bind(#[source] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
