//! Relay error types

use thiserror::Error;

/// Errors that can occur in the relay subsystem
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Sink write failed ({sink}): {source}")]
    SinkWrite {
        sink: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
}
