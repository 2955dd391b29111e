//! Session id issuance over websocket
//!
//! Before streaming audio in the session-bound framing, a peer opens a
//! websocket, sends `{"type":"CONN"}` and receives `{"type":"ID","id":"<uuid>"}`.
//! The relay engine never talks to this service; peers simply embed the id
//! bytes in every packet they send.

mod client;
mod error;
mod server;
mod tls;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use client::IdentityClient;
pub use error::IdentityError;
pub use server::IdentityServer;
pub use tls::create_tls_acceptor;

/// Messages exchanged on the identity channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IdentityMessage {
    // Client -> Server
    #[serde(rename = "CONN")]
    Connect,

    // Server -> Client
    #[serde(rename = "ID")]
    Id { id: Uuid },
    #[serde(rename = "ERROR")]
    Error { message: String },
}
