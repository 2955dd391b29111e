//! Client side of the identity channel

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

use super::error::IdentityError;
use super::IdentityMessage;
use crate::protocol::SessionId;

/// Requests session ids from an identity server
pub struct IdentityClient {
    server_url: String,
}

impl IdentityClient {
    pub fn new(server_url: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
        }
    }

    /// Open a connection, request one id and close
    pub async fn request_id(&self) -> Result<SessionId, IdentityError> {
        let (mut ws_stream, _) = connect_async(&self.server_url).await?;
        debug!("Connected to identity server: {}", self.server_url);

        let request = serde_json::to_string(&IdentityMessage::Connect)?;
        ws_stream.send(Message::Text(request)).await?;

        let id = loop {
            match ws_stream.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str(&text)? {
                    IdentityMessage::Id { id } => break id,
                    IdentityMessage::Error { message } => {
                        return Err(IdentityError::Protocol(message));
                    }
                    other => {
                        return Err(IdentityError::Protocol(format!(
                            "Unexpected reply: {:?}",
                            other
                        )));
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    return Err(IdentityError::Protocol("Connection closed".to_string()));
                }
                Some(Err(e)) => return Err(e.into()),
                _ => continue,
            }
        };

        // Close errors are irrelevant once the id arrived
        let _ = ws_stream.close(None).await;
        debug!("Received session id {}", id);

        Ok(SessionId::from(id))
    }
}
