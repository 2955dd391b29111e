//! Websocket server handing out session ids

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::IdentityError;
use super::IdentityMessage;

/// Issues a fresh uuid v4 to every `CONN` request
#[derive(Clone, Default)]
pub struct IdentityServer {
    issued: Arc<AtomicU64>,
    tls: Option<TlsAcceptor>,
}

impl IdentityServer {
    /// Create a plain websocket server
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve wss:// through the given acceptor
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// Number of ids handed out so far
    pub fn issued_count(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    /// Bind `addr` and serve until the task is dropped
    pub async fn run(&self, addr: SocketAddr) -> Result<(), IdentityError> {
        let listener = TcpListener::bind(addr).await.map_err(IdentityError::Bind)?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), IdentityError> {
        let local_addr = listener.local_addr()?;
        if self.tls.is_some() {
            info!("Identity service listening on wss://{}", local_addr);
        } else {
            info!("Identity service listening on ws://{}", local_addr);
        }

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("New identity connection from {}", peer_addr);
                    let issued = self.issued.clone();
                    let tls = self.tls.clone();

                    tokio::spawn(async move {
                        let result = match tls {
                            Some(acceptor) => match acceptor.accept(stream).await {
                                Ok(tls_stream) => handle_connection(tls_stream, issued).await,
                                Err(e) => {
                                    warn!("TLS handshake failed for {}: {}", peer_addr, e);
                                    return;
                                }
                            },
                            None => handle_connection(stream, issued).await,
                        };

                        if let Err(e) = result {
                            warn!("Identity connection error for {}: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single websocket connection
async fn handle_connection<S>(stream: S, issued: Arc<AtomicU64>) -> Result<(), IdentityError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => {
                let response = process_message(&text, &issued);
                let json = serde_json::to_string(&response)?;
                write.send(Message::Text(json)).await?;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    Ok(())
}

/// Build the reply to one text frame
fn process_message(text: &str, issued: &AtomicU64) -> IdentityMessage {
    match serde_json::from_str::<IdentityMessage>(text) {
        Ok(IdentityMessage::Connect) => {
            let id = Uuid::new_v4();
            issued.fetch_add(1, Ordering::Relaxed);
            info!("Issued session id {}", id);
            IdentityMessage::Id { id }
        }
        Ok(other) => IdentityMessage::Error {
            message: format!("Unexpected message: {:?}", other),
        },
        Err(e) => {
            warn!("Invalid identity message: {}", e);
            IdentityMessage::Error {
                message: format!("Invalid message: {}", e),
            }
        }
    }
}
