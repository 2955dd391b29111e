//! Registry of peers currently taking part in the relay
//!
//! Peers are keyed by the UDP endpoint they send from. The registry is owned
//! by the relay engine and mutated from a single task, so it holds plain maps.

use std::collections::HashMap;
use std::net::SocketAddr;

use tracing::{debug, info};

use super::metrics::PeerMetrics;
use crate::protocol::SessionId;

/// A registered peer
#[derive(Debug)]
pub struct Peer {
    endpoint: SocketAddr,
    session_id: Option<SessionId>,
    registered_at_ms: u64,
    metrics: PeerMetrics,
}

impl Peer {
    fn new(endpoint: SocketAddr, registered_at_ms: u64) -> Self {
        Self {
            endpoint,
            session_id: None,
            registered_at_ms,
            metrics: PeerMetrics::new(),
        }
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn registered_at_ms(&self) -> u64 {
        self.registered_at_ms
    }

    pub fn metrics(&self) -> &PeerMetrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut PeerMetrics {
        &mut self.metrics
    }

    /// Associate a session id with this peer
    ///
    /// The first id wins; returns false when a different id was already bound.
    pub fn bind_session(&mut self, session_id: SessionId) -> bool {
        match self.session_id {
            None => {
                self.session_id = Some(session_id);
                true
            }
            Some(existing) if existing == session_id => true,
            Some(existing) => {
                debug!(
                    "Peer {} sent session {} but is bound to {}",
                    self.endpoint, session_id, existing
                );
                false
            }
        }
    }
}

/// Active peers keyed by endpoint
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<SocketAddr, Peer>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the peer for `endpoint`, creating it if unseen
    ///
    /// The boolean is true only when the peer was created by this call.
    pub fn register_if_absent(&mut self, endpoint: SocketAddr, now_ms: u64) -> (&mut Peer, bool) {
        let is_new = !self.peers.contains_key(&endpoint);
        if is_new {
            info!("New peer: {}", endpoint);
        }

        let peer = self
            .peers
            .entry(endpoint)
            .or_insert_with(|| Peer::new(endpoint, now_ms));

        (peer, is_new)
    }

    /// Remove a peer, returning its final state
    pub fn remove(&mut self, endpoint: &SocketAddr) -> Option<Peer> {
        self.peers.remove(endpoint)
    }

    /// Visit every registered peer except `endpoint`, in no particular order
    pub fn for_each_except<F>(&self, endpoint: &SocketAddr, mut f: F)
    where
        F: FnMut(&Peer),
    {
        self.peers
            .iter()
            .filter(|(addr, _)| *addr != endpoint)
            .for_each(|(_, peer)| f(peer));
    }

    pub fn get(&self, endpoint: &SocketAddr) -> Option<&Peer> {
        self.peers.get(endpoint)
    }

    pub fn contains(&self, endpoint: &SocketAddr) -> bool {
        self.peers.contains_key(endpoint)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
