//! Relay engine: one inbound datagram at a time
//!
//! The engine owns the peer registry and every peer's metrics. It is driven
//! by a single receive loop, so none of its state is shared or locked. Only
//! the outbound sends leave the loop, as fire-and-forget tasks.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::clock::Clock;
use super::metrics::PacketObservation;
use super::registry::PeerRegistry;
use super::sink::AudioSink;
use super::summary::{SessionSummarizer, SessionSummary};
use super::transport::DatagramSender;
use crate::protocol::{decode, Datagram, DisconnectNotice, Framing, MalformedPacket, Packet};

/// What the engine did with one datagram
#[derive(Debug, Clone, PartialEq)]
pub enum DatagramOutcome {
    /// Audio accepted and forwarded to `destinations` peers
    Relayed {
        destinations: usize,
        observation: PacketObservation,
    },
    /// Disconnect handled; the summary has been handed to the sink
    Disconnected(SessionSummary),
    /// Datagram rejected without side effects
    Dropped(MalformedPacket),
}

/// Process-wide counters, logged periodically by the server loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub packets_received: u64,
    pub packets_relayed: u64,
    pub packets_dropped: u64,
    pub disconnects: u64,
    pub audio_write_failures: u64,
}

/// The relay hub core
pub struct RelayEngine {
    framing: Framing,
    registry: PeerRegistry,
    summarizer: SessionSummarizer,
    audio_sink: Box<dyn AudioSink>,
    transport: Arc<dyn DatagramSender>,
    clock: Arc<dyn Clock>,
    stats: RelayStats,
}

impl RelayEngine {
    pub fn new(
        framing: Framing,
        transport: Arc<dyn DatagramSender>,
        audio_sink: Box<dyn AudioSink>,
        summarizer: SessionSummarizer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            framing,
            registry: PeerRegistry::new(),
            summarizer,
            audio_sink,
            transport,
            clock,
            stats: RelayStats::default(),
        }
    }

    /// Handle one inbound datagram from `sender`
    pub fn on_datagram(&mut self, data: &[u8], sender: SocketAddr) -> DatagramOutcome {
        self.stats.packets_received += 1;

        match decode(data, self.framing) {
            Ok(Datagram::Disconnect(notice)) => {
                DatagramOutcome::Disconnected(self.handle_disconnect(sender, &notice))
            }
            Ok(Datagram::Data(packet)) => self.handle_packet(packet, sender),
            Err(e) => {
                self.stats.packets_dropped += 1;
                warn!("Dropping datagram from {}: {}", sender, e);
                DatagramOutcome::Dropped(e)
            }
        }
    }

    fn handle_disconnect(&mut self, sender: SocketAddr, notice: &DisconnectNotice) -> SessionSummary {
        self.stats.disconnects += 1;

        let peer_count = self.registry.len();
        let peer = self.registry.get(&sender);
        if peer.is_none() {
            debug!("Disconnect from unregistered endpoint {}", sender);
        }

        let summary = self.summarizer.on_disconnect(
            sender,
            notice,
            peer.and_then(|p| p.session_id()),
            peer.map(|p| p.metrics()),
            peer_count,
        );
        self.registry.remove(&sender);

        summary
    }

    fn handle_packet(&mut self, packet: Packet, sender: SocketAddr) -> DatagramOutcome {
        let now_ms = self.clock.now_ms();
        let (peer, _is_new) = self.registry.register_if_absent(sender, now_ms);

        if let Some(session_id) = packet.session_id {
            peer.bind_session(session_id);
        }

        let observation = peer
            .metrics_mut()
            .observe(packet.sequence, packet.timestamp, now_ms);
        trace!(
            "Packet seq={} from {}: latency={}ms jitter={:?} gap={}",
            packet.sequence,
            sender,
            observation.latency_ms,
            observation.jitter_ms,
            observation.sequence_gap
        );

        if let Err(e) = self.audio_sink.append(&packet.payload) {
            self.stats.audio_write_failures += 1;
            warn!("Failed to store audio from {}: {}", sender, e);
        }

        let payload: Arc<[u8]> = Arc::from(packet.payload);
        let mut destinations = 0;
        let transport = &self.transport;
        self.registry.for_each_except(&sender, |peer| {
            transport.send_to(payload.clone(), peer.endpoint());
            destinations += 1;
        });
        self.stats.packets_relayed += 1;

        DatagramOutcome::Relayed {
            destinations,
            observation,
        }
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn peer_count(&self) -> usize {
        self.registry.len()
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    pub fn send_failures(&self) -> u64 {
        self.transport.send_failures()
    }

    pub fn summarizer(&self) -> &SessionSummarizer {
        &self.summarizer
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }
}
