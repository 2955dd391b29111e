//! Relay hub core
//!
//! Decodes inbound datagrams, keeps per-peer telemetry, fans audio out to
//! the other peers and summarizes sessions when peers disconnect.

mod clock;
mod engine;
mod error;
mod metrics;
mod registry;
mod sink;
mod summary;
mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{DatagramOutcome, RelayEngine, RelayStats};
pub use error::RelayError;
pub use metrics::{MetricsSummary, PacketObservation, PeerMetrics, SlidingWindow, WINDOW_CAPACITY};
pub use registry::{Peer, PeerRegistry};
pub use sink::{AudioSink, CsvSummarySink, NullAudioSink, PcmFileSink, SummarySink};
pub use summary::{SessionSummarizer, SessionSummary, CSV_HEADER};
pub use transport::{DatagramSender, MemoryTransport, UdpTransport, MAX_DATAGRAM_SIZE};
