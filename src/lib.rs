//! jamrelay - UDP audio relay hub with per-peer network quality telemetry
//!
//! Every audio datagram a peer sends is forwarded to all other registered
//! peers. Sequence numbers and sender timestamps feed per-peer latency,
//! jitter and loss statistics, summarized to CSV when the peer disconnects.

pub mod config;
pub mod identity;
pub mod protocol;
pub mod relay;

pub use config::RelayConfig;
pub use protocol::{Framing, Packet};
pub use relay::RelayEngine;
