//! Disconnect-time session summaries

use std::net::SocketAddr;

use tracing::{info, warn};

use super::metrics::{MetricsSummary, PeerMetrics};
use super::sink::SummarySink;
use crate::protocol::{DisconnectNotice, SessionId};

/// Header line of the summary CSV
pub const CSV_HEADER: &str = "PacketLoss(%),Jitter(ms),Latency(ms),NetworkType,Clients,Stars";

/// Final statistics for a peer that left the relay
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub endpoint: SocketAddr,
    pub session_id: Option<SessionId>,
    pub packet_loss: f64,
    pub avg_jitter: f64,
    pub avg_latency: f64,
    pub network_type: String,
    /// Peers registered when the disconnect arrived, the leaving one included
    pub peer_count: usize,
    pub rating: Option<u8>,
}

impl SessionSummary {
    pub fn new(
        endpoint: SocketAddr,
        session_id: Option<SessionId>,
        metrics: MetricsSummary,
        network_type: &str,
        peer_count: usize,
        rating: Option<u8>,
    ) -> Self {
        Self {
            endpoint,
            session_id,
            packet_loss: metrics.loss_percentage,
            avg_jitter: metrics.avg_jitter,
            avg_latency: metrics.avg_latency,
            network_type: network_type.to_string(),
            peer_count,
            rating,
        }
    }

    /// `packetLoss,avgJitter,avgLatency,networkType,peerCount,rating`
    pub fn csv_record(&self) -> String {
        let rating = self.rating.map(|r| r.to_string()).unwrap_or_default();
        format!(
            "{:.2},{:.2},{:.2},{},{},{}",
            self.packet_loss,
            self.avg_jitter,
            self.avg_latency,
            csv_field(&self.network_type),
            self.peer_count,
            rating
        )
    }
}

/// Replace characters that would break the one-line record
fn csv_field(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            ',' | '"' | '\n' | '\r' => '_',
            c => c,
        })
        .collect()
}

/// Turns a disconnect into a summary record and hands it to the sink
pub struct SessionSummarizer {
    sink: Box<dyn SummarySink>,
    summaries_written: u64,
    write_failures: u64,
}

impl SessionSummarizer {
    pub fn new(sink: Box<dyn SummarySink>) -> Self {
        Self {
            sink,
            summaries_written: 0,
            write_failures: 0,
        }
    }

    /// Summarize a disconnecting peer
    ///
    /// `metrics` is `None` for an endpoint that was never registered, which
    /// yields NaN averages. A sink failure is logged and the summary is still
    /// returned.
    pub fn on_disconnect(
        &mut self,
        endpoint: SocketAddr,
        notice: &DisconnectNotice,
        session_id: Option<SessionId>,
        metrics: Option<&PeerMetrics>,
        peer_count: usize,
    ) -> SessionSummary {
        let stats = match metrics {
            Some(metrics) => metrics.summarize(),
            None => PeerMetrics::new().summarize(),
        };
        let summary = SessionSummary::new(
            endpoint,
            session_id,
            stats,
            &notice.network_type,
            peer_count,
            notice.rating,
        );

        info!(
            "Peer {} disconnected: loss={:.2}% jitter={:.2}ms latency={:.2}ms network={} peers={} rating={:?}",
            endpoint,
            summary.packet_loss,
            summary.avg_jitter,
            summary.avg_latency,
            summary.network_type,
            summary.peer_count,
            summary.rating
        );

        match self.sink.write_summary(&summary) {
            Ok(()) => self.summaries_written += 1,
            Err(e) => {
                self.write_failures += 1;
                warn!("Failed to persist summary for {}: {}", endpoint, e);
            }
        }

        summary
    }

    pub fn summaries_written(&self) -> u64 {
        self.summaries_written
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::error::RelayError;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Collected(Arc<Mutex<Vec<String>>>);

    impl SummarySink for Collected {
        fn write_summary(&mut self, summary: &SessionSummary) -> Result<(), RelayError> {
            self.0.lock().unwrap().push(summary.csv_record());
            Ok(())
        }
    }

    struct Broken;

    impl SummarySink for Broken {
        fn write_summary(&mut self, _summary: &SessionSummary) -> Result<(), RelayError> {
            Err(RelayError::Io(std::io::Error::other("disk gone")))
        }
    }

    fn endpoint() -> SocketAddr {
        "10.0.0.1:41000".parse().unwrap()
    }

    #[test]
    fn test_summary_from_metrics() {
        let sink = Collected::default();
        let mut summarizer = SessionSummarizer::new(Box::new(sink.clone()));

        let mut metrics = PeerMetrics::new();
        metrics.observe(1, 1_000, 1_000);
        metrics.observe(2, 2_000, 2_010);
        metrics.observe(3, 3_000, 3_030);

        let summary = summarizer.on_disconnect(
            endpoint(),
            &DisconnectNotice::new("WiFi", Some(4)),
            None,
            Some(&metrics),
            3,
        );

        assert_eq!(summary.peer_count, 3);
        assert_eq!(summary.packet_loss, 0.0);
        assert_eq!(summary.avg_jitter, 20.0);
        assert_eq!(
            sink.0.lock().unwrap().as_slice(),
            ["0.00,20.00,13.33,WiFi,3,4".to_string()]
        );
        assert_eq!(summarizer.summaries_written(), 1);
    }

    #[test]
    fn test_unknown_peer_has_nan_averages() {
        let sink = Collected::default();
        let mut summarizer = SessionSummarizer::new(Box::new(sink.clone()));

        let summary =
            summarizer.on_disconnect(endpoint(), &DisconnectNotice::new("unknown", None), None, None, 0);

        assert!(summary.avg_latency.is_nan());
        assert!(summary.avg_jitter.is_nan());
        assert_eq!(summary.packet_loss, 0.0);
        assert_eq!(
            sink.0.lock().unwrap().as_slice(),
            ["0.00,NaN,NaN,unknown,0,".to_string()]
        );
    }

    #[test]
    fn test_sink_failure_is_not_fatal() {
        let mut summarizer = SessionSummarizer::new(Box::new(Broken));

        let summary =
            summarizer.on_disconnect(endpoint(), &DisconnectNotice::new("WiFi", None), None, None, 1);

        assert_eq!(summary.network_type, "WiFi");
        assert_eq!(summarizer.write_failures(), 1);
        assert_eq!(summarizer.summaries_written(), 0);
    }

    #[test]
    fn test_network_type_sanitized() {
        let summary = SessionSummary::new(
            endpoint(),
            None,
            PeerMetrics::new().summarize(),
            "Wi,Fi\n",
            1,
            None,
        );
        assert!(summary.csv_record().ends_with(",Wi_Fi_,1,"));
    }
}
