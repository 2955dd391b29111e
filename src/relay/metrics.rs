//! Per-peer network quality metrics
//!
//! Derives latency, jitter and packet loss from the sequence number and
//! sender timestamp carried by every accepted audio packet.

use std::collections::VecDeque;

/// Number of samples kept in each sliding window
pub const WINDOW_CAPACITY: usize = 50;

/// Fixed-capacity FIFO of the most recent samples
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    samples: VecDeque<u64>,
    capacity: usize,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest once full
    pub fn push(&mut self, sample: u64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<u64> {
        self.samples.back().copied()
    }

    /// Sample recorded just before the latest one
    pub fn previous(&self) -> Option<u64> {
        self.samples.iter().rev().nth(1).copied()
    }

    /// Arithmetic mean, NaN when empty
    pub fn mean(&self) -> f64 {
        let sum: f64 = self.samples.iter().map(|&s| s as f64).sum();
        sum / self.samples.len() as f64
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.samples.iter().copied()
    }
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self::new(WINDOW_CAPACITY)
    }
}

/// What one accepted packet contributed to the metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketObservation {
    /// Offset-corrected latency, possibly negative
    pub latency_ms: i64,
    /// Jitter appended for this packet, if any
    pub jitter_ms: Option<u64>,
    /// Whether the sequence number broke the expected progression
    pub sequence_gap: bool,
}

/// Aggregate statistics over the current windows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSummary {
    pub avg_latency: f64,
    pub avg_jitter: f64,
    pub loss_percentage: f64,
}

/// Latency, jitter and loss state for one peer
#[derive(Debug, Clone, Default)]
pub struct PeerMetrics {
    /// Clock correction fixed by the first packet
    clock_offset: Option<u64>,
    latencies: SlidingWindow,
    jitters: SlidingWindow,
    /// Whether the latest `record_latency` call appended a sample
    latency_accepted: bool,
    last_sequence: Option<u64>,
    packets_received: u64,
    packets_lost: u64,
}

impl PeerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one accepted packet through latency, jitter and sequence tracking
    pub fn observe(&mut self, sequence: u64, sent_at_ms: u64, now_ms: u64) -> PacketObservation {
        let latency_ms = self.record_latency(now_ms, sent_at_ms);
        let jitter_ms = self.record_jitter_if_possible();
        let sequence_gap = self.record_sequence(sequence);

        PacketObservation {
            latency_ms,
            jitter_ms,
            sequence_gap,
        }
    }

    /// Compute the offset-corrected latency for a packet
    ///
    /// The first call fixes the clock offset at `|now - sent_at|`. Negative
    /// latencies are returned but not kept in the window.
    pub fn record_latency(&mut self, now_ms: u64, sent_at_ms: u64) -> i64 {
        // Both clocks span the full u64 range, so the difference needs i128
        let delta = now_ms as i128 - sent_at_ms as i128;
        let offset = *self
            .clock_offset
            .get_or_insert(u64::try_from(delta.unsigned_abs()).unwrap_or(u64::MAX));
        let latency = delta + offset as i128;

        self.latency_accepted = latency >= 0;
        if self.latency_accepted {
            self.latencies.push(u64::try_from(latency).unwrap_or(u64::MAX));
        }

        latency.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// Append `|latest - previous|` latency once more than two samples exist
    pub fn record_jitter_if_possible(&mut self) -> Option<u64> {
        // A discarded sample leaves the window's last pair unchanged; its jitter is already counted
        if !self.latency_accepted || self.latencies.len() <= 2 {
            return None;
        }

        let latest = self.latencies.latest()?;
        let previous = self.latencies.previous()?;
        let jitter = latest.abs_diff(previous);
        self.jitters.push(jitter);

        Some(jitter)
    }

    /// Track the sequence number, returning true when it counts as a loss
    ///
    /// Any value other than `previous + 1` is one loss event regardless of
    /// the gap size. The first packet never counts.
    pub fn record_sequence(&mut self, sequence: u64) -> bool {
        self.packets_received += 1;

        let gap = match self.last_sequence {
            Some(previous) => sequence != previous.wrapping_add(1),
            None => false,
        };
        if gap {
            self.packets_lost += 1;
        }
        self.last_sequence = Some(sequence);

        gap
    }

    /// Means over the current windows plus the loss percentage
    pub fn summarize(&self) -> MetricsSummary {
        MetricsSummary {
            avg_latency: self.latencies.mean(),
            avg_jitter: self.jitters.mean(),
            loss_percentage: self.loss_percentage(),
        }
    }

    /// `lost / max(received, 1) * 100`
    pub fn loss_percentage(&self) -> f64 {
        self.packets_lost as f64 / self.packets_received.max(1) as f64 * 100.0
    }

    pub fn clock_offset(&self) -> Option<u64> {
        self.clock_offset
    }

    pub fn latencies(&self) -> &SlidingWindow {
        &self.latencies
    }

    pub fn jitters(&self) -> &SlidingWindow {
        &self.jitters
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }

    pub fn packets_lost(&self) -> u64 {
        self.packets_lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = SlidingWindow::new(WINDOW_CAPACITY);
        for i in 0..=WINDOW_CAPACITY as u64 {
            window.push(i);
        }

        assert_eq!(window.len(), WINDOW_CAPACITY);
        assert_eq!(window.iter().next(), Some(1));
        assert_eq!(window.latest(), Some(WINDOW_CAPACITY as u64));
    }

    #[test]
    fn test_empty_window_mean_is_nan() {
        assert!(SlidingWindow::default().mean().is_nan());
    }

    #[test]
    fn test_sequential_packets() {
        let mut metrics = PeerMetrics::new();

        for seq in 0..10 {
            assert!(!metrics.record_sequence(seq), "Unexpected loss at {}", seq);
        }

        assert_eq!(metrics.packets_received(), 10);
        assert_eq!(metrics.packets_lost(), 0);
        assert_eq!(metrics.loss_percentage(), 0.0);
    }

    #[test]
    fn test_gap_counts_once() {
        let mut metrics = PeerMetrics::new();

        for seq in [1, 2, 3, 5] {
            metrics.record_sequence(seq);
        }
        assert_eq!(metrics.packets_lost(), 1);

        // Gap size does not matter
        metrics.record_sequence(500);
        assert_eq!(metrics.packets_lost(), 2);
    }

    #[test]
    fn test_duplicate_and_reordered_count_as_loss() {
        let mut metrics = PeerMetrics::new();

        metrics.record_sequence(10);
        assert!(metrics.record_sequence(10));
        assert!(metrics.record_sequence(9));
        assert!(!metrics.record_sequence(10));
        assert_eq!(metrics.packets_lost(), 2);
    }

    #[test]
    fn test_first_packet_never_lost() {
        let mut metrics = PeerMetrics::new();
        assert!(!metrics.record_sequence(1_000_000));
        assert_eq!(metrics.packets_lost(), 0);
    }

    #[test]
    fn test_sequence_wraparound() {
        let mut metrics = PeerMetrics::new();
        metrics.record_sequence(u64::MAX);
        assert!(!metrics.record_sequence(0));
    }

    #[test]
    fn test_clock_offset_fixed_by_first_packet() {
        let mut metrics = PeerMetrics::new();

        // Peer clock 300ms behind: delta 300, offset 300
        let first = metrics.record_latency(10_300, 10_000);
        assert_eq!(metrics.clock_offset(), Some(300));
        assert_eq!(first, 600);

        // Offset stays at 300 even when the delta changes
        let second = metrics.record_latency(20_350, 20_000);
        assert_eq!(metrics.clock_offset(), Some(300));
        assert_eq!(second, 650);
    }

    #[test]
    fn test_peer_clock_ahead() {
        let mut metrics = PeerMetrics::new();

        // Peer clock 200ms ahead: delta -200, offset 200, latency 0
        assert_eq!(metrics.record_latency(1_000, 1_200), 0);
        assert_eq!(metrics.latencies().len(), 1);
    }

    #[test]
    fn test_negative_latency_discarded() {
        let mut metrics = PeerMetrics::new();

        metrics.record_latency(1_000, 1_000);
        assert_eq!(metrics.clock_offset(), Some(0));

        let latency = metrics.record_latency(2_000, 2_050);
        assert_eq!(latency, -50);
        assert_eq!(metrics.latencies().len(), 1);
        assert_eq!(metrics.record_jitter_if_possible(), None);
    }

    #[test]
    fn test_timestamp_with_top_bit_set() {
        let mut metrics = PeerMetrics::new();

        // Peer clock far ahead: offset cancels the delta
        assert_eq!(metrics.record_latency(1_700_000_000_000, 1u64 << 63), 0);
        assert_eq!(metrics.clock_offset(), Some((1u64 << 63) - 1_700_000_000_000));

        let latency = metrics.record_latency(1_700_000_000_010, u64::MAX);
        assert!(latency < 0);
        assert_eq!(metrics.latencies().len(), 1);
    }

    #[test]
    fn test_latency_saturates_instead_of_wrapping() {
        let mut metrics = PeerMetrics::new();

        // delta u64::MAX plus an equal offset exceeds both i64 and u64
        assert_eq!(metrics.record_latency(u64::MAX, 0), i64::MAX);
        assert_eq!(metrics.latencies().latest(), Some(u64::MAX));
    }

    #[test]
    fn test_mean_of_huge_samples() {
        let mut metrics = PeerMetrics::new();
        for seq in 0..3 {
            metrics.observe(seq, 0, u64::MAX / 2);
        }

        let summary = metrics.summarize();
        assert!(summary.avg_latency.is_finite());
        assert!((summary.avg_latency - u64::MAX as f64).abs() / (u64::MAX as f64) < 1e-9);
        assert_eq!(summary.avg_jitter, 0.0);
    }

    #[test]
    fn test_jitter_needs_three_samples() {
        let mut metrics = PeerMetrics::new();
        metrics.record_latency(1_000, 1_000); // offset 0, latency 0

        metrics.record_latency(2_010, 2_000);
        assert_eq!(metrics.record_jitter_if_possible(), None);

        metrics.record_latency(3_040, 3_000);
        // Window [0, 10, 40] -> |40 - 10|
        assert_eq!(metrics.record_jitter_if_possible(), Some(30));
        assert_eq!(metrics.jitters().len(), 1);
    }

    #[test]
    fn test_latency_window_capped() {
        let mut metrics = PeerMetrics::new();
        for i in 0..(WINDOW_CAPACITY as u64 + 20) {
            metrics.observe(i, 1_000 * i, 1_000 * i + 5);
        }

        assert_eq!(metrics.latencies().len(), WINDOW_CAPACITY);
        assert_eq!(metrics.jitters().len(), WINDOW_CAPACITY);
    }

    #[test]
    fn test_summarize() {
        let mut metrics = PeerMetrics::new();
        metrics.observe(1, 1_000, 1_000); // latency 0
        metrics.observe(2, 2_000, 2_010); // latency 10
        metrics.observe(4, 3_000, 3_030); // latency 30, jitter 20, gap

        let summary = metrics.summarize();
        assert!((summary.avg_latency - 40.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.avg_jitter, 20.0);
        assert!((summary.loss_percentage - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_summarize_empty() {
        let summary = PeerMetrics::new().summarize();
        assert!(summary.avg_latency.is_nan());
        assert!(summary.avg_jitter.is_nan());
        assert_eq!(summary.loss_percentage, 0.0);
    }
}
