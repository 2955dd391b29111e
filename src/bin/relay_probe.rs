//! Relay probe
//!
//! Streams synthetic audio packets through a running jamrelay, counts the
//! datagrams relayed back from other peers and finishes with a DISCONNECT
//! so the relay writes a session summary.
//!
//! Run two probes against the same relay to see packets flow both ways:
//!   cargo run --bin relay-probe -- --relay 127.0.0.1:41234 --count 500
//!
//! Session-bound framing with an id from the identity service:
//!   cargo run --bin relay-probe -- --framing session --identity ws://127.0.0.1:8080

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::Rng;
use tokio::net::UdpSocket;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use jamrelay::identity::IdentityClient;
use jamrelay::protocol::{DisconnectNotice, Framing, Packet, SessionId};
use jamrelay::relay::{Clock, SystemClock, MAX_DATAGRAM_SIZE};

/// Synthetic peer for a jamrelay hub
#[derive(Parser, Debug)]
#[command(name = "relay-probe")]
#[command(about = "Send synthetic audio through a jamrelay hub and report what comes back")]
#[command(version)]
struct Args {
    /// Relay UDP address
    #[arg(short, long, default_value = "127.0.0.1:41234")]
    relay: SocketAddr,

    /// Identity service URL (ws:// or wss://), required for session framing
    #[arg(long)]
    identity: Option<String>,

    /// Packet framing: plain or session
    #[arg(long, default_value = "plain")]
    framing: Framing,

    /// Number of packets to send
    #[arg(short, long, default_value = "200")]
    count: u64,

    /// Interval between packets in milliseconds
    #[arg(short, long, default_value = "10")]
    interval_ms: u64,

    /// Payload size in bytes
    #[arg(long, default_value = "480")]
    payload_size: usize,

    /// Probability of skipping a sequence number (simulated loss)
    #[arg(long, default_value = "0.0")]
    loss: f64,

    /// Network type reported in the DISCONNECT message
    #[arg(long, default_value = "unknown")]
    network_type: String,

    /// Session rating reported in the DISCONNECT message
    #[arg(long)]
    rating: Option<u8>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

async fn resolve_session(args: &Args) -> Result<Option<SessionId>> {
    match (&args.identity, args.framing) {
        (Some(url), _) => {
            let id = IdentityClient::new(url)
                .request_id()
                .await
                .with_context(|| format!("Failed to get session id from {}", url))?;
            info!("Session id: {}", id);
            Ok(Some(id))
        }
        (None, Framing::Session) => bail!("Session framing needs --identity"),
        (None, Framing::Plain) => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    if !(0.0..1.0).contains(&args.loss) {
        bail!("--loss must be in [0, 1)");
    }

    let session_id = resolve_session(&args).await?;

    let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
    info!(
        "Probe {} -> relay {} ({} framing)",
        socket.local_addr()?,
        args.relay,
        args.framing
    );

    let received = Arc::new(AtomicU64::new(0));
    let receiver = {
        let socket = socket.clone();
        let received = received.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            while let Ok((len, from)) = socket.recv_from(&mut buf).await {
                debug!("Relayed {} bytes from {}", len, from);
                received.fetch_add(1, Ordering::Relaxed);
            }
        })
    };

    let clock = SystemClock;
    let payload: Vec<u8> = (0..args.payload_size).map(|i| (i % 256) as u8).collect();
    let mut rng = rand::thread_rng();
    let mut interval = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut sequence = 0u64;
    let mut sent = 0u64;
    let mut skipped = 0u64;

    while sent < args.count {
        interval.tick().await;

        if args.loss > 0.0 && rng.gen_bool(args.loss) {
            sequence = sequence.wrapping_add(1);
            skipped += 1;
            continue;
        }

        let mut packet = Packet::audio(sequence, clock.now_ms(), payload.clone());
        if let Some(id) = session_id {
            packet = packet.with_session(id);
        }
        socket
            .send_to(&packet.to_bytes(args.framing), args.relay)
            .await?;

        sequence = sequence.wrapping_add(1);
        sent += 1;
    }

    // Give in-flight relayed packets a moment to land
    tokio::time::sleep(Duration::from_millis(200)).await;

    let notice = DisconnectNotice::new(args.network_type.clone(), args.rating);
    socket.send_to(&notice.to_bytes(), args.relay).await?;
    receiver.abort();

    info!(
        "Sent {} packets ({} skipped), received {} relayed datagrams",
        sent,
        skipped,
        received.load(Ordering::Relaxed)
    );

    Ok(())
}
