//! jamrelay server
//!
//! Relays UDP audio datagrams between peers, records per-peer telemetry and
//! hands out session ids over websocket.
//!
//! Run with:
//!   cargo run --bin jamrelay -- --port 41234
//!
//! With a config file and the session-bound framing:
//!   cargo run --bin jamrelay -- --config jamrelay.toml --framing session
//!
//! Environment variables:
//!   JAMRELAY_CONFIG - Path to a TOML config file
//!   RUST_LOG - Log filter (default: info)

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use jamrelay::config::RelayConfig;
use jamrelay::identity::{create_tls_acceptor, IdentityServer};
use jamrelay::protocol::Framing;
use jamrelay::relay::{
    AudioSink, CsvSummarySink, NullAudioSink, PcmFileSink, RelayEngine, SessionSummarizer,
    SystemClock, UdpTransport,
};

/// UDP audio relay hub
#[derive(Parser, Debug)]
#[command(name = "jamrelay")]
#[command(about = "UDP audio relay hub with per-peer network quality telemetry")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "JAMRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// UDP port to relay on
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind the relay and identity service to
    #[arg(long)]
    host: Option<IpAddr>,

    /// Packet framing: plain or session
    #[arg(long)]
    framing: Option<Framing>,

    /// Port of the session id websocket service
    #[arg(long)]
    identity_port: Option<u16>,

    /// Do not start the session id service
    #[arg(long)]
    no_identity: bool,

    /// Do not append relayed audio to disk
    #[arg(long)]
    no_audio: bool,

    /// CSV file for disconnect summaries
    #[arg(long)]
    stats_output: Option<PathBuf>,

    /// Path to TLS certificate file (PEM format) for the identity service
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format) for the identity service
    #[arg(long)]
    key: Option<PathBuf>,

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

/// Merge the config file (if any) with command line overrides
fn build_config(args: &Args) -> Result<RelayConfig> {
    let mut config = match &args.config {
        Some(path) => RelayConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RelayConfig::default(),
    };

    if let Some(host) = args.host {
        config.udp_bind.set_ip(host);
        config.identity_bind.set_ip(host);
    }
    if let Some(port) = args.port {
        config.udp_bind.set_port(port);
    }
    if let Some(port) = args.identity_port {
        config.identity_bind.set_port(port);
    }
    if let Some(framing) = args.framing {
        config.framing = framing;
    }
    if args.no_identity {
        config.identity_enabled = false;
    }
    if args.no_audio {
        config.record_audio = false;
    }
    if let Some(path) = &args.stats_output {
        config.stats_output = path.clone();
    }
    if args.cert.is_some() || args.key.is_some() {
        config.tls_cert = args.cert.clone();
        config.tls_key = args.key.clone();
    }

    config.validate()?;
    Ok(config)
}

fn start_identity_service(config: &RelayConfig) -> Result<tokio::task::JoinHandle<()>> {
    let mut server = IdentityServer::new();
    if let (Some(cert), Some(key)) = (&config.tls_cert, &config.tls_key) {
        info!("TLS enabled with cert: {:?}, key: {:?}", cert, key);
        server = server.with_tls(create_tls_acceptor(cert, key)?);
    } else {
        warn!("TLS disabled - identity service running in plain WebSocket mode");
    }

    let addr = config.identity_bind;
    Ok(tokio::spawn(async move {
        if let Err(e) = server.run(addr).await {
            error!("Identity service stopped: {}", e);
        }
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    let config = build_config(&args)?;

    info!("Relay starting on {} ({} framing)", config.udp_bind, config.framing);

    let transport = Arc::new(UdpTransport::bind(&config.udp_bind.to_string()).await?);

    let identity_handle = if config.identity_enabled {
        Some(start_identity_service(&config)?)
    } else {
        info!("Identity service disabled");
        None
    };

    let audio_sink: Box<dyn AudioSink> = if config.record_audio {
        Box::new(PcmFileSink::open(&config.audio_output)?)
    } else {
        Box::new(NullAudioSink)
    };
    let summarizer = SessionSummarizer::new(Box::new(CsvSummarySink::new(&config.stats_output)));
    info!("Session summaries go to {}", config.stats_output.display());

    let mut engine = RelayEngine::new(
        config.framing,
        transport.clone(),
        audio_sink,
        summarizer,
        Arc::new(SystemClock),
    );

    let mut stats_interval =
        tokio::time::interval(Duration::from_secs(config.stats_interval_secs));
    stats_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // Single reader: datagrams are handled strictly one at a time
    loop {
        tokio::select! {
            result = transport.recv_raw() => {
                match result {
                    Ok((data, sender)) => {
                        engine.on_datagram(&data, sender);
                    }
                    Err(e) => {
                        error!("Receive error: {}", e);
                    }
                }
            }

            _ = stats_interval.tick() => {
                log_stats(&engine);
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
        }
    }

    if let Some(handle) = identity_handle {
        handle.abort();
    }

    log_stats(&engine);
    Ok(())
}

fn log_stats(engine: &RelayEngine) {
    let stats = engine.stats();
    info!(
        "Stats: peers={}, received={}, relayed={}, dropped={}, disconnects={}, send_failures={}, summaries={}",
        engine.peer_count(),
        stats.packets_received,
        stats.packets_relayed,
        stats.packets_dropped,
        stats.disconnects,
        engine.send_failures(),
        engine.summarizer().summaries_written()
    );
}
