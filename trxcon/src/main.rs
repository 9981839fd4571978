//! GSM Transceiver Connector
//!
//! Main entry point: connects to a transceiver process, configures it once it
//! starts sending clock indications and keeps it configured across restarts.

mod config;
mod self_test;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use config::TrxconConfig;
use interfaces::trx_link;
use layers::{TrxControlSession, TrxEventLoop};

/// GSM transceiver connector
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "trxcon.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error), overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Transceiver host
    #[arg(long)]
    trx_host: Option<String>,

    /// Transceiver base port (clock channel)
    #[arg(long)]
    trx_port: Option<u16>,

    /// ARFCN to tune to
    #[arg(long)]
    arfcn: Option<u16>,

    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Exercise the radio sample buffers against a simulated radio
    SelfTest,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file_config = TrxconConfig::load(&args.config)?;
    let mut config = file_config.clone().unwrap_or_default();

    // Initialize logging
    let log_level = args.log_level.clone().unwrap_or_else(|| config.log.level.clone());
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&log_level));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting GSM transceiver connector");
    if file_config.is_none() {
        warn!("Configuration file {} not found, using defaults", args.config);
    } else {
        info!("Configuration file: {}", args.config);
    }

    if let Some(Mode::SelfTest) = args.command {
        let report = self_test::run(config.radio_config()?, &config.radio.device_args)?;
        println!("self-test: {} steps, {} failures", report.steps, report.failures);
        if !report.passed() {
            anyhow::bail!("self-test failed");
        }
        return Ok(());
    }

    if let Some(host) = args.trx_host {
        config.trx.host = host;
    }
    if let Some(port) = args.trx_port {
        config.trx.base_port = port;
    }
    if let Some(arfcn) = args.arfcn {
        config.cell.arfcn = arfcn;
    }

    let session_config = config.session_config()?;
    let poll_interval = config.poll_interval()?;

    info!("Cell configuration:");
    info!("  Band: {:?}, ARFCN: {}", config.cell.band, config.cell.arfcn);
    info!("  TX: {} kHz, RX: {} kHz", session_config.tx_freq_khz, session_config.rx_freq_khz);
    info!("  TSC: {}, BSIC: {}", session_config.tsc, session_config.bsic);
    info!("  Clock advance: {} frames", session_config.clock_advance);

    let (mux, sink) = trx_link::connect(&config.link_config())
        .await
        .with_context(|| format!("opening channels to {}:{}", config.trx.host, config.trx.base_port))?;

    let running = Arc::new(RwLock::new(true));
    let session = TrxControlSession::new(sink, session_config);
    let (mut event_loop, phy) = TrxEventLoop::new(session, mux, poll_interval, running.clone());

    // No PHY attached: drain uplink bursts so the queue never fills
    let mut uplink = phy.uplink;
    let uplink_handle = tokio::spawn(async move {
        let mut received = 0u64;
        while let Some(burst) = uplink.recv().await {
            received += 1;
            debug!("Uplink burst TS{} FN={} RSSI={}", burst.timeslot, burst.frame_number, burst.rssi);
        }
        received
    });

    let mut loop_handle = tokio::spawn(async move { event_loop.run().await });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            *running.write().await = false;
        }
        result = &mut loop_handle => {
            error!("TRX event loop stopped unexpectedly");
            result??;
            return Ok(());
        }
    }

    info!("Shutting down");
    match tokio::time::timeout(poll_interval * 2, loop_handle).await {
        Ok(result) => result??,
        Err(_) => warn!("TRX event loop did not stop in time"),
    }

    drop(phy.downlink);
    if let Ok(Ok(received)) = tokio::time::timeout(poll_interval, uplink_handle).await {
        info!("Uplink bursts received: {}", received);
    }

    info!("Shutdown complete");
    Ok(())
}
