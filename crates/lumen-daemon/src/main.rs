//! Lumen Daemon - Main entry point
//!
//! Runs bulb discovery and serves the REST API and event feed.

mod api;
mod config;
mod server;
mod state;
mod ws;

use anyhow::Result;
use clap::Parser;
use lumen_core::CapabilityRecord;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "lumen")]
#[command(about = "Smart bulb discovery daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "lumen.toml")]
    config: PathBuf,

    /// Bind address for web server
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Run a full discovery pass, print every bulb found and exit
    #[arg(long)]
    discover: bool,

    /// Look up the capabilities of a single host and exit
    #[arg(long, conflicts_with = "discover")]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Lumen v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;

    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }

    info!(
        interfaces = ?config.discovery.interfaces,
        "Configuration loaded"
    );

    let state = state::AppState::new(config.clone()).await?;

    if args.discover {
        info!("Running discovery");
        let devices = state.scanner.discover().await;
        println!("Discovered {} bulbs:", devices.len());
        for record in &devices {
            print_record(record);
        }
    } else if let Some(host) = args.host {
        match state.scanner.get_capabilities(&host).await {
            Some(record) => print_record(&record),
            None => anyhow::bail!("No bulb answered at {}", host),
        }
    } else {
        server::run(state, &config.daemon.bind).await?;
    }

    Ok(())
}

fn print_record(record: &CapabilityRecord) {
    println!(
        "  - {} ({}) at {}",
        record.name().unwrap_or("unnamed"),
        record.id().unwrap_or("?"),
        record.location().unwrap_or("?"),
    );
    if let Some(model) = record.model() {
        println!("    Model: {}", model);
    }
    if let Some(fw_ver) = record.fw_ver() {
        println!("    Firmware: {}", fw_ver);
    }
}
