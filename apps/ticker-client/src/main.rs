//! Ticker Client Binary
//!
//! Connects to the stock ticker service.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ticker-client                 # stream price changes
//! cargo run --bin ticker-client -- quote MSFT
//! cargo run --bin ticker-client -- add ACME 12.50
//! ```
//!
//! # Environment Variables
//!
//! - `TICKER_CLIENT_CONFIG`: Endpoint file (default: ticker-client.yaml)
//! - `TICKER_HOST`: Host override for every endpoint
//! - `RUST_LOG`: Log level (default: info)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use ticker_client::{
    BindingFlavor, ChannelManager, ChannelSettings, ConfigEndpointResolver, DEFAULT_CONFIG_PATH,
    Endpoint, StockCallback, StockServiceContract, TickerMonitor, telemetry,
};
use ticker_protocol::{ChangeEvent, STOCK_SERVICE_CONTRACT};
use tokio::signal;

/// Endpoint used when no config file exists.
const DEFAULT_ADDRESS: &str = "ws://localhost:8733/ticker";

/// How often the monitor checks that its session is still current.
const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Stock ticker client
#[derive(Parser)]
#[command(name = "ticker-client")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Endpoint configuration file
    #[arg(short, long, env = "TICKER_CLIENT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Host override for every endpoint
    #[arg(long, env = "TICKER_HOST")]
    host: Option<String>,

    /// Command to run (default: monitor)
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Stream live price changes until Ctrl+C
    Monitor,
    /// Print the current price of a symbol
    Quote {
        /// Stock symbol
        symbol: String,
    },
    /// Add a new instrument
    Add {
        /// Stock symbol
        symbol: String,
        /// Opening price
        price: Decimal,
    },
}

/// Prints every pushed change to stdout.
struct ConsoleTicker;

impl StockCallback for ConsoleTicker {
    fn stock_updated(&self, event: &ChangeEvent) {
        println!("{event}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Searches the working directory and its parents.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    telemetry::init();
    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("TLS crypto provider already installed");
    }

    let resolver = build_resolver(&cli)?;
    let manager = Arc::new(ChannelManager::new(
        Arc::new(resolver),
        ChannelSettings::default(),
    ));

    let result = match cli.command.unwrap_or(Command::Monitor) {
        Command::Monitor => monitor(&manager).await,
        Command::Quote { symbol } => quote(&manager, &symbol).await,
        Command::Add { symbol, price } => add(&manager, &symbol, price).await,
    };

    manager.close_all().await;
    result
}

fn build_resolver(cli: &Cli) -> anyhow::Result<ConfigEndpointResolver> {
    let resolver = if cli.config.exists() {
        ConfigEndpointResolver::from_path(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?
    } else {
        tracing::info!(
            path = %cli.config.display(),
            address = DEFAULT_ADDRESS,
            "Endpoint file not found, using default endpoint"
        );
        ConfigEndpointResolver::from_endpoints([Endpoint::parse(
            STOCK_SERVICE_CONTRACT,
            DEFAULT_ADDRESS,
            BindingFlavor::WebSocket,
        )?])
    };

    Ok(match &cli.host {
        Some(host) => resolver.with_host_override(Some(host.clone())),
        None => resolver,
    })
}

async fn monitor(manager: &Arc<ChannelManager>) -> anyhow::Result<()> {
    let mut monitor = TickerMonitor::new(Arc::clone(manager), Arc::new(ConsoleTicker));
    monitor.ensure_session().await?;
    tracing::info!("Monitoring started, press Ctrl+C to stop");

    let mut check = tokio::time::interval(SESSION_CHECK_INTERVAL);
    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Ctrl+C handler unavailable");
                }
                break;
            }
            _ = check.tick() => match monitor.ensure_session().await {
                Ok(true) => tracing::info!("Session restored on a new channel"),
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, "Session unavailable, retrying"),
            }
        }
    }

    monitor.shutdown().await;
    Ok(())
}

async fn quote(manager: &ChannelManager, symbol: &str) -> anyhow::Result<()> {
    let channel = manager.acquire::<StockServiceContract>(None).await?;
    channel.login().await?;

    match channel.get_quote(symbol).await {
        Ok(instrument) => println!("{instrument}"),
        Err(e) => match e.fault() {
            Some(fault) => println!("Stock {symbol} was not retrieved. {}", fault.reason),
            None => return Err(e.into()),
        },
    }

    if let Err(e) = channel.logout(None).await {
        tracing::warn!(error = %e, "Failed to log out");
    }
    manager.release::<StockServiceContract>(&channel).await;
    Ok(())
}

async fn add(manager: &ChannelManager, symbol: &str, price: Decimal) -> anyhow::Result<()> {
    let channel = manager.acquire::<StockServiceContract>(None).await?;
    channel.login().await?;

    match channel.add_instrument(symbol, price).await {
        Ok(()) => println!("Stock {symbol} added at price {price}."),
        Err(e) => match e.fault() {
            Some(fault) => println!("Stock {symbol} at price {price} was not added. {}", fault.reason),
            None => return Err(e.into()),
        },
    }

    if let Err(e) = channel.logout(None).await {
        tracing::warn!(error = %e, "Failed to log out");
    }
    manager.release::<StockServiceContract>(&channel).await;
    Ok(())
}
