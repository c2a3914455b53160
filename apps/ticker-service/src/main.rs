//! Ticker Service Binary
//!
//! Starts the stock ticker duplex service.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ticker-service
//! ```
//!
//! # Environment Variables
//!
//! - `TICKER_BIND_HOST`: Listener address (default: 0.0.0.0)
//! - `TICKER_WS_PORT`: WebSocket session port (default: 8733)
//! - `TICKER_HEALTH_PORT`: Health check HTTP port (default: 8734)
//! - `TICKER_TICK_INTERVAL_MS`: Simulator interval (default: 2000)
//! - `TICKER_DELIVERY_TIMEOUT_MS`: Per-push queue timeout (default: 1000)
//! - `TICKER_OUTBOUND_CAPACITY`: Per-session outbound queue (default: 256)
//! - `TICKER_HANDSHAKE_TIMEOUT_MS`: WebSocket upgrade deadline (default: 10000)
//! - `TICKER_SEED_SYMBOLS`: Comma-separated seed symbols (default: MSFT,IBM,AAPL,GOOG,YHOO,INTC)
//! - `TICKER_RNG_SEED`: Fixed RNG seed (default: OS entropy)
//! - `RUST_LOG`: Log filter (default: `ticker_service=info`)

use std::sync::Arc;
use std::time::Duration;

use ticker_service::infrastructure::telemetry;
use ticker_service::{
    HealthServer, HealthServerState, MarketRandomness, MarketSimulator, NotificationDispatcher,
    PriceCatalog, Registry, ServiceConfig, SessionServer, StdMarketRandomness, StockService,
    init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// How long tasks get to drain after a shutdown signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting ticker service");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder unavailable, metrics disabled");
    }

    let config = ServiceConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Shared state, constructed once and passed by reference
    let catalog = Arc::new(PriceCatalog::new());
    let registry = Arc::new(Registry::new());
    let service = Arc::new(StockService::new(
        Arc::clone(&catalog),
        Arc::clone(&registry),
    ));

    let randomness: Box<dyn MarketRandomness> = match config.simulator.rng_seed {
        Some(seed) => Box::new(StdMarketRandomness::seeded(seed)),
        None => Box::new(StdMarketRandomness::from_os()),
    };
    let dispatcher = Arc::new(NotificationDispatcher::new(Arc::clone(&registry)));
    let simulator = Arc::new(MarketSimulator::new(
        Arc::clone(&catalog),
        dispatcher,
        randomness,
        config.simulator.tick_interval,
    ));
    simulator.seed(&config.simulator.seed_symbols).await;

    let session_server = Arc::new(SessionServer::new(
        Arc::clone(&service),
        config.session.clone(),
    ));
    let listener = SessionServer::bind(&config.ws_addr()).await?;

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&service),
        Arc::clone(&simulator),
        Arc::clone(&session_server),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    let simulator_handle = tokio::spawn(Arc::clone(&simulator).run(shutdown_token.clone()));

    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let sessions_handle = tokio::spawn(
        Arc::clone(&session_server).serve(listener, shutdown_token.clone()),
    );

    tracing::info!("Ticker service ready");

    await_shutdown(shutdown_token).await;

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        if let Err(e) = simulator_handle.await {
            tracing::error!(error = %e, "Simulator task failed");
        }
        if let Err(e) = sessions_handle.await {
            tracing::error!(error = %e, "Session server task failed");
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Shutdown timed out");
    }

    tracing::info!("Ticker service stopped");
    Ok(())
}

/// Pick up the nearest `.env`, walking up from the working directory.
fn load_dotenv() {
    let Ok(cwd) = std::env::current_dir() else {
        return;
    };
    if let Some(path) = cwd
        .ancestors()
        .map(|dir| dir.join(".env"))
        .find(|candidate| candidate.is_file())
        && let Err(e) = dotenvy::from_path(&path)
    {
        eprintln!("ignoring {}: {e}", path.display());
    }
}

/// Log the parsed configuration.
fn log_config(config: &ServiceConfig) {
    tracing::info!(
        ws_addr = %config.ws_addr(),
        health_port = config.server.health_port,
        tick_interval_ms = u64::try_from(config.simulator.tick_interval.as_millis()).unwrap_or(u64::MAX),
        seed_symbols = ?config.simulator.seed_symbols,
        "Configuration loaded"
    );
}

/// Resolve on SIGINT or SIGTERM, then cancel `shutdown_token`.
async fn await_shutdown(shutdown_token: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal_name = tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Cannot listen for Ctrl+C");
            }
            "SIGINT"
        }
        () = terminate => "SIGTERM",
    };

    tracing::info!(
        signal = signal_name,
        grace_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Shutting down"
    );
    shutdown_token.cancel();
}
