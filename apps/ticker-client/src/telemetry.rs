//! Tracing Setup
//!
//! Console logging through `tracing-subscriber`. Logs go to stderr so
//! ticker output on stdout stays clean.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log filter (default: `ticker_client=info`)

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "ticker_client=info";

/// Install the global subscriber. A second call is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init();
}
