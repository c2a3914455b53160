//! Service Configuration Settings
//!
//! Configuration types for the ticker service, loaded from environment variables.

use std::time::Duration;

/// Symbols seeded into the catalog at startup.
pub const DEFAULT_SEED_SYMBOLS: [&str; 6] = ["MSFT", "IBM", "AAPL", "GOOG", "YHOO", "INTC"];

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Bind address for both listeners.
    pub bind_host: String,
    /// WebSocket session server port.
    pub ws_port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            ws_port: 8733,
            health_port: 8734,
        }
    }
}

/// Market simulator settings.
#[derive(Debug, Clone)]
pub struct SimulatorSettings {
    /// Interval between ticks.
    pub tick_interval: Duration,
    /// Symbols seeded with a random opening price.
    pub seed_symbols: Vec<String>,
    /// Fixed RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            seed_symbols: DEFAULT_SEED_SYMBOLS.iter().map(ToString::to_string).collect(),
            rng_seed: None,
        }
    }
}

/// Per-session push settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Upper bound on handing one event to a session's outbound queue.
    pub delivery_timeout: Duration,
    /// Outbound frame queue capacity per session.
    pub outbound_capacity: usize,
    /// Time a new connection gets to complete the WebSocket upgrade.
    pub handshake_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            delivery_timeout: Duration::from_secs(1),
            outbound_capacity: 256,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Listener settings.
    pub server: ServerSettings,
    /// Simulator settings.
    pub simulator: SimulatorSettings,
    /// Session settings.
    pub session: SessionSettings,
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        let server = ServerSettings {
            bind_host: std::env::var("TICKER_BIND_HOST")
                .unwrap_or_else(|_| ServerSettings::default().bind_host),
            ws_port: parse_env_u16("TICKER_WS_PORT", ServerSettings::default().ws_port),
            health_port: parse_env_u16(
                "TICKER_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let tick_interval = parse_env_duration_millis(
            "TICKER_TICK_INTERVAL_MS",
            SimulatorSettings::default().tick_interval,
        );
        if tick_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "TICKER_TICK_INTERVAL_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let simulator = SimulatorSettings {
            tick_interval,
            seed_symbols: std::env::var("TICKER_SEED_SYMBOLS")
                .map(|v| parse_symbol_list(&v))
                .unwrap_or_else(|_| SimulatorSettings::default().seed_symbols),
            rng_seed: std::env::var("TICKER_RNG_SEED")
                .ok()
                .and_then(|v| v.parse().ok()),
        };

        let outbound_capacity = parse_env_usize(
            "TICKER_OUTBOUND_CAPACITY",
            SessionSettings::default().outbound_capacity,
        );
        if outbound_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "TICKER_OUTBOUND_CAPACITY".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let session = SessionSettings {
            delivery_timeout: parse_env_duration_millis(
                "TICKER_DELIVERY_TIMEOUT_MS",
                SessionSettings::default().delivery_timeout,
            ),
            outbound_capacity,
            handshake_timeout: parse_env_duration_millis(
                "TICKER_HANDSHAKE_TIMEOUT_MS",
                SessionSettings::default().handshake_timeout,
            ),
        };

        Ok(Self {
            server,
            simulator,
            session,
        })
    }

    /// WebSocket listener address.
    #[must_use]
    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.server.bind_host, self.server.ws_port)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable holds an unusable value.
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Split a comma-separated symbol list, dropping blanks.
#[must_use]
pub fn parse_symbol_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
