#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::items_after_statements
    )
)]

//! Ticker Service - Stock Ticker Duplex Server
//!
//! Holds a shared catalog of priced instruments, perturbs one price per tick
//! and pushes the change to every session that turned monitoring on.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Catalog and session state
//!   - `catalog`: Symbol to price store with insert-if-absent semantics
//!   - `session`: Session registry and subscriber records
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Subscriber callback and randomness interfaces
//!   - `services`: Simulator, dispatcher and request handler
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `websocket`: Duplex session server
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`: Prometheus metrics
//!
//! # Data Flow
//!
//! ```text
//!                 ┌──────────────┐   event   ┌──────────────┐
//! interval ──────►│  Simulator   │──────────►│  Dispatcher  │──► session 1
//!                 └──────┬───────┘           └──────┬───────┘──► session 2
//!                        │ update                   │ snapshot
//!                 ┌──────▼───────┐           ┌──────▼───────┐
//!  requests ─────►│ PriceCatalog │           │   Registry   │◄──── login / monitoring
//!                 └──────────────┘           └──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Catalog and session state.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::{PriceCatalog, RegistryStats, ServiceError, SubscriberRegistry, Symbol};

// Application
pub use application::ports::{
    DeliveryError, MarketRandomness, Registry, SharedCallback, SubscriberCallback,
};
pub use application::services::{
    DispatchReport, MarketSimulator, NotificationDispatcher, SessionContext, StockService,
    TickOutcome,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, ServiceConfig, SessionSettings};

// Session server
pub use infrastructure::websocket::{
    Incoming, SessionServer, SessionServerError, WebSocketCallback,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Randomness
pub use infrastructure::random::StdMarketRandomness;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
