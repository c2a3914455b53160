//! Infrastructure Layer - Adapters and external integrations.

/// Configuration loaded from the environment.
pub mod config;

/// Health check and metrics HTTP endpoint.
pub mod health;

/// Prometheus metrics.
pub mod metrics;

/// OS-seeded randomness adapter.
pub mod random;

/// Tracing subscriber setup.
pub mod telemetry;

/// WebSocket session server.
pub mod websocket;
