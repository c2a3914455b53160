//! Application Layer - Use cases and port definitions.

/// Port traits implemented by infrastructure adapters.
pub mod ports;

/// Market simulation, notification fan-out and request handling.
pub mod services;
