//! Configuration Module
//!
//! Environment-driven configuration for the ticker service.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_SEED_SYMBOLS, ServerSettings, ServiceConfig, SessionSettings,
    SimulatorSettings, parse_symbol_list,
};
