//! Application Services

/// Fault-isolated fan-out of change events.
pub mod dispatcher;

/// Periodic price perturbation.
pub mod simulator;

/// Request handling for the stock service contract.
pub mod stock_service;

pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use simulator::{DEFAULT_TICK_INTERVAL, MarketSimulator, TickOutcome, reflect_delta};
pub use stock_service::{Handled, SessionContext, StockService};
