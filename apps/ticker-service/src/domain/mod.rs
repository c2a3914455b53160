//! Domain Layer - Catalog and session state.
//!
//! Pure state holders shared by the request handlers and the market
//! simulator. Nothing here knows about transports.

/// Service error taxonomy.
pub mod error;

/// Symbol value object.
pub mod instrument;

/// Concurrent symbol to price store.
pub mod catalog;

/// Session registry and subscriber records.
pub mod session;

pub use catalog::PriceCatalog;
pub use error::ServiceError;
pub use instrument::Symbol;
pub use session::{RegistryStats, SubscriberRecord, SubscriberRegistry};
