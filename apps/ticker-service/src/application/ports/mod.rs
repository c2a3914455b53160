//! Ports
//!
//! Interfaces the services depend on; adapters live in infrastructure.

mod market_randomness;
mod subscriber_callback;

#[cfg(test)]
pub use market_randomness::MockMarketRandomness;
pub use market_randomness::MarketRandomness;
pub use subscriber_callback::{DeliveryError, SharedCallback, SubscriberCallback};

use crate::domain::SubscriberRegistry;

/// Registry holding shared callback handles.
pub type Registry = SubscriberRegistry<SharedCallback>;
