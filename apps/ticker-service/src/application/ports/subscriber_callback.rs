//! Subscriber Callback Port
//!
//! Push side of a session's duplex channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ticker_protocol::ChangeEvent;

/// Delivery failures. Internal only; never surfaced to a caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The peer did not accept the event in time.
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    /// The peer's channel is gone.
    #[error("subscriber channel closed")]
    Closed,

    /// The event could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Handle used to push change events to one peer.
#[async_trait]
pub trait SubscriberCallback: Send + Sync {
    /// Deliver a change event.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError` if the event could not be handed to the peer.
    async fn stock_updated(&self, event: &ChangeEvent) -> Result<(), DeliveryError>;
}

/// Shared callback handle stored in the registry.
pub type SharedCallback = Arc<dyn SubscriberCallback>;
