//! Duplex Channels
//!
//! Transport-neutral channel abstraction and the cache that owns channel
//! lifetimes.
//!
//! ```text
//! ┌──────────────────┐ acquire::<C>() ┌──────────────────┐
//! │  caller          │ ─────────────► │  ChannelManager  │
//! └──────────────────┘                │  slot per C      │
//!                                     └────────┬─────────┘
//!                         resolve + create     │ open / reopen
//!                  ┌───────────────────────────┼──────────────┐
//!                  ▼                           ▼              ▼
//!        ┌──────────────────┐       ┌──────────────────┐ ┌──────────┐
//!        │ EndpointResolver │       │ C::Factory       │ │ watcher  │
//!        └──────────────────┘       └──────────────────┘ └──────────┘
//! ```

mod manager;
mod reconnect;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::endpoint::Endpoint;
use crate::error::ChannelError;

pub use manager::ChannelManager;
pub use reconnect::{ReconnectConfig, ReconnectPolicy};

/// Lifecycle of a duplex channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Built, not yet connecting.
    Created,
    /// Connecting.
    Opening,
    /// Usable.
    Opened,
    /// Graceful close in progress.
    Closing,
    /// Closed by either side.
    Closed,
    /// Transport failed.
    Faulted,
}

impl ChannelState {
    /// Whether the channel can never be used again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Faulted)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Opening => "opening",
            Self::Opened => "opened",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Process-unique channel identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Allocate the next id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// A bidirectional channel with observable lifecycle.
#[async_trait]
pub trait DuplexChannel: Send + Sync + 'static {
    /// Channel identity.
    fn id(&self) -> ChannelId;

    /// Current state.
    fn state(&self) -> ChannelState;

    /// Stream of state transitions.
    fn subscribe_state(&self) -> watch::Receiver<ChannelState>;

    /// Graceful close. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake could not be performed.
    async fn close(&self) -> Result<(), ChannelError>;

    /// Immediate teardown. Idempotent.
    fn abort(&self);
}

/// Opens channels to one endpoint.
#[async_trait]
pub trait ChannelFactory: Send + Sync + 'static {
    /// Channel type produced.
    type Channel: DuplexChannel;

    /// Open a new channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel could not be opened.
    async fn open(&self) -> Result<Arc<Self::Channel>, ChannelError>;
}

/// A service contract that channels can be acquired for.
pub trait Contract: Send + Sync + 'static {
    /// Name used for endpoint resolution.
    const NAME: &'static str;

    /// Handler for server-initiated messages.
    type Callback: ?Sized + Send + Sync + 'static;

    /// Factory type for this contract.
    type Factory: ChannelFactory;

    /// Build a factory bound to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be served by this contract.
    fn create_factory(
        endpoint: Endpoint,
        callback: Option<Arc<Self::Callback>>,
        settings: &ChannelSettings,
    ) -> Result<Self::Factory, ChannelError>;
}

/// Channel type acquired for contract `C`.
pub type ContractChannel<C> = <<C as Contract>::Factory as ChannelFactory>::Channel;

/// Channel lifetime and transport timeouts.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Idle time after which a cached channel is replaced on next acquire.
    pub expiration: Duration,
    /// Time allowed for a graceful close before aborting.
    pub close_timeout: Duration,
    /// Time allowed for connecting and the session handshake.
    pub connect_timeout: Duration,
    /// Time allowed for one request/reply exchange.
    pub request_timeout: Duration,
    /// Retry pacing after a failed reopen.
    pub reconnect: ReconnectConfig,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            expiration: Duration::from_secs(10 * 60),
            close_timeout: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(ChannelState::Closed.is_terminal());
        assert!(ChannelState::Faulted.is_terminal());
        assert!(!ChannelState::Opened.is_terminal());
        assert!(!ChannelState::Closing.is_terminal());
    }

    #[test]
    fn ids_are_unique() {
        let a = ChannelId::next();
        let b = ChannelId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn default_settings() {
        let settings = ChannelSettings::default();
        assert_eq!(settings.expiration, Duration::from_secs(600));
        assert_eq!(settings.close_timeout, Duration::from_millis(100));
    }
}
