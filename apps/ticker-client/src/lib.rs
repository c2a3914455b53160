//! Ticker Client
//!
//! Client side of the stock ticker duplex service.
//!
//! # Layout
//!
//! - `channel`: transport-neutral [`DuplexChannel`] / [`ChannelFactory`]
//!   traits and the [`ChannelManager`] that caches one channel per
//!   contract, refreshes it after `expiration` and recovers it on fault
//! - `endpoint`: contract name to address resolution from YAML
//! - `service`: the stock service contract over WebSocket
//! - `monitor`: keeps a logged-in monitoring session alive across channel
//!   replacement
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ticker_client::{
//!     ChannelManager, ChannelSettings, ConfigEndpointResolver, StockServiceContract,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = ConfigEndpointResolver::from_path("ticker-client.yaml")?;
//! let manager = ChannelManager::new(Arc::new(resolver), ChannelSettings::default());
//!
//! let channel = manager.acquire::<StockServiceContract>(None).await?;
//! let quote = channel.get_quote("MSFT").await?;
//! println!("{quote}");
//! manager.release::<StockServiceContract>(&channel).await;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod channel;
pub mod endpoint;
pub mod error;
pub mod monitor;
pub mod service;
pub mod telemetry;

pub use channel::{
    ChannelFactory, ChannelId, ChannelManager, ChannelSettings, ChannelState, Contract,
    ContractChannel, DuplexChannel, ReconnectConfig, ReconnectPolicy,
};
pub use endpoint::{
    BindingFlavor, ConfigEndpointResolver, DEFAULT_CONFIG_PATH, Endpoint, EndpointConfigError,
    EndpointResolver,
};
pub use error::ChannelError;
pub use monitor::TickerMonitor;
pub use service::{StockCallback, StockServiceChannel, StockServiceContract, StockServiceFactory};
