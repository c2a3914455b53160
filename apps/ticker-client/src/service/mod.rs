//! Stock Service Contract
//!
//! Client side of the duplex stock service: the contract marker used with
//! [`ChannelManager`](crate::ChannelManager), its factory, and the
//! WebSocket channel carrying requests and price pushes.

mod channel;

use std::sync::Arc;

use async_trait::async_trait;
use ticker_protocol::{ChangeEvent, STOCK_SERVICE_CONTRACT};

use crate::channel::{ChannelFactory, ChannelSettings, Contract};
use crate::endpoint::Endpoint;
use crate::error::ChannelError;

pub use channel::StockServiceChannel;

/// Receives price changes pushed by the service.
pub trait StockCallback: Send + Sync {
    /// Called from the channel's reader task for every push.
    fn stock_updated(&self, event: &ChangeEvent);
}

/// Contract marker for the stock service.
pub struct StockServiceContract;

impl Contract for StockServiceContract {
    const NAME: &'static str = STOCK_SERVICE_CONTRACT;
    type Callback = dyn StockCallback;
    type Factory = StockServiceFactory;

    fn create_factory(
        endpoint: Endpoint,
        callback: Option<Arc<dyn StockCallback>>,
        settings: &ChannelSettings,
    ) -> Result<StockServiceFactory, ChannelError> {
        Ok(StockServiceFactory {
            endpoint,
            callback,
            settings: settings.clone(),
        })
    }
}

/// Opens [`StockServiceChannel`]s to one endpoint.
pub struct StockServiceFactory {
    endpoint: Endpoint,
    callback: Option<Arc<dyn StockCallback>>,
    settings: ChannelSettings,
}

impl StockServiceFactory {
    /// Endpoint this factory connects to.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl ChannelFactory for StockServiceFactory {
    type Channel = StockServiceChannel;

    async fn open(&self) -> Result<Arc<StockServiceChannel>, ChannelError> {
        StockServiceChannel::connect(&self.endpoint, self.callback.clone(), &self.settings).await
    }
}
