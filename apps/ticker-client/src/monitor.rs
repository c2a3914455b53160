//! Ticker Monitor
//!
//! Keeps one logged-in, monitoring session alive on top of the channel
//! manager. A recovered or refreshed channel is a new service session, so
//! whenever the acquired channel changes the session is set up again.

use std::sync::Arc;

use crate::channel::{ChannelManager, DuplexChannel};
use crate::error::ChannelError;
use crate::service::{StockCallback, StockServiceChannel, StockServiceContract};

/// Monitoring session driver.
pub struct TickerMonitor {
    manager: Arc<ChannelManager>,
    callback: Arc<dyn StockCallback>,
    current: Option<Arc<StockServiceChannel>>,
}

impl TickerMonitor {
    /// Create a monitor; nothing is opened until [`Self::ensure_session`].
    #[must_use]
    pub fn new(manager: Arc<ChannelManager>, callback: Arc<dyn StockCallback>) -> Self {
        Self {
            manager,
            callback,
            current: None,
        }
    }

    /// Channel of the active session, if any.
    #[must_use]
    pub const fn channel(&self) -> Option<&Arc<StockServiceChannel>> {
        self.current.as_ref()
    }

    /// Acquire the channel and, if it is new, log in and start monitoring.
    ///
    /// Returns `true` when a new session was set up.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be acquired or the session
    /// cannot be set up.
    pub async fn ensure_session(&mut self) -> Result<bool, ChannelError> {
        let channel = self
            .manager
            .acquire::<StockServiceContract>(Some(Arc::clone(&self.callback)))
            .await?;

        if self
            .current
            .as_ref()
            .is_some_and(|current| current.id() == channel.id())
        {
            return Ok(false);
        }

        channel.login().await?;
        channel.start_ticker_monitoring().await?;
        tracing::info!(
            channel_id = %channel.id(),
            session_id = %channel.session_id(),
            "Ticker monitoring started"
        );
        self.current = Some(channel);
        Ok(true)
    }

    /// Stop monitoring, log out and release the channel. Failures are
    /// logged.
    pub async fn shutdown(&mut self) {
        let Some(channel) = self.current.take() else {
            return;
        };

        if let Err(e) = channel.stop_ticker_monitoring().await {
            tracing::warn!(error = %e, "Failed to stop monitoring");
        }
        if let Err(e) = channel.logout(None).await {
            tracing::warn!(error = %e, "Failed to log out");
        }
        self.manager.release::<StockServiceContract>(&channel).await;
        tracing::info!(session_id = %channel.session_id(), "Ticker monitoring stopped");
    }
}
