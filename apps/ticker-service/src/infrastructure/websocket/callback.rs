//! Push adapter from the dispatcher to one session's outbound queue.

use std::time::Duration;

use async_trait::async_trait;
use ticker_protocol::{ChangeEvent, ServerMessage, SessionId};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::application::ports::{DeliveryError, SubscriberCallback};

/// Delivers `StockUpdated` frames to a session's writer task.
#[derive(Debug, Clone)]
pub struct WebSocketCallback {
    session_id: SessionId,
    outbound: mpsc::Sender<Message>,
    timeout: Duration,
}

impl WebSocketCallback {
    /// Create a callback for one session.
    #[must_use]
    pub const fn new(
        session_id: SessionId,
        outbound: mpsc::Sender<Message>,
        timeout: Duration,
    ) -> Self {
        Self {
            session_id,
            outbound,
            timeout,
        }
    }

    /// Session this callback pushes to.
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

#[async_trait]
impl SubscriberCallback for WebSocketCallback {
    async fn stock_updated(&self, event: &ChangeEvent) -> Result<(), DeliveryError> {
        let frame = ServerMessage::StockUpdated {
            event: event.clone(),
        };
        let text = ticker_protocol::encode(&frame)
            .map_err(|e| DeliveryError::Serialization(e.to_string()))?;

        match tokio::time::timeout(self.timeout, self.outbound.send(Message::Text(text.into())))
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DeliveryError::Closed),
            Err(_) => Err(DeliveryError::Timeout(self.timeout)),
        }
    }
}
