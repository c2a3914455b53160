//! WebSocket duplex channel to the stock service.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use ticker_protocol::{
    ClientRequest, Instrument, Operation, ReplyBody, RequestId, ServerMessage, SessionId,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use super::StockCallback;
use crate::channel::{ChannelId, ChannelSettings, ChannelState, DuplexChannel};
use crate::endpoint::Endpoint;
use crate::error::ChannelError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingReplies = Arc<Mutex<HashMap<RequestId, oneshot::Sender<ReplyBody>>>>;

/// Outbound frame queue capacity.
const OUTBOUND_CAPACITY: usize = 64;

/// Duplex channel bound to one service session.
///
/// Requests are correlated with replies by id. Pushes are handed to the
/// callback on the reader task. The channel faults when the transport
/// fails or ends without a close handshake.
pub struct StockServiceChannel {
    id: ChannelId,
    session_id: SessionId,
    url: String,
    outbound: mpsc::Sender<Message>,
    pending: PendingReplies,
    next_request: AtomicU64,
    state: Arc<watch::Sender<ChannelState>>,
    cancel: CancellationToken,
    request_timeout: Duration,
}

impl StockServiceChannel {
    /// Connect and complete the session handshake.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionFailed`, `Timeout` or `Handshake` if the
    /// connection cannot be established.
    pub async fn connect(
        endpoint: &Endpoint,
        callback: Option<Arc<dyn StockCallback>>,
        settings: &ChannelSettings,
    ) -> Result<Arc<Self>, ChannelError> {
        let url = endpoint.url();
        let id = ChannelId::next();
        let state = Arc::new(watch::Sender::new(ChannelState::Opening));
        tracing::debug!(channel_id = %id, url = %url, "Connecting");

        let (mut ws, _) = timeout(settings.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| ChannelError::Timeout(settings.connect_timeout))?
            .map_err(|e| ChannelError::ConnectionFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let session_id = timeout(settings.connect_timeout, read_welcome(&mut ws))
            .await
            .map_err(|_| ChannelError::Timeout(settings.connect_timeout))??;

        let (write, read) = ws.split();
        let (outbound, queue) = mpsc::channel(OUTBOUND_CAPACITY);
        let pending = PendingReplies::default();
        let cancel = CancellationToken::new();

        state.send_replace(ChannelState::Opened);
        tokio::spawn(write_loop(write, queue, cancel.clone()));
        tokio::spawn(read_loop(
            read,
            Reader {
                channel_id: id,
                pending: Arc::clone(&pending),
                callback,
                state: Arc::clone(&state),
                cancel: cancel.clone(),
            },
        ));

        tracing::info!(
            channel_id = %id,
            session_id = %session_id,
            url = %url,
            "Connected to stock service"
        );

        Ok(Arc::new(Self {
            id,
            session_id,
            url,
            outbound,
            pending,
            next_request: AtomicU64::new(0),
            state,
            cancel,
            request_timeout: settings.request_timeout,
        }))
    }

    /// Session assigned by the service.
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Connected URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Register this session with the service.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Fault` if the session is already logged in.
    pub async fn login(&self) -> Result<(), ChannelError> {
        self.expect_ack(Operation::Login).await
    }

    /// Unregister a session, this one when `session_id` is `None`.
    ///
    /// Logging out this session ends it; the service then closes the
    /// channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be delivered.
    pub async fn logout(&self, session_id: Option<SessionId>) -> Result<(), ChannelError> {
        self.expect_ack(Operation::Logout { session_id }).await
    }

    /// Start receiving price pushes.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be delivered.
    pub async fn start_ticker_monitoring(&self) -> Result<(), ChannelError> {
        self.expect_ack(Operation::StartTickerMonitoring).await
    }

    /// Stop receiving price pushes.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be delivered.
    pub async fn stop_ticker_monitoring(&self) -> Result<(), ChannelError> {
        self.expect_ack(Operation::StopTickerMonitoring).await
    }

    /// Current price of `symbol`.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Fault` if the symbol is unknown.
    pub async fn get_quote(&self, symbol: &str) -> Result<Instrument, ChannelError> {
        let op = Operation::GetQuote {
            symbol: symbol.to_string(),
        };
        let name = op.name();
        match self.call(op).await? {
            ReplyBody::Quote { instrument } => Ok(instrument),
            ReplyBody::Fault(fault) => Err(fault.into()),
            ReplyBody::Ack => Err(ChannelError::UnexpectedReply(name)),
        }
    }

    /// Add a new instrument.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Fault` if the symbol already exists or the
    /// price is rejected.
    pub async fn add_instrument(&self, symbol: &str, price: Decimal) -> Result<(), ChannelError> {
        self.expect_ack(Operation::AddInstrument {
            symbol: symbol.to_string(),
            price,
        })
        .await
    }

    async fn expect_ack(&self, op: Operation) -> Result<(), ChannelError> {
        let name = op.name();
        match self.call(op).await? {
            ReplyBody::Ack => Ok(()),
            ReplyBody::Fault(fault) => Err(fault.into()),
            ReplyBody::Quote { .. } => Err(ChannelError::UnexpectedReply(name)),
        }
    }

    async fn call(&self, op: Operation) -> Result<ReplyBody, ChannelError> {
        self.ensure_open()?;

        let id = self.next_request.fetch_add(1, Ordering::Relaxed) + 1;
        let name = op.name();
        let text = ticker_protocol::encode(&ClientRequest::new(id, op))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().insert(id, reply_tx);

        // The reader clears pending replies when it stops.
        if let Err(e) = self.ensure_open() {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        if self.outbound.send(Message::Text(text.into())).await.is_err() {
            self.pending.lock().remove(&id);
            return Err(self.unusable());
        }

        match timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(_)) => Err(self.unusable()),
            Err(_) => {
                self.pending.lock().remove(&id);
                tracing::warn!(channel_id = %self.id, op = name, request_id = id, "Request timed out");
                Err(ChannelError::Timeout(self.request_timeout))
            }
        }
    }

    fn ensure_open(&self) -> Result<(), ChannelError> {
        if self.state() == ChannelState::Opened {
            Ok(())
        } else {
            Err(self.unusable())
        }
    }

    fn unusable(&self) -> ChannelError {
        if self.state() == ChannelState::Faulted {
            ChannelError::Faulted
        } else {
            ChannelError::Closed
        }
    }
}

#[async_trait]
impl DuplexChannel for StockServiceChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    async fn close(&self) -> Result<(), ChannelError> {
        let mut states = self.state.subscribe();
        let begin = self.state.send_if_modified(|state| match state {
            ChannelState::Created | ChannelState::Opening | ChannelState::Opened => {
                *state = ChannelState::Closing;
                true
            }
            _ => false,
        });

        if begin {
            tracing::debug!(channel_id = %self.id, "Closing channel");
            if self.outbound.send(Message::Close(None)).await.is_err() {
                self.abort();
                return Err(ChannelError::Closed);
            }
        } else if self.state().is_terminal() {
            return Ok(());
        }

        let closed = states.wait_for(|state| state.is_terminal()).await.is_ok();
        if closed {
            Ok(())
        } else {
            Err(ChannelError::Closed)
        }
    }

    fn abort(&self) {
        self.cancel.cancel();
        self.pending.lock().clear();
        mark_terminal(&self.state, ChannelState::Closed);
    }
}

impl Drop for StockServiceChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Transport Tasks
// =============================================================================

async fn read_welcome(ws: &mut WsStream) -> Result<SessionId, ChannelError> {
    while let Some(frame) = ws.next().await {
        match frame.map_err(|e| ChannelError::Handshake(e.to_string()))? {
            Message::Text(text) => {
                return match ticker_protocol::decode::<ServerMessage>(text.as_str())? {
                    ServerMessage::Welcome { session_id } => Ok(session_id),
                    _ => Err(ChannelError::Handshake(
                        "first frame was not a welcome".to_string(),
                    )),
                };
            }
            Message::Close(_) => {
                return Err(ChannelError::Handshake(
                    "closed before welcome".to_string(),
                ));
            }
            _ => {}
        }
    }
    Err(ChannelError::Handshake(
        "connection ended before welcome".to_string(),
    ))
}

async fn write_loop(
    mut write: SplitSink<WsStream, Message>,
    mut queue: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            message = queue.recv() => {
                let Some(message) = message else { break };
                if let Err(e) = write.send(message).await {
                    tracing::debug!(error = %e, "Channel write failed");
                    break;
                }
            }
        }
    }
}

struct Reader {
    channel_id: ChannelId,
    pending: PendingReplies,
    callback: Option<Arc<dyn StockCallback>>,
    state: Arc<watch::Sender<ChannelState>>,
    cancel: CancellationToken,
}

impl Reader {
    fn dispatch(&self, text: &str) {
        match ticker_protocol::decode::<ServerMessage>(text) {
            Ok(ServerMessage::Reply { id, body }) => {
                if let Some(reply) = self.pending.lock().remove(&id) {
                    let _ = reply.send(body);
                } else {
                    tracing::debug!(channel_id = %self.channel_id, request_id = id, "Reply for unknown request");
                }
            }
            Ok(ServerMessage::StockUpdated { event }) => match &self.callback {
                Some(callback) => callback.stock_updated(&event),
                None => tracing::debug!(channel_id = %self.channel_id, "Push dropped, no callback"),
            },
            Ok(ServerMessage::Welcome { .. }) => {
                tracing::debug!(channel_id = %self.channel_id, "Ignoring repeated welcome");
            }
            Err(e) => {
                tracing::warn!(channel_id = %self.channel_id, error = %e, "Undecodable frame");
            }
        }
    }

    /// Terminal state for a transport that ended without a close frame.
    fn lost(&self) -> ChannelState {
        if *self.state.borrow() == ChannelState::Closing {
            ChannelState::Closed
        } else {
            ChannelState::Faulted
        }
    }

    fn finish(&self, end: ChannelState) {
        self.pending.lock().clear();
        mark_terminal(&self.state, end);
        self.cancel.cancel();
        match end {
            ChannelState::Faulted => tracing::warn!(channel_id = %self.channel_id, "Channel faulted"),
            _ => tracing::debug!(channel_id = %self.channel_id, "Channel closed"),
        }
    }
}

async fn read_loop(mut read: SplitStream<WsStream>, reader: Reader) {
    let end = loop {
        tokio::select! {
            () = reader.cancel.cancelled() => break ChannelState::Closed,
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => reader.dispatch(text.as_str()),
                Some(Ok(Message::Close(_))) => break ChannelState::Closed,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(channel_id = %reader.channel_id, error = %e, "Channel read failed");
                    break reader.lost();
                }
                None => break reader.lost(),
            }
        }
    };
    reader.finish(end);
}

/// Move to `end` unless already terminal.
fn mark_terminal(state: &watch::Sender<ChannelState>, end: ChannelState) {
    state.send_if_modified(|current| {
        if current.is_terminal() {
            false
        } else {
            *current = end;
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use ticker_protocol::{ChangeEvent, Fault, FaultCode};

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<ChangeEvent>>,
    }

    impl StockCallback for Recording {
        fn stock_updated(&self, event: &ChangeEvent) {
            self.events.lock().push(event.clone());
        }
    }

    fn reader(callback: Option<Arc<dyn StockCallback>>) -> Reader {
        Reader {
            channel_id: ChannelId::next(),
            pending: PendingReplies::default(),
            callback,
            state: Arc::new(watch::Sender::new(ChannelState::Opened)),
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn reply_completes_pending_request() {
        let reader = reader(None);
        let (tx, mut rx) = oneshot::channel();
        reader.pending.lock().insert(3, tx);

        let frame = ticker_protocol::encode(&ServerMessage::Reply {
            id: 3,
            body: ReplyBody::Fault(Fault::new(FaultCode::NotFound, "missing")),
        })
        .unwrap();
        reader.dispatch(&frame);

        assert!(reader.pending.lock().is_empty());
        assert!(matches!(rx.try_recv(), Ok(ReplyBody::Fault(f)) if f.code == FaultCode::NotFound));
    }

    #[test]
    fn push_reaches_callback() {
        let recording = Arc::new(Recording::default());
        let reader = reader(Some(Arc::clone(&recording) as Arc<dyn StockCallback>));

        let event = ChangeEvent::new(
            Instrument::new("MSFT", dec!(20.50)),
            chrono::Utc::now(),
            dec!(0.50),
            10,
        );
        let frame = ticker_protocol::encode(&ServerMessage::StockUpdated {
            event: event.clone(),
        })
        .unwrap();
        reader.dispatch(&frame);

        assert_eq!(recording.events.lock().as_slice(), &[event]);
    }

    #[test]
    fn garbage_frame_is_ignored() {
        let reader = reader(None);
        reader.dispatch("{not json");
        assert_eq!(*reader.state.borrow(), ChannelState::Opened);
    }

    #[test]
    fn lost_transport_faults_unless_closing() {
        let reader = reader(None);
        assert_eq!(reader.lost(), ChannelState::Faulted);
        reader.state.send_replace(ChannelState::Closing);
        assert_eq!(reader.lost(), ChannelState::Closed);
    }

    #[test]
    fn finish_fails_pending_and_keeps_first_terminal_state() {
        let reader = reader(None);
        let (tx, mut rx) = oneshot::channel::<ReplyBody>();
        reader.pending.lock().insert(1, tx);

        reader.finish(ChannelState::Faulted);
        reader.finish(ChannelState::Closed);

        assert!(rx.try_recv().is_err());
        assert_eq!(*reader.state.borrow(), ChannelState::Faulted);
        assert!(reader.cancel.is_cancelled());
    }
}
