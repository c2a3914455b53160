//! Session server accept loop and per-connection handling.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use ticker_protocol::{
    ClientRequest, Fault, FaultCode, ReplyBody, RequestId, ServerMessage, SessionId,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::application::services::{SessionContext, StockService};
use crate::infrastructure::config::SessionSettings;
use crate::infrastructure::metrics;
use crate::infrastructure::websocket::callback::WebSocketCallback;

/// How long a finished session waits for its writer to flush.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a failed accept (EMFILE, ECONNABORTED, ...) before retrying.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Session server errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionServerError {
    /// Failed to bind the listener.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(String, String),
}

/// Source of inbound TCP connections for [`SessionServer::serve`].
#[async_trait]
pub trait Incoming: Send + Sync + 'static {
    /// Wait for the next connection.
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;

    /// Address the source listens on.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Incoming for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        Self::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Self::local_addr(self)
    }
}

/// Accepts duplex connections and runs one session per connection.
pub struct SessionServer {
    service: Arc<StockService>,
    settings: SessionSettings,
    connections: AtomicUsize,
}

impl SessionServer {
    /// Create a session server.
    #[must_use]
    pub const fn new(service: Arc<StockService>, settings: SessionSettings) -> Self {
        Self {
            service,
            settings,
            connections: AtomicUsize::new(0),
        }
    }

    /// Number of open connections.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Bind a listener.
    ///
    /// # Errors
    ///
    /// Returns `BindFailed` if the address cannot be bound.
    pub async fn bind(addr: &str) -> Result<TcpListener, SessionServerError> {
        TcpListener::bind(addr)
            .await
            .map_err(|e| SessionServerError::BindFailed(addr.to_string(), e.to_string()))
    }

    /// Accept connections until cancelled.
    ///
    /// Accept errors are logged and retried after a short pause; only
    /// `cancel` stops the loop. Open sessions are told to close when it
    /// fires.
    pub async fn serve<L: Incoming>(self: Arc<Self>, listener: L, cancel: CancellationToken) {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(addr = %addr, "Session server listening");
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = Arc::clone(&self);
                        let session_cancel = cancel.child_token();
                        tokio::spawn(async move {
                            server.handle_connection(stream, peer, session_cancel).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed, retrying");
                        tokio::select! {
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                        }
                    }
                },
            }
        }

        tracing::info!("Session server stopped");
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
        cancel: CancellationToken,
    ) {
        let ws_stream =
            match tokio::time::timeout(self.settings.handshake_timeout, accept_async(stream)).await
            {
                Ok(Ok(ws)) => ws,
                Ok(Err(e)) => {
                    tracing::warn!(peer = %peer, error = %e, "WebSocket handshake failed");
                    return;
                }
                Err(_) => {
                    tracing::warn!(peer = %peer, "WebSocket handshake timed out");
                    return;
                }
            };

        let session_id = SessionId::generate();
        self.connections.fetch_add(1, Ordering::Relaxed);
        metrics::record_connection();
        tracing::info!(peer = %peer, session_id = %session_id, "Session opened");

        let (mut write, mut read) = ws_stream.split();
        let (outbound, mut queue) = mpsc::channel::<Message>(self.settings.outbound_capacity);

        let writer = tokio::spawn(async move {
            while let Some(message) = queue.recv().await {
                let closing = matches!(message, Message::Close(_));
                if write.send(message).await.is_err() || closing {
                    break;
                }
            }
            let _ = write.close().await;
        });

        let callback = Arc::new(WebSocketCallback::new(
            session_id.clone(),
            outbound.clone(),
            self.settings.delivery_timeout,
        ));
        let ctx = SessionContext::new(session_id.clone(), callback);

        let welcome = ServerMessage::Welcome {
            session_id: session_id.clone(),
        };
        let mut open = send_frame(&outbound, &welcome).await;

        while open {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!(session_id = %session_id, "Closing session for shutdown");
                    break;
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let Some((reply, ended)) = self.handle_frame(&ctx, text.as_str()) else {
                            continue;
                        };
                        open = send_frame(&outbound, &reply).await && !ended;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(session_id = %session_id, error = %e, "Session read error");
                        break;
                    }
                }
            }
        }

        // Dropped connection: make sure a stale record cannot linger.
        self.service.registry().unregister(&session_id);
        metrics::set_sessions(self.service.registry().stats());

        let _ = outbound.send(Message::Close(None)).await;
        drop(outbound);
        drop(ctx);
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
            tracing::debug!(session_id = %session_id, "Writer did not drain in time");
        }

        self.connections.fetch_sub(1, Ordering::Relaxed);
        tracing::info!(peer = %peer, session_id = %session_id, "Session closed");
    }

    /// Decode and execute one request. Returns the reply frame and whether
    /// the caller's session ended.
    fn handle_frame(&self, ctx: &SessionContext, text: &str) -> Option<(ServerMessage, bool)> {
        match ticker_protocol::decode::<ClientRequest>(text) {
            Ok(request) => {
                let handled = self.service.handle(ctx, request.op);
                Some((
                    ServerMessage::Reply {
                        id: request.id,
                        body: handled.reply,
                    },
                    handled.session_ended,
                ))
            }
            Err(e) => {
                tracing::warn!(session_id = %ctx.session_id, error = %e, "Malformed request");
                let id = request_id_of(text)?;
                Some((
                    ServerMessage::Reply {
                        id,
                        body: ReplyBody::Fault(Fault::new(
                            FaultCode::InvalidArgument,
                            "Malformed request.",
                        )),
                    },
                    false,
                ))
            }
        }
    }
}

/// Best-effort extraction of the request id from an undecodable frame.
fn request_id_of(text: &str) -> Option<RequestId> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()?
        .get("id")?
        .as_u64()
}

/// Queue a frame for the writer. Returns `false` once the writer is gone.
async fn send_frame(outbound: &mpsc::Sender<Message>, frame: &ServerMessage) -> bool {
    match ticker_protocol::encode(frame) {
        Ok(text) => outbound.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode frame");
            true
        }
    }
}
