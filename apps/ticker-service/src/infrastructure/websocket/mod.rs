//! WebSocket Session Server
//!
//! Duplex transport for the stock service contract. Each accepted connection
//! is one session: the server assigns a session id, announces it in a
//! `Welcome` frame, answers requests in order and pushes `StockUpdated`
//! frames through the same socket.
//!
//! ```text
//!            ┌──────────── read loop ─────────────┐
//! socket ───►│ ClientRequest ─► StockService ─────┼──► outbound queue ──► writer task ──► socket
//!            └────────────────────────────────────┘          ▲
//!                         WebSocketCallback (dispatcher) ────┘
//! ```

mod callback;
mod server;

pub use callback::WebSocketCallback;
pub use server::{Incoming, SessionServer, SessionServerError};
