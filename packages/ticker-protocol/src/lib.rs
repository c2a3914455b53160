#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Ticker Protocol - Shared Duplex Contract
//!
//! Types exchanged between the ticker service and its clients over a
//! session-addressed duplex channel.
//!
//! # Frames
//!
//! ```text
//! client ──► server   ClientRequest { id, op }
//! server ──► client   Welcome { session_id }          (first frame)
//!                     Reply { id, body }              (one per request)
//!                     StockUpdated { event }          (one-way push)
//! ```
//!
//! Frames are JSON text; decimals travel as strings.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

pub mod codec;
pub mod fault;
pub mod instrument;
pub mod message;
pub mod session;

// =============================================================================
// Re-exports
// =============================================================================

pub use codec::{CodecError, decode, encode};
pub use fault::{Fault, FaultCode};
pub use instrument::{ChangeEvent, Direction, Instrument};
pub use message::{ClientRequest, Operation, ReplyBody, RequestId, ServerMessage};
pub use session::SessionId;

/// Contract name used to resolve the stock service endpoint.
pub const STOCK_SERVICE_CONTRACT: &str = "IStockService";
