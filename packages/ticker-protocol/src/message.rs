//! Request, reply and push envelopes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::fault::Fault;
use crate::instrument::{ChangeEvent, Instrument};
use crate::session::SessionId;

/// Correlates a reply with its request.
pub type RequestId = u64;

// =============================================================================
// Client -> Server
// =============================================================================

/// A request sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequest {
    /// Request id, echoed in the reply.
    pub id: RequestId,
    /// Requested operation.
    #[serde(flatten)]
    pub op: Operation,
}

impl ClientRequest {
    /// Create a new request.
    #[must_use]
    pub const fn new(id: RequestId, op: Operation) -> Self {
        Self { id, op }
    }
}

/// Operations of the stock service contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Register the caller's session.
    Login,
    /// Unregister a session; defaults to the caller's own.
    Logout {
        /// Session to log out.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
    /// Start receiving `StockUpdated` pushes.
    StartTickerMonitoring,
    /// Stop receiving `StockUpdated` pushes.
    StopTickerMonitoring,
    /// Look up the current price of a symbol.
    GetQuote {
        /// Symbol to look up.
        symbol: String,
    },
    /// Insert a new instrument.
    AddInstrument {
        /// Symbol to add.
        symbol: String,
        /// Initial price.
        price: Decimal,
    },
}

impl Operation {
    /// Operation name as it appears on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout { .. } => "logout",
            Self::StartTickerMonitoring => "start_ticker_monitoring",
            Self::StopTickerMonitoring => "stop_ticker_monitoring",
            Self::GetQuote { .. } => "get_quote",
            Self::AddInstrument { .. } => "add_instrument",
        }
    }
}

// =============================================================================
// Server -> Client
// =============================================================================

/// A frame sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First frame on every connection.
    Welcome {
        /// Session assigned to this connection.
        session_id: SessionId,
    },
    /// Reply to a client request.
    Reply {
        /// Id of the request being answered.
        id: RequestId,
        /// Reply payload.
        body: ReplyBody,
    },
    /// Price change push.
    StockUpdated {
        /// The change.
        event: ChangeEvent,
    },
}

/// Payload of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyBody {
    /// Operation succeeded with no payload.
    Ack,
    /// Quote lookup result.
    Quote {
        /// Instrument snapshot.
        instrument: Instrument,
    },
    /// Operation failed.
    Fault(Fault),
}

impl From<Result<Option<Instrument>, Fault>> for ReplyBody {
    fn from(result: Result<Option<Instrument>, Fault>) -> Self {
        match result {
            Ok(None) => Self::Ack,
            Ok(Some(instrument)) => Self::Quote { instrument },
            Err(fault) => Self::Fault(fault),
        }
    }
}
