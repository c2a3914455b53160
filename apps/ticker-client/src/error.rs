//! Client error types.

use std::time::Duration;

use ticker_protocol::{CodecError, Fault};

/// Errors raised while acquiring or using a channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// No endpoint is configured for the contract.
    #[error("no endpoint configured for contract '{0}'")]
    ChannelUnavailable(String),

    /// Transport connection could not be established.
    #[error("connection to {url} failed: {reason}")]
    ConnectionFailed {
        /// Target URL.
        url: String,
        /// Failure reason.
        reason: String,
    },

    /// Peer did not complete the session handshake.
    #[error("session handshake failed: {0}")]
    Handshake(String),

    /// Operation did not complete in time.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Channel is closed.
    #[error("channel is closed")]
    Closed,

    /// Channel is faulted.
    #[error("channel is faulted")]
    Faulted,

    /// Service rejected the request.
    #[error("service fault: {0}")]
    Fault(#[from] Fault),

    /// Reply kind does not match the request.
    #[error("unexpected reply to {0}")]
    UnexpectedReply(&'static str),

    /// Frame could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Endpoint configuration is unusable.
    #[error("endpoint configuration error: {0}")]
    Config(String),
}

impl ChannelError {
    /// Fault returned by the service, if any.
    #[must_use]
    pub const fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}
