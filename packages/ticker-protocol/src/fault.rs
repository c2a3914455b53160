//! Caller-visible faults.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a fault returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCode {
    /// Instrument or session already exists.
    DuplicateKey,
    /// Unknown symbol.
    NotFound,
    /// Session already logged in.
    AlreadyLoggedIn,
    /// Request arguments were rejected.
    InvalidArgument,
    /// Unexpected server-side failure.
    Internal,
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DuplicateKey => "duplicate_key",
            Self::NotFound => "not_found",
            Self::AlreadyLoggedIn => "already_logged_in",
            Self::InvalidArgument => "invalid_argument",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// A fault carrying a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {reason}")]
pub struct Fault {
    /// Fault category.
    pub code: FaultCode,
    /// Human-readable reason.
    pub reason: String,
}

impl Fault {
    /// Create a new fault.
    #[must_use]
    pub fn new(code: FaultCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Generic fault for unexpected failures; details stay in the server log.
    #[must_use]
    pub fn internal() -> Self {
        Self::new(
            FaultCode::Internal,
            "The server was unable to process the request due to an internal error.",
        )
    }
}
