//! Service error taxonomy.

use ticker_protocol::{Fault, FaultCode, SessionId};

/// Errors raised by catalog and session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Instrument already exists.
    #[error("Stock symbol '{0}' already exists.")]
    DuplicateKey(String),

    /// Unknown symbol.
    #[error("Stock symbol '{0}' does not exist.")]
    NotFound(String),

    /// Session is already registered.
    #[error("A client with the token '{0}' has already logged in!")]
    AlreadyLoggedIn(SessionId),

    /// Request arguments were rejected.
    #[error("{0}")]
    InvalidArgument(String),

    /// Unexpected failure; never shown to callers verbatim.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Fault category for this error.
    #[must_use]
    pub const fn code(&self) -> FaultCode {
        match self {
            Self::DuplicateKey(_) => FaultCode::DuplicateKey,
            Self::NotFound(_) => FaultCode::NotFound,
            Self::AlreadyLoggedIn(_) => FaultCode::AlreadyLoggedIn,
            Self::InvalidArgument(_) => FaultCode::InvalidArgument,
            Self::Internal(_) => FaultCode::Internal,
        }
    }

    /// Convert into a caller-visible fault.
    ///
    /// Internal errors are replaced by a generic fault.
    #[must_use]
    pub fn into_fault(self) -> Fault {
        match self {
            Self::Internal(_) => Fault::internal(),
            other => Fault::new(other.code(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_fault_carries_reason() {
        let fault = ServiceError::DuplicateKey("MSFT".to_string()).into_fault();
        assert_eq!(fault.code, FaultCode::DuplicateKey);
        assert_eq!(fault.reason, "Stock symbol 'MSFT' already exists.");
    }

    #[test]
    fn already_logged_in_fault_names_session() {
        let fault = ServiceError::AlreadyLoggedIn(SessionId::new("s-1")).into_fault();
        assert_eq!(fault.code, FaultCode::AlreadyLoggedIn);
        assert_eq!(fault.reason, "A client with the token 's-1' has already logged in!");
    }

    #[test]
    fn internal_error_is_not_leaked() {
        let fault = ServiceError::Internal("lock poisoned at 0xdead".to_string()).into_fault();
        assert_eq!(fault.code, FaultCode::Internal);
        assert!(!fault.reason.contains("0xdead"));
    }
}
