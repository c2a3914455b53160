//! Symbol value object for catalog keys.

use std::fmt;

use crate::domain::error::ServiceError;

/// A normalized ticker symbol (trimmed, upper-case, non-empty).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(String);

impl Symbol {
    /// Normalize and validate a raw symbol.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the symbol is blank.
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        let normalized = raw.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "Stock symbol cannot be empty.".to_string(),
            ));
        }
        Ok(Self(normalized))
    }

    /// Get the symbol string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
