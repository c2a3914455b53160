//! Instrument and change event types.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Instrument
// =============================================================================

/// A priced, uniquely keyed tradable entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Ticker symbol (upper-case, trimmed).
    pub symbol: String,
    /// Current price.
    pub price: Decimal,
}

impl Instrument {
    /// Create a new instrument.
    #[must_use]
    pub fn new(symbol: impl Into<String>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            price,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let price = format!("{:.2}", self.price);
        write!(f, "{:<6} {price:>10}", self.symbol)
    }
}

// =============================================================================
// Direction
// =============================================================================

/// Direction of a price move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Price went up.
    Up,
    /// Price went down.
    Down,
    /// Price did not move.
    Unchanged,
}

impl Direction {
    /// Classify a price delta.
    #[must_use]
    pub fn of(delta: Decimal) -> Self {
        if delta.is_zero() {
            Self::Unchanged
        } else if delta.is_sign_positive() {
            Self::Up
        } else {
            Self::Down
        }
    }

    /// Single-character marker used in ticker output.
    #[must_use]
    pub const fn marker(self) -> char {
        match self {
            Self::Up => '^',
            Self::Down => 'V',
            Self::Unchanged => '=',
        }
    }
}

// =============================================================================
// ChangeEvent
// =============================================================================

/// A single price change produced by one simulator tick.
///
/// `instrument` carries the price after the change was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Snapshot of the instrument after the change.
    pub instrument: Instrument,
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
    /// Signed price change.
    pub delta: Decimal,
    /// Simulated trade quantity.
    pub quantity: u32,
}

impl ChangeEvent {
    /// Create a new change event.
    #[must_use]
    pub const fn new(
        instrument: Instrument,
        timestamp: DateTime<Utc>,
        delta: Decimal,
        quantity: u32,
    ) -> Self {
        Self {
            instrument,
            timestamp,
            delta,
            quantity,
        }
    }

    /// Direction of the move.
    #[must_use]
    pub fn direction(&self) -> Direction {
        Direction::of(self.delta)
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let delta = format!("{:.2}", self.delta);
        write!(
            f,
            "{} {} {} {delta:>10} [{:>8}]",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.instrument,
            self.direction().marker(),
            self.quantity,
        )
    }
}
