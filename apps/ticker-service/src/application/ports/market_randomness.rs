//! Market Randomness Port
//!
//! Source of the random draws behind each simulator tick.

use rust_decimal::Decimal;

/// Random draws used by the market simulator.
#[cfg_attr(test, mockall::automock)]
pub trait MarketRandomness: Send {
    /// Uniform index in `0..len`. `len` is never zero.
    fn pick_index(&mut self, len: usize) -> usize;

    /// Price delta in `-1.00..=1.00` with a step of `0.01`.
    fn draw_delta(&mut self) -> Decimal;

    /// Trade quantity in `1..=999`.
    fn draw_quantity(&mut self) -> u32;

    /// Opening price for a seeded instrument.
    fn draw_seed_price(&mut self) -> Decimal;
}
