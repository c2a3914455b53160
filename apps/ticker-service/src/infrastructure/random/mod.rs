//! Randomness Adapter
//!
//! `StdRng`-backed implementation of the simulator's randomness port.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use crate::application::ports::MarketRandomness;

/// Largest delta magnitude in cents.
const MAX_DELTA_CENTS: i64 = 100;

/// Trade quantity bounds.
const MIN_QUANTITY: u32 = 1;
const MAX_QUANTITY: u32 = 999;

/// Opening price bounds for seeded instruments (upper exclusive).
const SEED_PRICE_MIN: i64 = 10;
const SEED_PRICE_MAX: i64 = 30;

/// Randomness drawn from a `StdRng`.
#[derive(Debug)]
pub struct StdMarketRandomness {
    rng: StdRng,
}

impl StdMarketRandomness {
    /// Seed from the operating system.
    #[must_use]
    pub fn from_os() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic source for reproducible runs.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl MarketRandomness for StdMarketRandomness {
    fn pick_index(&mut self, len: usize) -> usize {
        self.rng.random_range(0..len.max(1))
    }

    fn draw_delta(&mut self) -> Decimal {
        Decimal::new(
            self.rng.random_range(-MAX_DELTA_CENTS..=MAX_DELTA_CENTS),
            2,
        )
    }

    fn draw_quantity(&mut self) -> u32 {
        self.rng.random_range(MIN_QUANTITY..=MAX_QUANTITY)
    }

    fn draw_seed_price(&mut self) -> Decimal {
        Decimal::from(self.rng.random_range(SEED_PRICE_MIN..SEED_PRICE_MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn draws_stay_in_range() {
        let mut rng = StdMarketRandomness::seeded(7);

        for _ in 0..10_000 {
            let delta = rng.draw_delta();
            assert!(delta >= dec!(-1.00) && delta <= dec!(1.00));
            assert_eq!(delta.scale(), 2);

            let quantity = rng.draw_quantity();
            assert!((1..=999).contains(&quantity));

            let price = rng.draw_seed_price();
            assert!(price >= dec!(10) && price < dec!(30));

            assert!(rng.pick_index(6) < 6);
        }
    }

    #[test]
    fn seeded_sources_repeat() {
        let mut a = StdMarketRandomness::seeded(42);
        let mut b = StdMarketRandomness::seeded(42);
        for _ in 0..32 {
            assert_eq!(a.draw_delta(), b.draw_delta());
        }
    }
}
