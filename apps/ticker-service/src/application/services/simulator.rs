//! Market Simulator
//!
//! Periodically perturbs the price of one random instrument and publishes the
//! resulting change event.
//!
//! # Tick
//!
//! 1. Pick a symbol uniformly from the catalog's current keys.
//! 2. Draw a delta in `-1.00..=1.00` (step `0.01`).
//! 3. If `price + delta < 0`, negate the delta.
//! 4. Apply the delta and build a `ChangeEvent` with a random quantity.
//! 5. Hand the event to the dispatcher.
//!
//! Ticks never overlap: the randomness source sits behind an async mutex that
//! is held for the whole tick, including dispatch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use ticker_protocol::ChangeEvent;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::MarketRandomness;
use crate::application::services::dispatcher::{DispatchReport, NotificationDispatcher};
use crate::domain::PriceCatalog;
use crate::infrastructure::metrics;

/// Default interval between ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(2);

/// Result of one tick.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    /// The published event.
    pub event: ChangeEvent,
    /// Fan-out result.
    pub report: DispatchReport,
}

/// Drives periodic price changes.
pub struct MarketSimulator {
    catalog: Arc<PriceCatalog>,
    dispatcher: Arc<NotificationDispatcher>,
    randomness: Mutex<Box<dyn MarketRandomness>>,
    interval: Duration,
    ticks: AtomicU64,
    running: AtomicBool,
}

impl MarketSimulator {
    /// Create a simulator.
    #[must_use]
    pub fn new(
        catalog: Arc<PriceCatalog>,
        dispatcher: Arc<NotificationDispatcher>,
        randomness: Box<dyn MarketRandomness>,
        interval: Duration,
    ) -> Self {
        Self {
            catalog,
            dispatcher,
            randomness: Mutex::new(randomness),
            interval,
            ticks: AtomicU64::new(0),
            running: AtomicBool::new(false),
        }
    }

    /// Number of completed ticks.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Whether the tick loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Add each symbol with a random opening price.
    ///
    /// Symbols already present or rejected by the catalog are logged and skipped.
    pub async fn seed<S: AsRef<str>>(&self, symbols: &[S]) {
        let mut rng = self.randomness.lock().await;
        for symbol in symbols {
            let price = rng.draw_seed_price();
            match self.catalog.add(symbol.as_ref(), price) {
                Ok(instrument) => {
                    tracing::debug!(symbol = %instrument.symbol, price = %instrument.price, "Seeded instrument");
                }
                Err(e) => {
                    tracing::warn!(symbol = symbol.as_ref(), error = %e, "Skipping seed symbol");
                }
            }
        }
    }

    /// Run one tick.
    ///
    /// Returns `None` when the catalog is empty.
    pub async fn tick(&self) -> Option<TickOutcome> {
        let mut rng = self.randomness.lock().await;

        let symbols = self.catalog.symbols();
        if symbols.is_empty() {
            tracing::debug!("Catalog empty, skipping tick");
            return None;
        }

        let symbol = symbols.get(rng.pick_index(symbols.len()))?;
        let drawn = rng.draw_delta();
        let quantity = rng.draw_quantity();

        let (instrument, delta) = self.catalog.update(symbol, |price| {
            let delta = reflect_delta(*price, drawn);
            *price += delta;
            delta
        })?;

        let event = ChangeEvent::new(instrument, Utc::now(), delta, quantity);
        let report = self.dispatcher.publish(&event).await;
        drop(rng);

        self.ticks.fetch_add(1, Ordering::Relaxed);
        metrics::record_tick();
        tracing::debug!(
            symbol = %event.instrument.symbol,
            price = %event.instrument.price,
            delta = %event.delta,
            quantity = event.quantity,
            "Tick"
        );

        Some(TickOutcome { event, report })
    }

    /// Tick every interval until cancelled. The first tick fires one
    /// interval after start.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.running.store(true, Ordering::Release);
        tracing::info!(
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            instruments = self.catalog.len(),
            "Market simulator started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        self.running.store(false, Ordering::Release);
        tracing::info!(ticks = self.ticks(), "Market simulator stopped");
    }
}

/// Negate `delta` if applying it would take `price` below zero.
///
/// Reflecting rather than clamping keeps the magnitude of the move.
#[must_use]
pub fn reflect_delta(price: Decimal, delta: Decimal) -> Decimal {
    if price + delta < Decimal::ZERO {
        -delta
    } else {
        delta
    }
}
