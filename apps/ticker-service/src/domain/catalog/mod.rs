//! Price Catalog
//!
//! Concurrent store of symbol to current price. Insertion is
//! insert-if-absent; prices change only through [`PriceCatalog::update`],
//! which the market simulator drives.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use ticker_protocol::Instrument;

use crate::domain::error::ServiceError;
use crate::domain::instrument::Symbol;

/// Shared catalog of priced instruments.
#[derive(Debug, Default)]
pub struct PriceCatalog {
    prices: RwLock<BTreeMap<Symbol, Decimal>>,
}

impl PriceCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new instrument.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the symbol is blank or the price is negative.
    /// - `DuplicateKey` if the normalized symbol already exists; the stored
    ///   price is left untouched.
    pub fn add(&self, symbol: &str, price: Decimal) -> Result<Instrument, ServiceError> {
        let symbol = Symbol::parse(symbol)?;
        if price < Decimal::ZERO {
            return Err(ServiceError::InvalidArgument(format!(
                "Price for '{symbol}' cannot be negative."
            )));
        }

        match self.prices.write().entry(symbol) {
            Entry::Occupied(entry) => Err(ServiceError::DuplicateKey(entry.key().to_string())),
            Entry::Vacant(entry) => {
                let instrument = Instrument::new(entry.key().as_str(), price);
                entry.insert(price);
                Ok(instrument)
            }
        }
    }

    /// Look up the current price of a symbol.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the symbol is blank.
    /// - `NotFound` if the symbol is not in the catalog.
    pub fn get(&self, symbol: &str) -> Result<Instrument, ServiceError> {
        let symbol = Symbol::parse(symbol)?;
        self.prices
            .read()
            .get(&symbol)
            .map(|price| Instrument::new(symbol.as_str(), *price))
            .ok_or_else(|| ServiceError::NotFound(symbol.to_string()))
    }

    /// Snapshot of the current keys in symbol order.
    #[must_use]
    pub fn symbols(&self) -> Vec<Symbol> {
        self.prices.read().keys().cloned().collect()
    }

    /// Mutate the price of `symbol` in place under the write lock.
    ///
    /// Returns the instrument after the mutation together with whatever
    /// `f` returned, or `None` if the symbol is absent.
    pub fn update<R>(
        &self,
        symbol: &Symbol,
        f: impl FnOnce(&mut Decimal) -> R,
    ) -> Option<(Instrument, R)> {
        let mut prices = self.prices.write();
        let price = prices.get_mut(symbol)?;
        let result = f(price);
        Some((Instrument::new(symbol.as_str(), *price), result))
    }

    /// Number of instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.read().len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn add_then_get_with_normalized_symbol() {
        let catalog = PriceCatalog::new();
        catalog.add("  msft ", dec!(20.00)).unwrap();

        let quote = catalog.get("MSFT").unwrap();
        assert_eq!(quote.symbol, "MSFT");
        assert_eq!(quote.price, dec!(20.00));

        assert_eq!(catalog.get("msft").unwrap().price, dec!(20.00));
    }

    #[test]
    fn duplicate_add_keeps_original_price() {
        let catalog = PriceCatalog::new();
        catalog.add("IBM", dec!(15.00)).unwrap();

        let err = catalog.add("ibm", dec!(99.00)).unwrap_err();
        assert_eq!(err, ServiceError::DuplicateKey("IBM".to_string()));
        assert_eq!(catalog.get("IBM").unwrap().price, dec!(15.00));
    }

    #[test]
    fn get_unknown_symbol_is_not_found() {
        let catalog = PriceCatalog::new();
        assert_eq!(
            catalog.get("nope").unwrap_err(),
            ServiceError::NotFound("NOPE".to_string())
        );
    }

    #[test]
    fn add_rejects_negative_price() {
        let catalog = PriceCatalog::new();
        assert!(matches!(
            catalog.add("INTC", dec!(-0.01)),
            Err(ServiceError::InvalidArgument(_))
        ));
        assert!(catalog.is_empty());
    }

    #[test]
    fn add_accepts_zero_price() {
        let catalog = PriceCatalog::new();
        assert!(catalog.add("ZERO", Decimal::ZERO).is_ok());
    }

    #[test]
    fn update_returns_post_mutation_snapshot() {
        let catalog = PriceCatalog::new();
        catalog.add("AAPL", dec!(10.00)).unwrap();
        let symbol = Symbol::parse("AAPL").unwrap();

        let (instrument, previous) = catalog
            .update(&symbol, |price| {
                let before = *price;
                *price += dec!(0.25);
                before
            })
            .unwrap();

        assert_eq!(previous, dec!(10.00));
        assert_eq!(instrument.price, dec!(10.25));
        assert_eq!(catalog.get("AAPL").unwrap().price, dec!(10.25));
    }

    #[test]
    fn update_missing_symbol_is_none() {
        let catalog = PriceCatalog::new();
        let symbol = Symbol::parse("GONE").unwrap();
        assert!(catalog.update(&symbol, |_| ()).is_none());
    }

    #[test]
    fn symbols_are_sorted() {
        let catalog = PriceCatalog::new();
        for symbol in ["YHOO", "AAPL", "MSFT"] {
            catalog.add(symbol, dec!(10)).unwrap();
        }
        let symbols: Vec<_> = catalog.symbols().iter().map(ToString::to_string).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT", "YHOO"]);
    }

    #[test]
    fn concurrent_add_of_same_symbol_inserts_once() {
        let catalog = Arc::new(PriceCatalog::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let catalog = Arc::clone(&catalog);
                thread::spawn(move || catalog.add("goog", Decimal::from(i)).is_ok())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(catalog.len(), 1);
    }
}
