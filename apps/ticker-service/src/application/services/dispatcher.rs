//! Notification Dispatcher
//!
//! Fans one change event out to every active subscriber. A subscriber whose
//! delivery fails is evicted from the registry; the failure never reaches the
//! simulator and never stops delivery to the remaining peers.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use ticker_protocol::{ChangeEvent, SessionId};

use crate::application::ports::Registry;
use crate::infrastructure::metrics;

/// Outcome of a single publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Events handed to a peer.
    pub delivered: usize,
    /// Registered sessions skipped because monitoring is off.
    pub skipped: usize,
    /// Sessions evicted after a failed delivery.
    pub evicted: Vec<SessionId>,
}

/// Delivers change events to active subscribers.
pub struct NotificationDispatcher {
    registry: Arc<Registry>,
}

impl NotificationDispatcher {
    /// Create a dispatcher over the shared registry.
    #[must_use]
    pub const fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Deliver `event` to every session that is active at lookup time.
    pub async fn publish(&self, event: &ChangeEvent) -> DispatchReport {
        let started = Instant::now();
        let mut report = DispatchReport::default();

        // Sessions removed after the snapshot are skipped silently.
        let mut targets = Vec::new();
        for session_id in self.registry.snapshot() {
            match self.registry.lookup(&session_id) {
                Some(record) if record.active => targets.push(record),
                Some(_) => report.skipped += 1,
                None => {}
            }
        }

        let deliveries = targets.into_iter().map(|record| async move {
            let outcome = record.callback.stock_updated(event).await;
            (record.session_id, outcome)
        });

        for (session_id, outcome) in join_all(deliveries).await {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        symbol = %event.instrument.symbol,
                        error = %e,
                        "Delivery failed, evicting subscriber"
                    );
                    self.registry.unregister(&session_id);
                    metrics::record_eviction();
                    report.evicted.push(session_id);
                }
            }
        }

        metrics::record_dispatch(
            report.delivered as u64,
            report.evicted.len() as u64,
            started.elapsed(),
        );
        tracing::debug!(
            symbol = %event.instrument.symbol,
            delivered = report.delivered,
            skipped = report.skipped,
            evicted = report.evicted.len(),
            "Change event dispatched"
        );

        report
    }
}
