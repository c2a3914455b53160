//! Stock Service
//!
//! Request handler behind every duplex session. Operates on explicitly
//! shared catalog and registry state; there is no process-wide singleton.

use std::sync::Arc;

use rust_decimal::Decimal;
use ticker_protocol::{Instrument, Operation, ReplyBody, SessionId};

use crate::application::ports::{Registry, SharedCallback};
use crate::domain::{PriceCatalog, ServiceError};
use crate::infrastructure::metrics;

/// Identity and push handle of the caller.
#[derive(Clone)]
pub struct SessionContext {
    /// Caller's session.
    pub session_id: SessionId,
    /// Push handle for the caller's channel.
    pub callback: SharedCallback,
}

impl SessionContext {
    /// Create a context.
    #[must_use]
    pub fn new(session_id: SessionId, callback: SharedCallback) -> Self {
        Self {
            session_id,
            callback,
        }
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Result of a handled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handled {
    /// Reply to send back.
    pub reply: ReplyBody,
    /// Whether the caller's own session was terminated.
    pub session_ended: bool,
}

/// Stock service operations.
pub struct StockService {
    catalog: Arc<PriceCatalog>,
    registry: Arc<Registry>,
}

impl StockService {
    /// Create a service over shared state.
    #[must_use]
    pub const fn new(catalog: Arc<PriceCatalog>, registry: Arc<Registry>) -> Self {
        Self { catalog, registry }
    }

    /// Shared catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Arc<PriceCatalog> {
        &self.catalog
    }

    /// Shared registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Register the caller's session.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyLoggedIn` if the session is already registered.
    pub fn login(&self, ctx: &SessionContext) -> Result<(), ServiceError> {
        self.registry
            .register(ctx.session_id.clone(), Arc::clone(&ctx.callback))?;
        metrics::record_login();
        metrics::set_sessions(self.registry.stats());
        tracing::info!(session_id = %ctx.session_id, "Client logged in");
        Ok(())
    }

    /// Unregister a session, defaulting to the caller's own.
    ///
    /// Returns the session that was targeted. Unknown sessions are ignored.
    pub fn logout(&self, ctx: &SessionContext, session_id: Option<SessionId>) -> SessionId {
        let target = session_id.unwrap_or_else(|| ctx.session_id.clone());
        if self.registry.unregister(&target) {
            tracing::info!(session_id = %target, caller = %ctx.session_id, "Client logged out");
        }
        metrics::set_sessions(self.registry.stats());
        target
    }

    /// Enable `StockUpdated` pushes for the caller.
    pub fn start_ticker_monitoring(&self, ctx: &SessionContext) {
        self.set_monitoring(ctx, true);
    }

    /// Disable `StockUpdated` pushes for the caller.
    pub fn stop_ticker_monitoring(&self, ctx: &SessionContext) {
        self.set_monitoring(ctx, false);
    }

    /// Look up a quote.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown symbols.
    pub fn get_quote(&self, symbol: &str) -> Result<Instrument, ServiceError> {
        self.catalog.get(symbol)
    }

    /// Insert a new instrument.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` if the symbol exists, `InvalidArgument` for a
    /// blank symbol or negative price.
    pub fn add_instrument(&self, symbol: &str, price: Decimal) -> Result<Instrument, ServiceError> {
        let instrument = self.catalog.add(symbol, price)?;
        tracing::info!(symbol = %instrument.symbol, price = %instrument.price, "Instrument added");
        Ok(instrument)
    }

    /// Execute one operation and build its reply.
    ///
    /// Domain errors become faults with their reason; anything else becomes a
    /// generic fault.
    pub fn handle(&self, ctx: &SessionContext, op: Operation) -> Handled {
        let name = op.name();
        let mut session_ended = false;

        let result = match op {
            Operation::Login => self.login(ctx).map(|()| None),
            Operation::Logout { session_id } => {
                session_ended = self.logout(ctx, session_id) == ctx.session_id;
                Ok(None)
            }
            Operation::StartTickerMonitoring => {
                self.start_ticker_monitoring(ctx);
                Ok(None)
            }
            Operation::StopTickerMonitoring => {
                self.stop_ticker_monitoring(ctx);
                Ok(None)
            }
            Operation::GetQuote { symbol } => self.get_quote(&symbol).map(Some),
            Operation::AddInstrument { symbol, price } => {
                self.add_instrument(&symbol, price).map(|_| None)
            }
        };

        let reply = match result {
            Ok(payload) => ReplyBody::from(Ok(payload)),
            Err(ServiceError::Internal(detail)) => {
                tracing::error!(session_id = %ctx.session_id, op = name, error = %detail, "Request failed");
                ReplyBody::Fault(ServiceError::Internal(detail).into_fault())
            }
            Err(e) => {
                tracing::debug!(session_id = %ctx.session_id, op = name, error = %e, "Request rejected");
                ReplyBody::Fault(e.into_fault())
            }
        };

        Handled {
            reply,
            session_ended,
        }
    }

    fn set_monitoring(&self, ctx: &SessionContext, active: bool) {
        if self.registry.set_active(&ctx.session_id, active) {
            metrics::set_sessions(self.registry.stats());
            tracing::info!(session_id = %ctx.session_id, active, "Ticker monitoring changed");
        } else {
            tracing::debug!(session_id = %ctx.session_id, "Monitoring toggle for unregistered session ignored");
        }
    }
}
