//! Subscriber Registry
//!
//! Tracks every logged-in session and whether it currently wants
//! `StockUpdated` pushes.
//!
//! # Session Lifecycle
//!
//! ```text
//! Unregistered ──register──► Registered(inactive) ⇄ Registered(active)
//!       ▲                              │
//!       └──────────unregister──────────┘
//! ```
//!
//! The registry is generic over the callback handle so it stays free of
//! transport concerns; the application layer instantiates it with a shared
//! callback trait object.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use parking_lot::RwLock;
use ticker_protocol::SessionId;

use crate::domain::error::ServiceError;

// =============================================================================
// Types
// =============================================================================

/// A registered session.
#[derive(Debug, Clone)]
pub struct SubscriberRecord<C> {
    /// Session identity.
    pub session_id: SessionId,
    /// Handle used to push events to the peer.
    pub callback: C,
    /// Whether the session receives `StockUpdated` pushes.
    pub active: bool,
}

/// Point-in-time registry counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Registered sessions.
    pub sessions: usize,
    /// Sessions with monitoring enabled.
    pub active: usize,
}

// =============================================================================
// Subscriber Registry
// =============================================================================

/// Concurrent map of session id to subscriber record.
#[derive(Debug)]
pub struct SubscriberRegistry<C> {
    records: RwLock<HashMap<SessionId, SubscriberRecord<C>>>,
}

impl<C> Default for SubscriberRegistry<C> {
    fn default() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl<C: Clone> SubscriberRegistry<C> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session with monitoring disabled.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyLoggedIn` if the session is already registered.
    pub fn register(&self, session_id: SessionId, callback: C) -> Result<(), ServiceError> {
        match self.records.write().entry(session_id) {
            Entry::Occupied(entry) => Err(ServiceError::AlreadyLoggedIn(entry.key().clone())),
            Entry::Vacant(entry) => {
                let session_id = entry.key().clone();
                entry.insert(SubscriberRecord {
                    session_id,
                    callback,
                    active: false,
                });
                Ok(())
            }
        }
    }

    /// Remove a session.
    ///
    /// Unknown ids are tolerated and only logged, so concurrent double
    /// logouts never fail. Returns whether a record was removed.
    pub fn unregister(&self, session_id: &SessionId) -> bool {
        let removed = self.records.write().remove(session_id).is_some();
        if !removed {
            tracing::debug!(session_id = %session_id, "Unregister for unknown session ignored");
        }
        removed
    }

    /// Toggle monitoring for a session.
    ///
    /// No-op for unknown sessions. Returns whether the session exists.
    pub fn set_active(&self, session_id: &SessionId, active: bool) -> bool {
        self.records.write().get_mut(session_id).is_some_and(|record| {
            record.active = active;
            true
        })
    }

    /// Copy of the currently registered session ids.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SessionId> {
        self.records.read().keys().cloned().collect()
    }

    /// Current record for a session, if still registered.
    #[must_use]
    pub fn lookup(&self, session_id: &SessionId) -> Option<SubscriberRecord<C>> {
        self.records.read().get(session_id).cloned()
    }

    /// Whether the session is registered.
    #[must_use]
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.records.read().contains_key(session_id)
    }

    /// Registered and active session counts.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let records = self.records.read();
        RegistryStats {
            sessions: records.len(),
            active: records.values().filter(|r| r.active).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn sid(value: &str) -> SessionId {
        SessionId::new(value)
    }

    #[test]
    fn register_starts_inactive() {
        let registry = SubscriberRegistry::new();
        registry.register(sid("a"), 1_u8).unwrap();

        let record = registry.lookup(&sid("a")).unwrap();
        assert!(!record.active);
        assert_eq!(record.callback, 1);
    }

    #[test]
    fn second_register_is_already_logged_in() {
        let registry = SubscriberRegistry::new();
        registry.register(sid("a"), ()).unwrap();

        assert_eq!(
            registry.register(sid("a"), ()),
            Err(ServiceError::AlreadyLoggedIn(sid("a")))
        );
        assert_eq!(registry.stats().sessions, 1);
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = SubscriberRegistry::new();
        registry.register(sid("a"), ()).unwrap();

        assert!(registry.unregister(&sid("a")));
        assert!(!registry.unregister(&sid("a")));
        assert!(!registry.contains(&sid("a")));
    }

    #[test]
    fn set_active_toggles_existing_session() {
        let registry = SubscriberRegistry::new();
        registry.register(sid("a"), ()).unwrap();

        assert!(registry.set_active(&sid("a"), true));
        assert!(registry.lookup(&sid("a")).unwrap().active);

        assert!(registry.set_active(&sid("a"), false));
        assert!(!registry.lookup(&sid("a")).unwrap().active);
    }

    #[test]
    fn set_active_on_unknown_session_is_noop() {
        let registry: SubscriberRegistry<()> = SubscriberRegistry::new();
        assert!(!registry.set_active(&sid("ghost"), true));
        assert_eq!(registry.stats(), RegistryStats::default());
    }

    #[test]
    fn snapshot_is_independent_of_later_changes() {
        let registry = SubscriberRegistry::new();
        registry.register(sid("a"), ()).unwrap();
        registry.register(sid("b"), ()).unwrap();

        let snapshot = registry.snapshot();
        registry.unregister(&sid("a"));
        registry.register(sid("c"), ()).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(&sid("a")));
        assert!(registry.lookup(&sid("a")).is_none());
    }

    #[test]
    fn stats_counts_active_sessions() {
        let registry = SubscriberRegistry::new();
        for id in ["a", "b", "c"] {
            registry.register(sid(id), ()).unwrap();
        }
        registry.set_active(&sid("b"), true);

        assert_eq!(
            registry.stats(),
            RegistryStats {
                sessions: 3,
                active: 1
            }
        );
    }

    #[test]
    fn concurrent_register_same_session_succeeds_once() {
        let registry = Arc::new(SubscriberRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.register(sid("shared"), ()).is_ok())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
    }
}
