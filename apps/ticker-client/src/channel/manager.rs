//! Channel Manager
//!
//! Caches one channel per contract type and owns its lifetime:
//!
//! - first acquire resolves the endpoint, builds the factory and opens;
//! - an entry idle for longer than `expiration` is closed and reopened
//!   from the same factory on the next acquire;
//! - a watcher task reopens a faulted channel right away, and keeps
//!   retrying with backoff while the slot stays empty;
//! - a channel closed by the peer is dropped from the cache.
//!
//! Each contract has its own async slot lock, so a slow open for one
//! contract never blocks another. The slot map itself sits behind a short
//! synchronous lock that is never held across an await.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::reconnect::ReconnectPolicy;
use super::{
    ChannelFactory, ChannelId, ChannelSettings, ChannelState, Contract, ContractChannel,
    DuplexChannel,
};
use crate::endpoint::EndpointResolver;
use crate::error::ChannelError;

// =============================================================================
// Slots
// =============================================================================

struct CacheEntry<C: Contract> {
    factory: Arc<C::Factory>,
    channel: Option<Arc<ContractChannel<C>>>,
    last_access: Instant,
    watcher: Option<JoinHandle<()>>,
}

impl<C: Contract> CacheEntry<C> {
    fn current_is(&self, id: ChannelId) -> bool {
        self.channel.as_ref().is_some_and(|c| c.id() == id)
    }

    fn stop_watcher(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }

    fn install(
        &mut self,
        slot: &Arc<Slot<C>>,
        generation: u64,
        channel: Arc<ContractChannel<C>>,
        settings: &ChannelSettings,
    ) {
        self.watcher = Some(tokio::spawn(watch_channel::<C>(
            Arc::clone(slot),
            generation,
            Arc::clone(&channel),
            settings.clone(),
        )));
        self.channel = Some(channel);
    }
}

struct SlotState<C: Contract> {
    /// Bumped whenever the entry is replaced or removed.
    generation: u64,
    entry: Option<CacheEntry<C>>,
}

struct Slot<C: Contract> {
    state: Mutex<SlotState<C>>,
}

impl<C: Contract> Slot<C> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                generation: 0,
                entry: None,
            }),
        }
    }
}

/// Type-erased view of a slot for shutdown.
trait ErasedSlot: Send + Sync {
    fn close(&self, timeout: Duration) -> BoxFuture<'_, ()>;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<C: Contract> ErasedSlot for Slot<C> {
    fn close(&self, timeout: Duration) -> BoxFuture<'_, ()> {
        async move {
            let entry = {
                let mut state = self.state.lock().await;
                state.generation += 1;
                state.entry.take()
            };
            if let Some(mut entry) = entry {
                entry.stop_watcher();
                if let Some(channel) = entry.channel.take() {
                    close_bounded(channel.as_ref(), timeout).await;
                    tracing::info!(contract = C::NAME, channel_id = %channel.id(), "Channel closed");
                }
            }
        }
        .boxed()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// =============================================================================
// Channel Manager
// =============================================================================

/// Per-contract channel cache.
pub struct ChannelManager {
    resolver: Arc<dyn EndpointResolver>,
    settings: ChannelSettings,
    slots: parking_lot::Mutex<HashMap<TypeId, Arc<dyn ErasedSlot>>>,
}

impl ChannelManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new(resolver: Arc<dyn EndpointResolver>, settings: ChannelSettings) -> Self {
        Self {
            resolver,
            settings,
            slots: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Channel settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    /// Get a usable channel for contract `C`.
    ///
    /// `callback` is only consulted when the factory is built, i.e. on the
    /// first acquire and after a release or discard.
    ///
    /// # Errors
    ///
    /// Returns `ChannelUnavailable` if no endpoint is configured for `C`,
    /// or the factory's error if the channel cannot be opened.
    pub async fn acquire<C: Contract>(
        &self,
        callback: Option<Arc<C::Callback>>,
    ) -> Result<Arc<ContractChannel<C>>, ChannelError> {
        let slot = self.slot::<C>()?;
        let mut state = slot.state.lock().await;
        let now = Instant::now();

        let created = state.entry.is_none();
        if created {
            let endpoint = self.resolver.resolve(C::NAME)?;
            let url = endpoint.url();
            let factory = C::create_factory(endpoint, callback, &self.settings)?;
            state.generation += 1;
            state.entry = Some(CacheEntry {
                factory: Arc::new(factory),
                channel: None,
                last_access: now,
                watcher: None,
            });
            tracing::info!(contract = C::NAME, url = %url, "Channel factory created");
        }

        let generation = state.generation;
        let Some(entry) = state.entry.as_mut() else {
            return Err(ChannelError::ChannelUnavailable(C::NAME.to_string()));
        };

        if let Some(channel) = entry.channel.clone() {
            let idle = now.saturating_duration_since(entry.last_access);
            let channel_state = channel.state();
            if idle <= self.settings.expiration && !channel_state.is_terminal() {
                entry.last_access = now;
                return Ok(channel);
            }

            if idle > self.settings.expiration {
                tracing::info!(
                    contract = C::NAME,
                    channel_id = %channel.id(),
                    idle_secs = idle.as_secs(),
                    "Channel expired, refreshing"
                );
            } else {
                tracing::debug!(
                    contract = C::NAME,
                    channel_id = %channel.id(),
                    state = %channel_state,
                    "Cached channel unusable, reopening"
                );
            }
            entry.stop_watcher();
            entry.channel = None;
            close_bounded(channel.as_ref(), self.settings.close_timeout).await;
        }

        match entry.factory.open().await {
            Ok(channel) => {
                entry.install(&slot, generation, Arc::clone(&channel), &self.settings);
                entry.last_access = now;
                tracing::info!(contract = C::NAME, channel_id = %channel.id(), "Channel opened");
                Ok(channel)
            }
            Err(e) => {
                tracing::warn!(contract = C::NAME, error = %e, "Failed to open channel");
                if created {
                    state.generation += 1;
                    state.entry = None;
                }
                Err(e)
            }
        }
    }

    /// Gracefully close `channel` and drop the cache entry for `C`.
    ///
    /// Returns `true` if the cache entry was removed. A stale handle is
    /// still closed but leaves a newer cached channel in place.
    pub async fn release<C: Contract>(&self, channel: &Arc<ContractChannel<C>>) -> bool {
        let removed = self.detach::<C>(channel.id()).await;
        close_bounded(channel.as_ref(), self.settings.close_timeout).await;
        tracing::info!(contract = C::NAME, channel_id = %channel.id(), removed, "Channel released");
        removed
    }

    /// Abort `channel` and drop the cache entry for `C`.
    ///
    /// The next acquire builds a fresh factory.
    pub async fn discard<C: Contract>(&self, channel: &Arc<ContractChannel<C>>) -> bool {
        let removed = self.detach::<C>(channel.id()).await;
        channel.abort();
        tracing::info!(contract = C::NAME, channel_id = %channel.id(), removed, "Channel discarded");
        removed
    }

    /// Close every cached channel.
    pub async fn close_all(&self) {
        let slots: Vec<Arc<dyn ErasedSlot>> = self.slots.lock().values().cloned().collect();
        let timeout = self.settings.close_timeout;
        futures::future::join_all(slots.iter().map(|slot| slot.close(timeout))).await;
    }

    /// Id of the channel currently cached for `C`.
    pub async fn cached_channel_id<C: Contract>(&self) -> Option<ChannelId> {
        let slot = self.existing_slot::<C>()?;
        let state = slot.state.lock().await;
        state.entry.as_ref()?.channel.as_ref().map(|c| c.id())
    }

    async fn detach<C: Contract>(&self, id: ChannelId) -> bool {
        let Some(slot) = self.existing_slot::<C>() else {
            return false;
        };
        let mut state = slot.state.lock().await;
        let owned = state
            .entry
            .as_ref()
            .is_some_and(|e| e.channel.is_none() || e.current_is(id));
        if !owned {
            return false;
        }
        state.generation += 1;
        if let Some(mut entry) = state.entry.take() {
            entry.stop_watcher();
        }
        true
    }

    fn slot<C: Contract>(&self) -> Result<Arc<Slot<C>>, ChannelError> {
        let erased = {
            let mut slots = self.slots.lock();
            Arc::clone(
                slots
                    .entry(TypeId::of::<C>())
                    .or_insert_with(|| -> Arc<dyn ErasedSlot> { Arc::new(Slot::<C>::new()) }),
            )
        };
        erased.into_any().downcast::<Slot<C>>().map_err(|_| {
            ChannelError::Config(format!("slot type mismatch for contract '{}'", C::NAME))
        })
    }

    fn existing_slot<C: Contract>(&self) -> Option<Arc<Slot<C>>> {
        let erased = self.slots.lock().get(&TypeId::of::<C>()).cloned()?;
        erased.into_any().downcast::<Slot<C>>().ok()
    }
}

// =============================================================================
// Lifecycle Watcher
// =============================================================================

fn watch_channel<C: Contract>(
    slot: Arc<Slot<C>>,
    generation: u64,
    channel: Arc<ContractChannel<C>>,
    settings: ChannelSettings,
) -> BoxFuture<'static, ()> {
    async move {
        let mut states = channel.subscribe_state();
        let terminal = loop {
            let current = *states.borrow_and_update();
            if current.is_terminal() {
                break current;
            }
            if states.changed().await.is_err() {
                break ChannelState::Closed;
            }
        };

        if terminal == ChannelState::Faulted {
            recover::<C>(slot, generation, channel, settings).await;
        } else {
            forget_closed::<C>(&slot, generation, channel.id()).await;
        }
    }
    .boxed()
}

async fn forget_closed<C: Contract>(slot: &Slot<C>, generation: u64, id: ChannelId) {
    let mut state = slot.state.lock().await;
    if state.generation != generation {
        return;
    }
    if let Some(entry) = state.entry.as_mut()
        && entry.current_is(id)
    {
        entry.channel = None;
        entry.watcher = None;
        tracing::info!(contract = C::NAME, channel_id = %id, "Channel closed, cleared from cache");
    }
}

async fn recover<C: Contract>(
    slot: Arc<Slot<C>>,
    generation: u64,
    failed: Arc<ContractChannel<C>>,
    settings: ChannelSettings,
) {
    let factory = {
        let mut state = slot.state.lock().await;
        if state.generation != generation {
            return;
        }
        let Some(entry) = state.entry.as_mut() else {
            return;
        };
        if !entry.current_is(failed.id()) {
            return;
        }

        entry.channel = None;
        entry.watcher = None;
        failed.abort();
        tracing::warn!(contract = C::NAME, channel_id = %failed.id(), "Channel faulted, reopening");

        match entry.factory.open().await {
            Ok(channel) => {
                tracing::info!(contract = C::NAME, channel_id = %channel.id(), "Channel reopened");
                entry.install(&slot, generation, channel, &settings);
                return;
            }
            Err(e) => {
                tracing::warn!(contract = C::NAME, error = %e, "Reopen failed, slot cleared");
                Arc::clone(&entry.factory)
            }
        }
    };

    let mut policy = ReconnectPolicy::new(settings.reconnect.clone());
    while let Some(delay) = policy.next_delay() {
        tokio::time::sleep(delay).await;

        if !awaiting_reopen(&slot, generation).await {
            tracing::debug!(contract = C::NAME, "Slot changed, stopping recovery");
            return;
        }

        match factory.open().await {
            Ok(channel) => {
                let mut state = slot.state.lock().await;
                if state.generation == generation
                    && let Some(entry) = state.entry.as_mut()
                    && entry.channel.is_none()
                {
                    tracing::info!(
                        contract = C::NAME,
                        channel_id = %channel.id(),
                        attempt = policy.attempt_count(),
                        "Channel recovered"
                    );
                    entry.install(&slot, generation, channel, &settings);
                    return;
                }
                drop(state);
                tracing::debug!(contract = C::NAME, "Slot changed during reopen, discarding channel");
                close_bounded(channel.as_ref(), settings.close_timeout).await;
                return;
            }
            Err(e) => {
                tracing::warn!(
                    contract = C::NAME,
                    attempt = policy.attempt_count(),
                    error = %e,
                    "Reopen attempt failed"
                );
            }
        }
    }

    tracing::error!(contract = C::NAME, "Giving up reopening channel");
}

async fn awaiting_reopen<C: Contract>(slot: &Slot<C>, generation: u64) -> bool {
    let state = slot.state.lock().await;
    state.generation == generation && state.entry.as_ref().is_some_and(|e| e.channel.is_none())
}

/// Graceful close within `timeout`, falling back to abort.
async fn close_bounded<Ch: DuplexChannel + ?Sized>(channel: &Ch, timeout: Duration) {
    match tokio::time::timeout(timeout, channel.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::debug!(channel_id = %channel.id(), error = %e, "Close failed, aborting");
            channel.abort();
        }
        Err(_) => {
            tracing::debug!(channel_id = %channel.id(), "Close timed out, aborting");
            channel.abort();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
